use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use modkit_crud::SeaStorage;
use runtime::DatabaseConfig;
use sea_orm::SqlxSqliteConnector;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use url::Url;

const DEFAULT_MAX_CONNS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
    MySql,
}

/// Backend from the URL scheme.
pub fn detect_backend(url: &str) -> Result<Backend> {
    let raw = url.trim();
    if raw.is_empty() {
        return Err(anyhow!("Database URL not configured"));
    }
    if raw.eq_ignore_ascii_case("sqlite::memory:") {
        return Ok(Backend::Sqlite);
    }
    let parsed = Url::parse(raw).map_err(|e| anyhow!("Invalid database DSN '{}': {}", raw, e))?;
    match parsed.scheme() {
        "sqlite" | "sqlite3" => Ok(Backend::Sqlite),
        "postgres" | "postgresql" => Ok(Backend::Postgres),
        "mysql" | "mariadb" => Ok(Backend::MySql),
        other => Err(anyhow!("Unsupported database type: {}", other)),
    }
}

/// Rewrite a sqlite DSN so its file path is absolute under `base_dir`.
/// `sqlite::memory:` is returned unchanged; backslashes become `/`.
pub fn absolutize_sqlite_dsn(dsn: &str, base_dir: &Path, create_dirs: bool) -> Result<String> {
    if dsn.eq_ignore_ascii_case("sqlite::memory:") || dsn.eq_ignore_ascii_case("sqlite://:memory:") {
        return Ok("sqlite::memory:".to_string());
    }
    let db_path = dsn
        .strip_prefix("sqlite://")
        .ok_or_else(|| anyhow!("DSN must start with sqlite:// (got: {})", dsn))?;

    let (path_str, query) = match db_path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (db_path, None),
    };

    let mut p = PathBuf::from(path_str);
    if p.as_os_str().is_empty() {
        return Err(anyhow!("Empty SQLite path in DSN"));
    }
    if p.is_relative() {
        p = base_dir.join(p);
    }
    if create_dirs {
        if let Some(dir) = p.parent() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let mut out = String::from("sqlite://");
    out.push_str(&p.to_string_lossy().replace('\\', "/"));
    if let Some(q) = query {
        out.push('?');
        out.push_str(q);
    }
    Ok(out)
}

/// Open the configured database. SQLite files are created on demand and every
/// pooled connection gets the configured busy timeout.
pub async fn connect(cfg: &DatabaseConfig, base_dir: &Path) -> Result<SeaStorage> {
    let max_conns = cfg.max_conns.unwrap_or(DEFAULT_MAX_CONNS);
    match detect_backend(&cfg.url)? {
        Backend::Sqlite => {
            let dsn = absolutize_sqlite_dsn(cfg.url.trim(), base_dir, true)?;
            // One connection keeps an in-memory database shared.
            let max_conns = if dsn == "sqlite::memory:" { 1 } else { max_conns };
            let busy = Duration::from_millis(u64::from(cfg.busy_timeout_ms.unwrap_or(5000)));

            let opts = SqliteConnectOptions::from_str(&dsn)
                .with_context(|| format!("Invalid sqlite DSN '{dsn}'"))?
                .create_if_missing(true)
                .busy_timeout(busy);
            tracing::info!("Connecting to database: {}", dsn);
            let pool = SqlitePoolOptions::new()
                .max_connections(max_conns)
                .connect_with(opts)
                .await
                .context("Failed to open sqlite database")?;
            Ok(SeaStorage::new(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool)))
        }
        Backend::Postgres | Backend::MySql => {
            tracing::info!("Connecting to database: {}", cfg.url.trim());
            Ok(SeaStorage::connect(cfg.url.trim(), max_conns).await?)
        }
    }
}

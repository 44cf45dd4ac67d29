//! SeaORM-backed storage: plans are rendered with `sea_query` for whatever
//! backend the connection speaks.

use async_trait::async_trait;
use sea_orm::sea_query::{
    Alias, ColumnDef as SeaColumnDef, Condition, Expr, Func, LikeExpr, Order, Query, SimpleExpr,
    Table, TableCreateStatement, Value as SeaValue,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection,
    DatabaseTransaction, DbErr, QueryResult, SqlErr, TransactionTrait,
};
use tracing::{debug, info};

use super::{Storage, StorageTx};
use crate::error::StorageError;
use crate::model::TableSchema;
use crate::plan::QueryPlan;
use crate::translate::{like_pattern, CmpOp, Predicate};
use crate::value::{FieldKind, FieldValue, Row};
use modkit_query::SortDir;

#[derive(Clone)]
pub struct SeaStorage {
    conn: DatabaseConnection,
}

impl SeaStorage {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// `sqlite::memory:` needs `max_connections = 1` to see a single database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let mut opts = ConnectOptions::new(url.to_owned());
        opts.max_connections(max_connections.max(1)).sqlx_logging(false);
        let conn = Database::connect(opts).await?;
        info!(backend = ?conn.get_database_backend(), "storage connected");
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// `CREATE TABLE IF NOT EXISTS` for `schema`.
    pub async fn create_table(&self, schema: &TableSchema) -> Result<(), StorageError> {
        let backend = self.conn.get_database_backend();
        let stmt = create_table_statement(schema, backend);
        self.conn.execute(backend.build(&stmt)).await.map_err(map_db_err)?;
        debug!(table = %schema.table, "table ensured");
        Ok(())
    }
}

pub struct SeaStorageTx {
    tx: DatabaseTransaction,
}

pub fn create_table_statement(schema: &TableSchema, backend: DatabaseBackend) -> TableCreateStatement {
    let mut stmt = Table::create();
    stmt.table(Alias::new(schema.table.as_str())).if_not_exists();
    for c in &schema.columns {
        let mut col = SeaColumnDef::new(Alias::new(c.name.as_str()));
        let is_pk = c.name == schema.primary_key;
        match c.kind {
            FieldKind::I64 if is_pk && backend == DatabaseBackend::Sqlite => {
                col.integer().auto_increment()
            }
            FieldKind::I64 if is_pk => col.big_integer().auto_increment(),
            FieldKind::I64 => col.big_integer(),
            FieldKind::String => col.string(),
            FieldKind::F64 => col.double(),
            FieldKind::Decimal => col.decimal(),
            FieldKind::Bool => col.boolean(),
            FieldKind::Uuid => col.uuid(),
            FieldKind::DateTimeUtc => col.timestamp_with_time_zone(),
            FieldKind::Date => col.date(),
            FieldKind::Time => col.time(),
            FieldKind::Json => col.json(),
        };
        if is_pk {
            col.primary_key();
        }
        if c.nullable && !is_pk {
            col.null();
        } else {
            col.not_null();
        }
        stmt.col(&mut col);
    }
    stmt
}

fn map_db_err(e: DbErr) -> StorageError {
    match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => StorageError::Conflict(msg),
        _ => StorageError::Sea(e),
    }
}

fn col(name: &str) -> Expr {
    Expr::col(Alias::new(name))
}

/// Untyped conversion, used when the column kind is not known.
fn to_sea(v: &FieldValue) -> Result<SeaValue, StorageError> {
    Ok(match v {
        FieldValue::Null => SeaValue::String(None),
        FieldValue::Bool(b) => SeaValue::Bool(Some(*b)),
        FieldValue::I64(n) => SeaValue::BigInt(Some(*n)),
        FieldValue::F64(f) => SeaValue::Double(Some(*f)),
        FieldValue::Decimal(d) => SeaValue::Decimal(Some(Box::new(*d))),
        FieldValue::String(s) => SeaValue::String(Some(Box::new(s.clone()))),
        FieldValue::Uuid(u) => SeaValue::Uuid(Some(Box::new(*u))),
        FieldValue::DateTime(dt) => SeaValue::ChronoDateTimeUtc(Some(Box::new(*dt))),
        FieldValue::Date(d) => SeaValue::ChronoDate(Some(Box::new(*d))),
        FieldValue::Time(t) => SeaValue::ChronoTime(Some(Box::new(*t))),
        FieldValue::Json(j) => SeaValue::Json(Some(Box::new(j.clone()))),
        FieldValue::Related(_) => {
            return Err(StorageError::Backend("related rows cannot be bound".into()))
        }
    })
}

/// Typed conversion; nulls carry the column type.
fn to_sea_as(kind: FieldKind, v: &FieldValue) -> Result<SeaValue, StorageError> {
    let v = v
        .coerce(kind)
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    if !v.is_null() {
        return to_sea(&v);
    }
    Ok(match kind {
        FieldKind::String => SeaValue::String(None),
        FieldKind::I64 => SeaValue::BigInt(None),
        FieldKind::F64 => SeaValue::Double(None),
        FieldKind::Decimal => SeaValue::Decimal(None),
        FieldKind::Bool => SeaValue::Bool(None),
        FieldKind::Uuid => SeaValue::Uuid(None),
        FieldKind::DateTimeUtc => SeaValue::ChronoDateTimeUtc(None),
        FieldKind::Date => SeaValue::ChronoDate(None),
        FieldKind::Time => SeaValue::ChronoTime(None),
        FieldKind::Json => SeaValue::Json(None),
    })
}

fn decode(row: &QueryResult, column: &str, kind: FieldKind) -> Result<FieldValue, StorageError> {
    macro_rules! get {
        ($t:ty, $wrap:expr) => {
            row.try_get::<Option<$t>>("", column)
                .map(|o| o.map_or(FieldValue::Null, $wrap))
        };
    }
    let res = match kind {
        FieldKind::String => get!(String, FieldValue::String),
        FieldKind::I64 => get!(i64, FieldValue::I64),
        FieldKind::F64 => get!(f64, FieldValue::F64),
        FieldKind::Decimal => get!(rust_decimal::Decimal, FieldValue::Decimal),
        FieldKind::Bool => get!(bool, FieldValue::Bool),
        FieldKind::Uuid => get!(uuid::Uuid, FieldValue::Uuid),
        FieldKind::DateTimeUtc => get!(chrono::DateTime<chrono::Utc>, FieldValue::DateTime),
        FieldKind::Date => get!(chrono::NaiveDate, FieldValue::Date),
        FieldKind::Time => get!(chrono::NaiveTime, FieldValue::Time),
        FieldKind::Json => get!(serde_json::Value, FieldValue::Json),
    };
    res.map_err(|e| StorageError::Decode {
        column: column.to_string(),
        message: e.to_string(),
    })
}

fn kind_of(schema: &TableSchema, column: &str) -> Result<FieldKind, StorageError> {
    schema
        .column(column)
        .map(|c| c.kind)
        .ok_or_else(|| StorageError::Backend(format!("{} has no column {column}", schema.table)))
}

pub(crate) fn condition(p: &Predicate, schema: &TableSchema) -> Result<Condition, StorageError> {
    Ok(match p {
        Predicate::All(parts) if parts.is_empty() => Condition::all().add(Expr::cust("1=1")),
        Predicate::Any(parts) if parts.is_empty() => Condition::all().add(Expr::cust("1=0")),
        Predicate::All(parts) => parts.iter().try_fold(Condition::all(), |c, p| {
            Ok::<_, StorageError>(c.add(condition(p, schema)?))
        })?,
        Predicate::Any(parts) => parts.iter().try_fold(Condition::any(), |c, p| {
            Ok::<_, StorageError>(c.add(condition(p, schema)?))
        })?,
        Predicate::Not(inner) => Condition::all().not().add(condition(inner, schema)?),
        Predicate::Cmp { column, op, value } => {
            let v: SimpleExpr = to_sea_as(kind_of(schema, column)?, value)?.into();
            let c = col(column);
            Condition::all().add(match op {
                CmpOp::Eq => c.eq(v),
                CmpOp::Ne => c.ne(v),
                CmpOp::Gt => c.gt(v),
                CmpOp::Ge => c.gte(v),
                CmpOp::Lt => c.lt(v),
                CmpOp::Le => c.lte(v),
            })
        }
        Predicate::IsNull(column) => Condition::all().add(col(column).is_null()),
        Predicate::IsNotNull(column) => Condition::all().add(col(column).is_not_null()),
        Predicate::In { values, .. } if values.is_empty() => Condition::all().add(Expr::cust("1=0")),
        Predicate::In { column, values } => {
            let kind = kind_of(schema, column)?;
            let vals = values
                .iter()
                .map(|v| to_sea_as(kind, v))
                .collect::<Result<Vec<_>, _>>()?;
            Condition::all().add(col(column).is_in(vals))
        }
        Predicate::Like {
            column,
            kind,
            needle,
        } => Condition::all().add(
            Expr::expr(Func::lower(col(column)))
                .like(LikeExpr::new(like_pattern(*kind, needle)).escape('\\')),
        ),
        Predicate::Empty { column, text } => {
            let mut c = Condition::any().add(col(column).is_null());
            if *text {
                c = c.add(col(column).eq(""));
            }
            c
        }
    })
}

pub(crate) fn select_statement(plan: &QueryPlan) -> Result<sea_orm::sea_query::SelectStatement, StorageError> {
    let mut stmt = Query::select();
    stmt.from(Alias::new(plan.table()));
    for c in plan.selected_columns() {
        stmt.column(Alias::new(c.as_str()));
    }
    if let Some(p) = &plan.predicate {
        stmt.cond_where(condition(p, &plan.schema)?);
    }
    for term in &plan.order {
        let dir = match term.dir {
            SortDir::Asc => Order::Asc,
            SortDir::Desc => Order::Desc,
        };
        stmt.order_by(Alias::new(term.column.as_str()), dir);
    }
    match (plan.skip, plan.take) {
        (skip, Some(take)) => {
            stmt.limit(take);
            if let Some(s) = skip.filter(|s| *s > 0) {
                stmt.offset(s);
            }
        }
        (Some(s), None) if s > 0 => {
            stmt.limit(i64::MAX as u64).offset(s);
        }
        _ => {}
    }
    Ok(stmt)
}

async fn fetch_on<C: ConnectionTrait>(conn: &C, plan: &QueryPlan) -> Result<Vec<Row>, StorageError> {
    let backend = conn.get_database_backend();
    let stmt = select_statement(plan)?;
    let columns = plan.selected_columns();
    let kinds = columns
        .iter()
        .map(|c| kind_of(&plan.schema, c))
        .collect::<Result<Vec<_>, _>>()?;
    let results = conn.query_all(backend.build(&stmt)).await.map_err(map_db_err)?;
    debug!(table = plan.table(), count = results.len(), "sea fetch");
    results
        .iter()
        .map(|r| {
            columns
                .iter()
                .zip(&kinds)
                .map(|(c, k)| Ok((c.clone(), decode(r, c, *k)?)))
                .collect::<Result<Row, StorageError>>()
        })
        .collect()
}

async fn count_on<C: ConnectionTrait>(conn: &C, plan: &QueryPlan) -> Result<u64, StorageError> {
    let backend = conn.get_database_backend();
    let mut stmt = Query::select();
    stmt.expr_as(Expr::cust("COUNT(*)"), Alias::new("total"))
        .from(Alias::new(plan.table()));
    if let Some(p) = &plan.predicate {
        stmt.cond_where(condition(p, &plan.schema)?);
    }
    let row = conn.query_one(backend.build(&stmt)).await.map_err(map_db_err)?;
    let total = match row {
        Some(r) => r.try_get::<i64>("", "total").map_err(|e| StorageError::Decode {
            column: "total".into(),
            message: e.to_string(),
        })?,
        None => 0,
    };
    Ok(u64::try_from(total).unwrap_or(0))
}

async fn exists_on<C: ConnectionTrait>(
    conn: &C,
    table: &str,
    key: &str,
    value: &FieldValue,
) -> Result<bool, StorageError> {
    let backend = conn.get_database_backend();
    let mut stmt = Query::select();
    stmt.expr(Expr::val(1))
        .from(Alias::new(table))
        .and_where(col(key).eq(to_sea(value)?))
        .limit(1);
    Ok(conn
        .query_one(backend.build(&stmt))
        .await
        .map_err(map_db_err)?
        .is_some())
}

async fn insert_on<C: ConnectionTrait>(
    conn: &C,
    schema: &TableSchema,
    row: Row,
) -> Result<FieldValue, StorageError> {
    let backend = conn.get_database_backend();
    let pk = schema
        .pk_column()
        .ok_or_else(|| StorageError::Backend(format!("{} has no primary key", schema.table)))?;
    let given = row.get(&pk.name).cloned().unwrap_or(FieldValue::Null);
    let auto = pk.kind == FieldKind::I64 && (given.is_null() || given == FieldValue::I64(0));

    let mut columns = Vec::with_capacity(schema.columns.len());
    let mut values = Vec::with_capacity(schema.columns.len());
    for c in &schema.columns {
        if auto && c.name == pk.name {
            continue;
        }
        let v = row.get(&c.name).cloned().unwrap_or(FieldValue::Null);
        columns.push(Alias::new(c.name.as_str()));
        values.push(SimpleExpr::from(to_sea_as(c.kind, &v)?));
    }

    let mut stmt = Query::insert();
    stmt.into_table(Alias::new(schema.table.as_str()))
        .columns(columns)
        .values(values)
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    if !auto {
        conn.execute(backend.build(&stmt)).await.map_err(map_db_err)?;
        return Ok(given);
    }
    if backend.support_returning() {
        stmt.returning_col(Alias::new(pk.name.as_str()));
        let row = conn
            .query_one(backend.build(&stmt))
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| StorageError::Backend("insert returned no row".into()))?;
        return decode(&row, &pk.name, pk.kind);
    }
    let res = conn.execute(backend.build(&stmt)).await.map_err(map_db_err)?;
    let id = i64::try_from(res.last_insert_id())
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    Ok(FieldValue::I64(id))
}

async fn update_on<C: ConnectionTrait>(
    conn: &C,
    schema: &TableSchema,
    row: Row,
) -> Result<u64, StorageError> {
    let backend = conn.get_database_backend();
    let pk = schema
        .pk_column()
        .ok_or_else(|| StorageError::Backend(format!("{} has no primary key", schema.table)))?;
    let key = row
        .get(&pk.name)
        .cloned()
        .ok_or_else(|| StorageError::Backend(format!("update of {} without {}", schema.table, pk.name)))?;

    let mut sets = Vec::new();
    for (name, value) in row.iter() {
        let Some(c) = schema.column(name) else { continue };
        if c.name == pk.name {
            continue;
        }
        sets.push((Alias::new(c.name.as_str()), SimpleExpr::from(to_sea_as(c.kind, value)?)));
    }
    if sets.is_empty() {
        return Ok(u64::from(exists_on(conn, &schema.table, &pk.name, &key).await?));
    }

    let mut stmt = Query::update();
    stmt.table(Alias::new(schema.table.as_str()))
        .values(sets)
        .and_where(col(&pk.name).eq(to_sea_as(pk.kind, &key)?));
    let res = conn.execute(backend.build(&stmt)).await.map_err(map_db_err)?;
    Ok(res.rows_affected())
}

async fn delete_on<C: ConnectionTrait>(
    conn: &C,
    schema: &TableSchema,
    key: &FieldValue,
) -> Result<bool, StorageError> {
    let backend = conn.get_database_backend();
    let kind = kind_of(schema, &schema.primary_key)?;
    let mut stmt = Query::delete();
    stmt.from_table(Alias::new(schema.table.as_str()))
        .and_where(col(&schema.primary_key).eq(to_sea_as(kind, key)?));
    let res = conn.execute(backend.build(&stmt)).await.map_err(map_db_err)?;
    Ok(res.rows_affected() > 0)
}

async fn execute_raw_on<C: ConnectionTrait>(conn: &C, sql: &str) -> Result<u64, StorageError> {
    let res = conn.execute_unprepared(sql).await.map_err(map_db_err)?;
    Ok(res.rows_affected())
}

#[async_trait]
impl Storage for SeaStorage {
    async fn fetch(&self, plan: &QueryPlan) -> Result<Vec<Row>, StorageError> {
        fetch_on(&self.conn, plan).await
    }

    async fn count(&self, plan: &QueryPlan) -> Result<u64, StorageError> {
        count_on(&self.conn, plan).await
    }

    async fn exists(&self, table: &str, key: &str, value: &FieldValue) -> Result<bool, StorageError> {
        exists_on(&self.conn, table, key, value).await
    }

    async fn insert(&self, schema: &TableSchema, row: Row) -> Result<FieldValue, StorageError> {
        insert_on(&self.conn, schema, row).await
    }

    async fn update(&self, schema: &TableSchema, row: Row) -> Result<u64, StorageError> {
        update_on(&self.conn, schema, row).await
    }

    async fn delete(&self, schema: &TableSchema, key: &FieldValue) -> Result<bool, StorageError> {
        delete_on(&self.conn, schema, key).await
    }

    async fn execute_raw(&self, sql: &str) -> Result<u64, StorageError> {
        execute_raw_on(&self.conn, sql).await
    }

    async fn begin(&self) -> Result<Box<dyn StorageTx>, StorageError> {
        let tx = self.conn.begin().await?;
        Ok(Box::new(SeaStorageTx { tx }))
    }
}

#[async_trait]
impl Storage for SeaStorageTx {
    async fn fetch(&self, plan: &QueryPlan) -> Result<Vec<Row>, StorageError> {
        fetch_on(&self.tx, plan).await
    }

    async fn count(&self, plan: &QueryPlan) -> Result<u64, StorageError> {
        count_on(&self.tx, plan).await
    }

    async fn exists(&self, table: &str, key: &str, value: &FieldValue) -> Result<bool, StorageError> {
        exists_on(&self.tx, table, key, value).await
    }

    async fn insert(&self, schema: &TableSchema, row: Row) -> Result<FieldValue, StorageError> {
        insert_on(&self.tx, schema, row).await
    }

    async fn update(&self, schema: &TableSchema, row: Row) -> Result<u64, StorageError> {
        update_on(&self.tx, schema, row).await
    }

    async fn delete(&self, schema: &TableSchema, key: &FieldValue) -> Result<bool, StorageError> {
        delete_on(&self.tx, schema, key).await
    }

    async fn execute_raw(&self, sql: &str) -> Result<u64, StorageError> {
        execute_raw_on(&self.tx, sql).await
    }

    /// Nested transactions map to savepoints.
    async fn begin(&self) -> Result<Box<dyn StorageTx>, StorageError> {
        let tx = self.tx.begin().await?;
        Ok(Box::new(SeaStorageTx { tx }))
    }
}

#[async_trait]
impl StorageTx for SeaStorageTx {
    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

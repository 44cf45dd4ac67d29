//! In-process storage over `parking_lot` locked tables.
//!
//! Ordering treats null as the smallest value, matching SQLite. A transaction
//! reads and writes a private snapshot and records its writes; commit replays
//! them onto the parent under one write lock, so writes made outside the
//! transaction in the meantime survive. Integer keys inside a transaction are
//! reserved from the live table, and a replayed insert whose key was taken in
//! the meantime fails the commit with [`StorageError::Conflict`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::{Storage, StorageTx};
use crate::error::StorageError;
use crate::model::TableSchema;
use crate::plan::QueryPlan;
use crate::translate::OrderTerm;
use crate::value::{FieldValue, Row};
use modkit_query::SortDir;

#[derive(Clone, Debug)]
struct MemoryTable {
    rows: Vec<Row>,
    next_id: i64,
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            next_id: 1,
        }
    }
}

/// A write recorded by a transaction, replayed on commit.
#[derive(Clone, Debug)]
enum Op {
    Insert { schema: TableSchema, row: Row },
    Update { schema: TableSchema, row: Row },
    Delete { schema: TableSchema, key: FieldValue },
}

#[derive(Clone, Debug, Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
}

impl MemoryState {
    fn reserve_id(&mut self, table: &str) -> i64 {
        let t = self.tables.entry(table.to_string()).or_default();
        let id = t.next_id;
        t.next_id += 1;
        id
    }

    /// Returns the key and the row as stored.
    fn insert(&mut self, schema: &TableSchema, row: Row) -> Result<(FieldValue, Row), StorageError> {
        let pk = schema.primary_key.as_str();
        let t = self.tables.entry(schema.table.clone()).or_default();

        let key = match row.get(pk) {
            None | Some(FieldValue::Null) | Some(FieldValue::I64(0)) => {
                let id = t.next_id;
                t.next_id += 1;
                FieldValue::I64(id)
            }
            Some(FieldValue::I64(n)) => {
                t.next_id = t.next_id.max(n.saturating_add(1));
                FieldValue::I64(*n)
            }
            Some(other) => other.clone(),
        };
        if t.rows.iter().any(|r| key_matches(r, pk, &key)) {
            return Err(StorageError::Conflict(format!(
                "{}.{} = {} already exists",
                schema.table, pk, key
            )));
        }

        let mut stored = Row::with_capacity(schema.columns.len());
        for c in &schema.columns {
            let v = if c.name == pk {
                key.clone()
            } else {
                row.get(&c.name).cloned().unwrap_or(FieldValue::Null)
            };
            stored.insert(c.name.clone(), v);
        }
        t.rows.push(stored.clone());
        Ok((key, stored))
    }

    fn update(&mut self, schema: &TableSchema, row: &Row) -> Result<u64, StorageError> {
        let pk = schema.primary_key.as_str();
        let key = row
            .get(pk)
            .cloned()
            .ok_or_else(|| StorageError::Backend(format!("update of {} without {pk}", schema.table)))?;
        let Some(t) = self.tables.get_mut(&schema.table) else {
            return Ok(0);
        };
        let mut touched = 0;
        for stored in t.rows.iter_mut().filter(|r| key_matches(r, pk, &key)) {
            for (name, value) in row.iter() {
                if let Some(c) = schema.column(name) {
                    stored.insert(c.name.clone(), value.clone());
                }
            }
            touched += 1;
        }
        Ok(touched)
    }

    fn delete(&mut self, schema: &TableSchema, key: &FieldValue) -> bool {
        let Some(t) = self.tables.get_mut(&schema.table) else {
            return false;
        };
        let before = t.rows.len();
        t.rows.retain(|r| !key_matches(r, &schema.primary_key, key));
        t.rows.len() != before
    }

    fn apply(&mut self, op: &Op) -> Result<(), StorageError> {
        match op {
            Op::Insert { schema, row } => self.insert(schema, row.clone()).map(|_| ()),
            Op::Update { schema, row } => self.update(schema, row).map(|_| ()),
            Op::Delete { schema, key } => {
                self.delete(schema, key);
                Ok(())
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current rows of `table` in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .read()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Load rows as-is, bypassing key assignment.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        let mut state = self.state.write();
        let t = state.tables.entry(table.to_string()).or_default();
        t.rows.extend(rows);
    }

    fn snapshot(&self) -> MemoryStorage {
        MemoryStorage {
            state: Arc::new(RwLock::new(self.state.read().clone())),
        }
    }
}

fn key_matches(row: &Row, key: &str, value: &FieldValue) -> bool {
    row.get(key).is_some_and(|v| v.same_as(value))
}

fn needs_key(schema: &TableSchema, row: &Row) -> bool {
    matches!(
        row.get(&schema.primary_key),
        None | Some(FieldValue::Null) | Some(FieldValue::I64(0))
    )
}

fn cmp_nulls_first(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

fn cmp_rows(a: &Row, b: &Row, order: &[OrderTerm]) -> Ordering {
    for term in order {
        let null = FieldValue::Null;
        let ord = cmp_nulls_first(
            a.get(&term.column).unwrap_or(&null),
            b.get(&term.column).unwrap_or(&null),
        );
        let ord = match term.dir {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn window<T>(items: Vec<T>, skip: Option<u64>, take: Option<u64>) -> Vec<T> {
    let skip = usize::try_from(skip.unwrap_or(0)).unwrap_or(usize::MAX);
    let take = take
        .map(|t| usize::try_from(t).unwrap_or(usize::MAX))
        .unwrap_or(usize::MAX);
    items.into_iter().skip(skip).take(take).collect()
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn fetch(&self, plan: &QueryPlan) -> Result<Vec<Row>, StorageError> {
        let mut rows: Vec<Row> = {
            let state = self.state.read();
            match state.tables.get(plan.table()) {
                Some(t) => t
                    .rows
                    .iter()
                    .filter(|r| plan.predicate.as_ref().map_or(true, |p| p.matches(r)))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            }
        };
        if !plan.order.is_empty() {
            rows.sort_by(|a, b| cmp_rows(a, b, &plan.order));
        }
        let rows = window(rows, plan.skip, plan.take);
        debug!(table = plan.table(), count = rows.len(), "memory fetch");
        if plan.columns.is_empty() {
            return Ok(rows);
        }
        Ok(rows.iter().map(|r| r.project(&plan.columns)).collect())
    }

    async fn count(&self, plan: &QueryPlan) -> Result<u64, StorageError> {
        let state = self.state.read();
        let n = state.tables.get(plan.table()).map_or(0, |t| {
            t.rows
                .iter()
                .filter(|r| plan.predicate.as_ref().map_or(true, |p| p.matches(r)))
                .count()
        });
        Ok(n as u64)
    }

    async fn exists(&self, table: &str, key: &str, value: &FieldValue) -> Result<bool, StorageError> {
        let state = self.state.read();
        Ok(state
            .tables
            .get(table)
            .is_some_and(|t| t.rows.iter().any(|r| key_matches(r, key, value))))
    }

    async fn insert(&self, schema: &TableSchema, row: Row) -> Result<FieldValue, StorageError> {
        let (key, _) = self.state.write().insert(schema, row)?;
        Ok(key)
    }

    async fn update(&self, schema: &TableSchema, row: Row) -> Result<u64, StorageError> {
        self.state.write().update(schema, &row)
    }

    async fn delete(&self, schema: &TableSchema, key: &FieldValue) -> Result<bool, StorageError> {
        Ok(self.state.write().delete(schema, key))
    }

    async fn execute_raw(&self, _sql: &str) -> Result<u64, StorageError> {
        Err(StorageError::Unsupported("raw statements on in-memory storage"))
    }

    async fn begin(&self) -> Result<Box<dyn StorageTx>, StorageError> {
        Ok(Box::new(MemoryTx {
            work: self.snapshot(),
            ops: Arc::default(),
            target: self.clone(),
            target_log: None,
            ids: self.state.clone(),
        }))
    }
}

pub struct MemoryTx {
    work: MemoryStorage,
    ops: Arc<Mutex<Vec<Op>>>,
    /// State the recorded writes are replayed onto.
    target: MemoryStorage,
    /// Write log of the enclosing transaction, when nested.
    target_log: Option<Arc<Mutex<Vec<Op>>>>,
    /// Live state integer keys are reserved from.
    ids: Arc<RwLock<MemoryState>>,
}

#[async_trait]
impl Storage for MemoryTx {
    async fn fetch(&self, plan: &QueryPlan) -> Result<Vec<Row>, StorageError> {
        self.work.fetch(plan).await
    }

    async fn count(&self, plan: &QueryPlan) -> Result<u64, StorageError> {
        self.work.count(plan).await
    }

    async fn exists(&self, table: &str, key: &str, value: &FieldValue) -> Result<bool, StorageError> {
        self.work.exists(table, key, value).await
    }

    async fn insert(&self, schema: &TableSchema, mut row: Row) -> Result<FieldValue, StorageError> {
        if needs_key(schema, &row) {
            let id = self.ids.write().reserve_id(&schema.table);
            row.insert(schema.primary_key.clone(), FieldValue::I64(id));
        }
        let (key, stored) = self.work.state.write().insert(schema, row)?;
        self.ops.lock().push(Op::Insert {
            schema: schema.clone(),
            row: stored,
        });
        Ok(key)
    }

    async fn update(&self, schema: &TableSchema, row: Row) -> Result<u64, StorageError> {
        let touched = self.work.state.write().update(schema, &row)?;
        if touched > 0 {
            self.ops.lock().push(Op::Update {
                schema: schema.clone(),
                row,
            });
        }
        Ok(touched)
    }

    async fn delete(&self, schema: &TableSchema, key: &FieldValue) -> Result<bool, StorageError> {
        let deleted = self.work.state.write().delete(schema, key);
        if deleted {
            self.ops.lock().push(Op::Delete {
                schema: schema.clone(),
                key: key.clone(),
            });
        }
        Ok(deleted)
    }

    async fn execute_raw(&self, sql: &str) -> Result<u64, StorageError> {
        self.work.execute_raw(sql).await
    }

    async fn begin(&self) -> Result<Box<dyn StorageTx>, StorageError> {
        Ok(Box::new(MemoryTx {
            work: self.work.snapshot(),
            ops: Arc::default(),
            target: self.work.clone(),
            target_log: Some(self.ops.clone()),
            ids: self.ids.clone(),
        }))
    }
}

#[async_trait]
impl StorageTx for MemoryTx {
    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let ops = std::mem::take(&mut *self.ops.lock());
        {
            let mut target = self.target.state.write();
            let mut staged = target.clone();
            for op in &ops {
                staged.apply(op)?;
            }
            *target = staged;
        }
        debug!(writes = ops.len(), "memory transaction committed");
        if let Some(log) = &self.target_log {
            log.lock().extend(ops);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        debug!("memory transaction rolled back");
        Ok(())
    }
}

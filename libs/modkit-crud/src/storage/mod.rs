//! Storage capability the engine runs on.
//!
//! Backends receive canonical column names and values already coerced to the
//! column kind; they only have to execute.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::model::TableSchema;
use crate::plan::QueryPlan;
use crate::value::{FieldValue, Row};

pub mod memory;
#[cfg(feature = "sea-orm")]
pub mod sea;

pub use memory::MemoryStorage;
#[cfg(feature = "sea-orm")]
pub use sea::SeaStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Rows matching the plan, ordered and windowed, projected to
    /// `plan.columns` when that is non-empty.
    async fn fetch(&self, plan: &QueryPlan) -> Result<Vec<Row>, StorageError>;

    /// Number of rows matching the plan's predicate, ignoring the window.
    async fn count(&self, plan: &QueryPlan) -> Result<u64, StorageError>;

    async fn exists(&self, table: &str, key: &str, value: &FieldValue) -> Result<bool, StorageError>;

    /// Insert and return the stored primary key. An integer key that is null
    /// or zero is assigned by the backend.
    async fn insert(&self, schema: &TableSchema, row: Row) -> Result<FieldValue, StorageError>;

    /// Update by primary key; returns the number of rows touched.
    async fn update(&self, schema: &TableSchema, row: Row) -> Result<u64, StorageError>;

    async fn delete(&self, schema: &TableSchema, key: &FieldValue) -> Result<bool, StorageError>;

    /// Run a backend-native statement. Returns rows affected.
    async fn execute_raw(&self, sql: &str) -> Result<u64, StorageError>;

    async fn begin(&self) -> Result<Box<dyn StorageTx>, StorageError>;
}

/// A unit of work. Dropping it without `commit` discards its writes.
#[async_trait]
pub trait StorageTx: Storage {
    async fn commit(self: Box<Self>) -> Result<(), StorageError>;
    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}

//! Generic query and batch CRUD engine.
//!
//! Entities describe themselves once through an [`EntityDescriptor`]; the
//! engine turns [`modkit_query`] requests into [`QueryPlan`]s and runs them on
//! any [`Storage`] backend.
//!
//! ```ignore
//! let svc = CrudService::<Author>::new(storage.clone(), CrudConfig::default())?;
//! let q = QueryRequest {
//!     filter: Some("contains(Name,'ana')".into()),
//!     order_by: Some("Name desc".into()),
//!     take: Some(20),
//!     ..Default::default()
//! }
//! .parse()?;
//! let page = svc.query_paged(&q).await?;
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod fk;
pub mod model;
pub mod plan;
pub mod projection;
pub mod service;
pub mod storage;
pub mod translate;
pub mod value;

pub use batch::{BatchItem, BatchItemFailure, BatchItemOptions, BatchProcessor, BatchRequest, BatchResult};
pub use config::CrudConfig;
pub use error::{CrudError, ModelError, QueryError, StorageError, ValidationError, ValueError};
pub use fk::validate_foreign_keys;
pub use model::{
    ColumnDef, Entity, EntityDescriptor, FieldDef, ForeignKeyRelation, IncludeDef, TableSchema,
};
pub use plan::{QueryBuilder, QueryPlan};
pub use projection::{project, reconstitute, Partial};
pub use service::CrudService;
pub use storage::{MemoryStorage, Storage, StorageTx};
#[cfg(feature = "sea-orm")]
pub use storage::SeaStorage;
pub use translate::{OrderTerm, Predicate};
pub use value::{FieldKind, FieldValue, Row};

pub use modkit_query::{PagedResult, Query, QueryRequest};

//! Batch create/update with transactional and partial-failure semantics.
//!
//! | transaction | continue on error | outcome |
//! |---|---|---|
//! | no  | yes | every failure collected, successes persisted |
//! | no  | no  | stops at the first failure |
//! | yes | no  | first failure rolls back and is returned as `CrudError::BatchItem` |
//! | yes | yes | all items run; any failure rolls back and successes are reported as rolled back |

use std::marker::PhantomData;
use std::sync::Arc;

use modkit_query::Query;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::error::CrudError;
use crate::model::{Entity, EntityDescriptor};
use crate::plan::QueryBuilder;
use crate::service::{create_on, load_includes, update_on};
use crate::storage::Storage;
use crate::translate::Predicate;
use crate::value::FieldValue;

/// Per-item options; unset members fall back to the request defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchItemOptions {
    pub fields: Option<Vec<String>>,
    pub include: Option<Vec<String>>,
    pub where_clause: Option<String>,
}

impl BatchItemOptions {
    /// `self` wins wherever it is set.
    pub fn merged_over(&self, defaults: &BatchItemOptions) -> BatchItemOptions {
        BatchItemOptions {
            fields: self.fields.clone().or_else(|| defaults.fields.clone()),
            include: self.include.clone().or_else(|| defaults.include.clone()),
            where_clause: self
                .where_clause
                .clone()
                .or_else(|| defaults.where_clause.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem<E> {
    pub payload: E,
    #[serde(default)]
    pub options: BatchItemOptions,
}

impl<E> BatchItem<E> {
    pub fn new(payload: E) -> Self {
        Self {
            payload,
            options: BatchItemOptions::default(),
        }
    }

    pub fn with_options(mut self, options: BatchItemOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest<E> {
    pub items: Vec<BatchItem<E>>,
    #[serde(default)]
    pub defaults: BatchItemOptions,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub use_transaction: bool,
}

impl<E> BatchRequest<E> {
    pub fn new(payloads: impl IntoIterator<Item = E>) -> Self {
        Self {
            items: payloads.into_iter().map(BatchItem::new).collect(),
            defaults: BatchItemOptions::default(),
            continue_on_error: false,
            use_transaction: false,
        }
    }

    pub fn continue_on_error(mut self, yes: bool) -> Self {
        self.continue_on_error = yes;
        self
    }

    pub fn use_transaction(mut self, yes: bool) -> Self {
        self.use_transaction = yes;
        self
    }

    pub fn defaults(mut self, defaults: BatchItemOptions) -> Self {
        self.defaults = defaults;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure<E> {
    pub index: usize,
    pub payload: E,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult<E> {
    pub successful: Vec<E>,
    pub failed: Vec<BatchItemFailure<E>>,
    /// Set when a transactional batch was undone; nothing in `failed` or
    /// `successful` is persisted then.
    pub rolled_back: bool,
}

impl<E> Default for BatchResult<E> {
    fn default() -> Self {
        Self {
            successful: Vec::new(),
            failed: Vec::new(),
            rolled_back: false,
        }
    }
}

impl<E> BatchResult<E> {
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && !self.rolled_back
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Create,
    Update,
}

impl Op {
    fn as_str(self) -> &'static str {
        match self {
            Op::Create => "create",
            Op::Update => "update",
        }
    }
}

pub struct BatchProcessor<E: Entity> {
    storage: Arc<dyn Storage>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> BatchProcessor<E> {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            _entity: PhantomData,
        }
    }

    #[instrument(name = "crud.batch.create_many", skip_all, fields(entity = E::descriptor().name()))]
    pub async fn create_many(&self, request: BatchRequest<E>) -> Result<BatchResult<E>, CrudError> {
        self.run(Op::Create, request).await
    }

    #[instrument(name = "crud.batch.update_many", skip_all, fields(entity = E::descriptor().name()))]
    pub async fn update_many(&self, request: BatchRequest<E>) -> Result<BatchResult<E>, CrudError> {
        self.run(Op::Update, request).await
    }

    async fn run(&self, op: Op, request: BatchRequest<E>) -> Result<BatchResult<E>, CrudError> {
        let desc = E::descriptor();
        info!(
            op = op.as_str(),
            items = request.items.len(),
            transaction = request.use_transaction,
            continue_on_error = request.continue_on_error,
            "Starting {} batch",
            desc.name()
        );
        if request.use_transaction {
            self.run_in_transaction(op, request).await
        } else {
            let result = process(self.storage.as_ref(), op, request, false).await?;
            info!(
                successful = result.successful.len(),
                failed = result.failed.len(),
                "Finished {} batch",
                desc.name()
            );
            Ok(result)
        }
    }

    async fn run_in_transaction(&self, op: Op, request: BatchRequest<E>) -> Result<BatchResult<E>, CrudError> {
        let desc = E::descriptor();
        let tx = self.storage.begin().await?;
        let continue_on_error = request.continue_on_error;

        let mut result = match process(tx.as_ref(), op, request, true).await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "Rolling back {} batch", desc.name());
                if let Err(rb) = tx.rollback().await {
                    error!(error = %rb, "Rollback of {} batch failed", desc.name());
                }
                return Err(e);
            }
        };

        if result.failed.is_empty() {
            tx.commit().await?;
            info!(successful = result.successful.len(), "Committed {} batch", desc.name());
            return Ok(result);
        }

        debug_assert!(continue_on_error);
        if let Err(rb) = tx.rollback().await {
            error!(error = %rb, "Rollback of {} batch failed", desc.name());
        }
        warn!(
            failed = result.failed.len(),
            "Rolled back {} batch after item failures",
            desc.name()
        );
        let undone = std::mem::take(&mut result.successful);
        let mut indices = success_indices(&result.failed, undone.len());
        for (payload, index) in undone.into_iter().zip(indices.drain(..)) {
            result.failed.push(BatchItemFailure {
                index,
                payload,
                error: "rolled back: another item in the transaction failed".to_string(),
            });
        }
        result.failed.sort_by_key(|f| f.index);
        result.rolled_back = true;
        Ok(result)
    }
}

/// Submission indices not present in `failed`, in order.
fn success_indices<E>(failed: &[BatchItemFailure<E>], successes: usize) -> Vec<usize> {
    let total = failed.len() + successes;
    (0..total)
        .filter(|i| !failed.iter().any(|f| f.index == *i))
        .collect()
}

/// Runs items in order. In a transaction without `continue_on_error` the first
/// failure is returned as `Err`; otherwise failures are recorded.
async fn process<E, S>(
    storage: &S,
    op: Op,
    request: BatchRequest<E>,
    in_transaction: bool,
) -> Result<BatchResult<E>, CrudError>
where
    E: Entity,
    S: Storage + ?Sized,
{
    let mut result = BatchResult::default();
    let BatchRequest {
        items,
        defaults,
        continue_on_error,
        ..
    } = request;

    for (index, item) in items.into_iter().enumerate() {
        let options = item.options.merged_over(&defaults);
        let payload = item.payload;
        match process_item(storage, op, payload.clone(), &options).await {
            Ok(written) => result.successful.push(written),
            Err(e) if in_transaction && !continue_on_error => {
                warn!(index, error = %e, "Batch item failed");
                return Err(CrudError::BatchItem {
                    index,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                warn!(index, error = %e, "Batch item failed");
                result.failed.push(BatchItemFailure {
                    index,
                    payload,
                    error: e.to_string(),
                });
                if !continue_on_error {
                    break;
                }
            }
        }
    }
    Ok(result)
}

async fn process_item<E, S>(
    storage: &S,
    op: Op,
    payload: E,
    options: &BatchItemOptions,
) -> Result<E, CrudError>
where
    E: Entity,
    S: Storage + ?Sized,
{
    let fields = options.fields.as_deref().unwrap_or(&[]);
    let written = match op {
        Op::Create => create_on(storage, payload, fields).await?,
        Op::Update => update_on(storage, payload, fields, options.where_clause.as_deref()).await?,
    };
    match options.include.as_deref() {
        Some(includes) if includes.iter().any(|i| !i.trim().is_empty()) => {
            reload_with_includes(storage, E::descriptor(), &written, includes).await
        }
        _ => Ok(written),
    }
}

async fn reload_with_includes<E, S>(
    storage: &S,
    desc: &'static EntityDescriptor<E>,
    written: &E,
    includes: &[String],
) -> Result<E, CrudError>
where
    E: Entity,
    S: Storage + ?Sized,
{
    let key: FieldValue = desc.key_of(written)?;
    let mut query = Query::new().take(1);
    query.include = includes.to_vec();
    let plan = QueryBuilder::from_query(&query, desc)?
        .filter(Predicate::eq(desc.primary_key_name(), key.clone()))
        .build();
    let rows = storage.fetch(&plan).await?;
    let mut entities = rows
        .iter()
        .map(|r| desc.hydrate(r))
        .collect::<Result<Vec<_>, _>>()?;
    load_includes(storage, &plan, &rows, &mut entities).await?;
    entities
        .pop()
        .ok_or_else(|| CrudError::not_found(desc.name(), &key))
}

use std::marker::PhantomData;
use std::sync::Arc;

use modkit_query::{parse_filter, FilterInput, OrderKey, PagedResult, Query};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::CrudConfig;
use crate::error::{CrudError, ModelError, QueryError, ValidationError};
use crate::fk::validate_foreign_keys;
use crate::model::{Entity, EntityDescriptor};
use crate::plan::{QueryBuilder, QueryPlan};
use crate::projection::{project, reconstitute, Partial};
use crate::storage::Storage;
use crate::translate::{translate_expr, Predicate};
use crate::value::{FieldKind, FieldValue, Row};

/// Generic create/read/update/delete and query operations for one entity type.
pub struct CrudService<E: Entity> {
    storage: Arc<dyn Storage>,
    config: CrudConfig,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for CrudService<E> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            config: self.config.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> CrudService<E> {
    /// Fails when the entity descriptor is inconsistent.
    pub fn new(storage: Arc<dyn Storage>, config: CrudConfig) -> Result<Self, CrudError> {
        E::descriptor().validate()?;
        debug!(entity = E::descriptor().name(), "crud service ready");
        Ok(Self {
            storage,
            config,
            _entity: PhantomData,
        })
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn config(&self) -> &CrudConfig {
        &self.config
    }

    /// Persist `entity`. With a non-empty `fields` list only those writable
    /// fields are taken from it; everything else starts from the default.
    #[instrument(
        name = "crud.service.create",
        skip_all,
        fields(entity = E::descriptor().name())
    )]
    pub async fn create(&self, entity: E, fields: &[String]) -> Result<E, CrudError> {
        create_on(self.storage.as_ref(), entity, fields).await
    }

    /// Update the stored row with the same primary key as `entity`.
    ///
    /// `where_clause` is checked against the merged entity in memory before
    /// writing; it is not a conditional `UPDATE`.
    #[instrument(
        name = "crud.service.update",
        skip_all,
        fields(entity = E::descriptor().name())
    )]
    pub async fn update(
        &self,
        entity: E,
        fields: &[String],
        where_clause: Option<&str>,
    ) -> Result<E, CrudError> {
        update_on(self.storage.as_ref(), entity, fields, where_clause).await
    }

    #[instrument(name = "crud.service.get_by_id", skip_all, fields(entity = E::descriptor().name()))]
    pub async fn get_by_id(&self, id: impl Into<FieldValue>) -> Result<E, CrudError> {
        let key = key_value::<E>(id.into())?;
        get_on::<E, _>(self.storage.as_ref(), &key)
            .await?
            .ok_or_else(|| CrudError::not_found(E::descriptor().name(), &key))
    }

    pub async fn find_by_id(&self, id: impl Into<FieldValue>) -> Result<Option<E>, CrudError> {
        let key = key_value::<E>(id.into())?;
        get_on::<E, _>(self.storage.as_ref(), &key).await
    }

    pub async fn exists(&self, id: impl Into<FieldValue>) -> Result<bool, CrudError> {
        let desc = E::descriptor();
        let key = key_value::<E>(id.into())?;
        Ok(self
            .storage
            .exists(desc.table(), desc.primary_key_name(), &key)
            .await?)
    }

    /// `false` when no such row existed.
    #[instrument(name = "crud.service.delete", skip_all, fields(entity = E::descriptor().name()))]
    pub async fn delete(&self, id: impl Into<FieldValue>) -> Result<bool, CrudError> {
        let desc = E::descriptor();
        let key = key_value::<E>(id.into())?;
        info!("Deleting {} with id={}", desc.name(), key);
        match self.storage.delete(desc.schema(), &key).await {
            Ok(true) => {
                info!("Successfully deleted {} with id={}", desc.name(), key);
                Ok(true)
            }
            Ok(false) => {
                debug!("{} with id={} did not exist", desc.name(), key);
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "Delete of {} with id={} failed", desc.name(), key);
                Err(e.into())
            }
        }
    }

    /// One page in primary-key order. `page` is 1-based; the size falls back
    /// to the configured default and is clamped to the maximum.
    pub async fn list_paged(&self, page: u64, page_size: Option<u64>) -> Result<PagedResult<E>, CrudError> {
        let size = self.config.clamp_page_size(page_size);
        let page = page.max(1);
        let query = Query::new()
            .order_by(OrderKey::asc(E::descriptor().primary_key_name()))
            .skip((page - 1).saturating_mul(size))
            .take(size);
        self.run_paged(&query).await
    }

    /// Every row, unpaged.
    pub async fn list_all(&self) -> Result<Vec<E>, CrudError> {
        self.query(&Query::new()).await
    }

    pub async fn count(&self, query: &Query) -> Result<u64, CrudError> {
        let plan = QueryBuilder::from_query(query, E::descriptor())?.build();
        Ok(self.storage.count(&plan.count_plan()).await?)
    }

    /// Full entities with includes; `select` is ignored.
    #[instrument(name = "crud.service.query", skip_all, fields(entity = E::descriptor().name()))]
    pub async fn query(&self, query: &Query) -> Result<Vec<E>, CrudError> {
        query_on(self.storage.as_ref(), query).await
    }

    /// `take` defaults to the configured page size; `0` yields an empty page
    /// and a `take` above the maximum is rejected.
    pub async fn query_paged(&self, query: &Query) -> Result<PagedResult<E>, CrudError> {
        let mut query = query.clone();
        query.take = Some(self.config.page_size(query.take)?);
        self.run_paged(&query).await
    }

    /// Partial entities restricted to `select`. No `select` reads every field.
    #[instrument(name = "crud.service.query_select", skip_all, fields(entity = E::descriptor().name()))]
    pub async fn query_select(&self, query: &Query) -> Result<Vec<Partial<E>>, CrudError> {
        select_on(self.storage.as_ref(), query).await
    }

    pub async fn query_select_paged(&self, query: &Query) -> Result<PagedResult<Partial<E>>, CrudError> {
        let mut query = query.clone();
        query.take = Some(self.config.page_size(query.take)?);
        let total = self.count(&query).await?;
        let data = match query.take {
            Some(0) => Vec::new(),
            _ => select_on(self.storage.as_ref(), &query).await?,
        };
        Ok(PagedResult::from_window(data, total, query.skip, query.take))
    }

    pub async fn query_input(&self, input: FilterInput) -> Result<Vec<E>, CrudError> {
        let query = input.into_query()?;
        self.query(&query).await
    }

    pub async fn query_input_paged(&self, input: FilterInput) -> Result<PagedResult<E>, CrudError> {
        let query = input.into_query()?;
        self.query_paged(&query).await
    }

    async fn run_paged(&self, query: &Query) -> Result<PagedResult<E>, CrudError> {
        let total = self.count(query).await?;
        let data = match query.take {
            Some(0) => Vec::new(),
            _ => self.query(query).await?,
        };
        debug!(total, returned = data.len(), "paged query");
        Ok(PagedResult::from_window(data, total, query.skip, query.take))
    }
}

fn key_value<E: Entity>(id: FieldValue) -> Result<FieldValue, CrudError> {
    let pk = E::descriptor().pk_field()?;
    Ok(id.coerce(pk.kind)?)
}

/// Primary key plus every writable column.
fn update_row<E>(desc: &EntityDescriptor<E>, entity: &E) -> Row {
    desc.fields()
        .iter()
        .filter(|f| f.writable || f.name == desc.primary_key_name())
        .map(|f| (f.name.clone(), f.get(entity)))
        .collect()
}

pub(crate) async fn create_on<E, S>(storage: &S, entity: E, fields: &[String]) -> Result<E, CrudError>
where
    E: Entity,
    S: Storage + ?Sized,
{
    let desc = E::descriptor();
    info!("Creating new {}", desc.name());
    let res = async {
        validate_foreign_keys(storage, &entity).await?;

        let mut value = if fields.is_empty() {
            entity
        } else {
            let mut fresh = E::default();
            desc.copy_fields(&entity, &mut fresh, fields)?;
            fresh
        };

        let pk = desc.pk_field()?;
        if pk.kind == FieldKind::Uuid && pk.get(&value).is_default() {
            pk.set(&mut value, FieldValue::Uuid(Uuid::new_v4()))?;
        }

        let key = storage.insert(desc.schema(), desc.to_row(&value)).await?;
        pk.set(&mut value, key.clone())?;
        Ok::<_, CrudError>((value, key))
    }
    .await;

    match res {
        Ok((value, key)) => {
            info!("Successfully created {} with id={}", desc.name(), key);
            Ok(value)
        }
        Err(e) => {
            warn!(error = %e, "Create of {} failed", desc.name());
            Err(e)
        }
    }
}

pub(crate) async fn update_on<E, S>(
    storage: &S,
    entity: E,
    fields: &[String],
    where_clause: Option<&str>,
) -> Result<E, CrudError>
where
    E: Entity,
    S: Storage + ?Sized,
{
    let desc = E::descriptor();
    let key = desc.key_of(&entity)?;
    info!("Updating {} with id={}", desc.name(), key);
    let res = async {
        let current = get_on::<E, S>(storage, &key)
            .await?
            .ok_or_else(|| CrudError::not_found(desc.name(), &key))?;

        let merged = if fields.is_empty() {
            let mut replaced = entity;
            for f in desc.fields().iter().filter(|f| !f.writable) {
                (f.setter)(&mut replaced, f.get(&current))?;
            }
            replaced
        } else {
            let mut merged = current;
            desc.copy_fields(&entity, &mut merged, fields)?;
            merged
        };

        validate_foreign_keys(storage, &merged).await?;

        if let Some(clause) = where_clause.filter(|c| !c.trim().is_empty()) {
            let predicate = translate_expr(&parse_filter(clause)?, desc.schema())?;
            if !predicate.matches(&desc.to_row(&merged)) {
                return Err(ValidationError::WhereClauseMismatch {
                    entity: desc.name().to_string(),
                    id: key.to_string(),
                    clause: clause.to_string(),
                }
                .into());
            }
        }

        let touched = storage.update(desc.schema(), update_row(desc, &merged)).await?;
        if touched == 0 {
            return Err(CrudError::not_found(desc.name(), &key));
        }
        Ok::<_, CrudError>(merged)
    }
    .await;

    match res {
        Ok(merged) => {
            info!("Successfully updated {} with id={}", desc.name(), key);
            Ok(merged)
        }
        Err(e) => {
            warn!(error = %e, "Update of {} with id={} failed", desc.name(), key);
            Err(e)
        }
    }
}

pub(crate) async fn get_on<E, S>(storage: &S, key: &FieldValue) -> Result<Option<E>, CrudError>
where
    E: Entity,
    S: Storage + ?Sized,
{
    let desc = E::descriptor();
    let plan = QueryBuilder::new(desc)
        .filter(Predicate::eq(desc.primary_key_name(), key.clone()))
        .window(None, Some(1))
        .build();
    let rows = storage.fetch(&plan).await?;
    debug!(entity = desc.name(), id = %key, found = !rows.is_empty(), "get by id");
    Ok(rows.first().map(|r| desc.hydrate(r)).transpose()?)
}

pub(crate) async fn query_on<E, S>(storage: &S, query: &Query) -> Result<Vec<E>, CrudError>
where
    E: Entity,
    S: Storage + ?Sized,
{
    let desc = E::descriptor();
    let plan = QueryBuilder::from_query(query, desc)?.build();
    let rows = storage.fetch(&plan).await?;
    let mut entities = rows
        .iter()
        .map(|r| desc.hydrate(r))
        .collect::<Result<Vec<_>, _>>()?;
    load_includes(storage, &plan, &rows, &mut entities).await?;
    debug!(entity = desc.name(), count = entities.len(), "query");
    Ok(entities)
}

async fn select_on<E, S>(storage: &S, query: &Query) -> Result<Vec<Partial<E>>, CrudError>
where
    E: Entity,
    S: Storage + ?Sized,
{
    let desc = E::descriptor();
    let plan = QueryBuilder::from_query(query, desc)?.build();
    let Some(select) = &query.select else {
        let rows = storage.fetch(&plan).await?;
        let mut partials: Vec<Partial<E>> = rows.iter().map(|r| reconstitute(r, desc)).collect();
        load_partial_includes(storage, &plan, &rows, &mut partials).await?;
        return Ok(partials);
    };

    let mut plan = project(plan, select);
    let requested = plan.columns.clone();
    for name in &plan.includes {
        if let Some(local) = desc
            .include_def(name)
            .and_then(|def| plan.schema.column(&def.local_field))
        {
            if !plan.columns.contains(&local.name) {
                plan.columns.push(local.name.clone());
            }
        }
    }

    let rows = storage.fetch(&plan).await?;
    let mut partials: Vec<Partial<E>> = rows
        .iter()
        .map(|r| reconstitute(&r.project(&requested), desc))
        .collect();
    load_partial_includes(storage, &plan, &rows, &mut partials).await?;
    Ok(partials)
}

async fn load_partial_includes<E, S>(
    storage: &S,
    plan: &QueryPlan,
    rows: &[Row],
    partials: &mut [Partial<E>],
) -> Result<(), CrudError>
where
    E: Entity,
    S: Storage + ?Sized,
{
    if plan.includes.is_empty() {
        return Ok(());
    }
    let mut entities: Vec<E> = partials.iter().map(|p| p.entity.clone()).collect();
    load_includes(storage, plan, rows, &mut entities).await?;
    for (p, e) in partials.iter_mut().zip(entities) {
        p.entity = e;
        p.fields.extend(plan.includes.iter().cloned());
    }
    Ok(())
}

/// One `IN` query per include; related rows are grouped by key and handed to
/// the include's attach function.
pub(crate) async fn load_includes<E, S>(
    storage: &S,
    plan: &QueryPlan,
    rows: &[Row],
    entities: &mut [E],
) -> Result<(), CrudError>
where
    E: Entity,
    S: Storage + ?Sized,
{
    let desc = E::descriptor();
    for name in &plan.includes {
        let def = desc
            .include_def(name)
            .ok_or_else(|| QueryError::UnknownInclude(name.clone()))?;
        let target = (def.target)();
        let target_col = target
            .column(&def.target_field)
            .ok_or_else(|| ModelError::UnknownIncludeField {
                entity: desc.name().to_string(),
                name: def.name.clone(),
                field: def.target_field.clone(),
            })?
            .name
            .clone();

        let mut keys: Vec<FieldValue> = Vec::new();
        for v in rows.iter().filter_map(|r| r.get(&def.local_field)) {
            if !v.is_null() && !keys.iter().any(|k| k.same_as(v)) {
                keys.push(v.clone());
            }
        }

        let related = if keys.is_empty() {
            Vec::new()
        } else {
            let related_plan = QueryPlan {
                schema: target.clone(),
                predicate: Some(Predicate::In {
                    column: target_col.clone(),
                    values: keys,
                }),
                ..Default::default()
            };
            storage.fetch(&related_plan).await?
        };
        debug!(include = %def.name, related = related.len(), "include loaded");

        for (row, entity) in rows.iter().zip(entities.iter_mut()) {
            let group: Vec<Row> = match row.get(&def.local_field) {
                Some(local) if !local.is_null() => related
                    .iter()
                    .filter(|r| r.get(&target_col).is_some_and(|t| t.same_as(local)))
                    .cloned()
                    .collect(),
                _ => Vec::new(),
            };
            (def.attach)(entity, group)?;
        }
    }
    Ok(())
}

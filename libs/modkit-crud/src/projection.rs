//! Field-subset projection and partial entity reconstitution.

use tracing::{debug, warn};

use crate::model::{Entity, EntityDescriptor};
use crate::plan::QueryPlan;
use crate::value::Row;

/// Restrict `plan` to the requested fields, in request order.
///
/// Names resolve case-insensitively; unknown names are dropped and repeats
/// collapse. When nothing usable remains only the primary key is read.
pub fn project(mut plan: QueryPlan, fields: &[String]) -> QueryPlan {
    let mut columns: Vec<String> = Vec::with_capacity(fields.len());
    for name in fields {
        match plan.schema.column(name.trim()) {
            Some(c) if !columns.contains(&c.name) => columns.push(c.name.clone()),
            Some(_) => {}
            None => debug!(table = plan.table(), field = %name, "dropping unknown projected field"),
        }
    }
    if columns.is_empty() {
        columns.push(plan.schema.primary_key.clone());
    }
    plan.columns = columns;
    plan
}

/// An entity filled from a projected row, with the fields that were read.
#[derive(Debug, Clone, PartialEq)]
pub struct Partial<E> {
    pub entity: E,
    pub fields: Vec<String>,
}

impl<E> Partial<E> {
    pub fn is_projected(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.eq_ignore_ascii_case(name))
    }

    pub fn into_inner(self) -> E {
        self.entity
    }
}

/// Build a fresh entity from `row`.
///
/// Only descriptor fields present in the row are set; a value that cannot be
/// coerced is logged and the field keeps its default.
pub fn reconstitute<E: Entity>(row: &Row, desc: &EntityDescriptor<E>) -> Partial<E> {
    let mut entity = E::default();
    let mut fields = Vec::new();
    for f in desc.fields() {
        let Some(value) = row.get(&f.name) else {
            continue;
        };
        fields.push(f.name.clone());
        if value.is_null() && !f.nullable {
            continue;
        }
        if let Err(e) = f.set(&mut entity, value.clone()) {
            warn!(
                entity = desc.name(),
                field = %f.name,
                error = %e,
                "could not reconstitute field; keeping default"
            );
        }
    }
    Partial { entity, fields }
}

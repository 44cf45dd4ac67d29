//! Foreign-key existence checks before writes.

use tracing::debug;

use crate::error::{CrudError, ValidationError};
use crate::model::Entity;
use crate::storage::Storage;

/// Every declared reference of `entity` that holds a value must point at an
/// existing row. Null, zero, nil and empty values are not references.
pub async fn validate_foreign_keys<E, S>(storage: &S, entity: &E) -> Result<(), CrudError>
where
    E: Entity,
    S: Storage + ?Sized,
{
    let desc = E::descriptor();
    for fk in desc.foreign_keys() {
        let f = desc.require_field(&fk.field)?;
        let value = f.get(entity);
        if value.is_default() {
            continue;
        }
        let found = storage
            .exists(&fk.referenced_table, &fk.referenced_key, &value)
            .await?;
        if !found {
            debug!(field = %f.name, %value, table = %fk.referenced_table, "dangling reference");
            return Err(ValidationError::MissingReference {
                field: f.name.clone(),
                value: value.to_string(),
                referenced: fk.referenced_table.clone(),
            }
            .into());
        }
    }
    Ok(())
}

//! Entity model descriptors: the per-type accessor table the engine works from.
//!
//! ```ignore
//! static AUTHOR: Lazy<EntityDescriptor<Author>> = Lazy::new(|| {
//!     EntityDescriptor::new("Author", "authors")
//!         .field(FieldDef::new("Id", FieldKind::I64, |a: &Author| a.id.into(), |a, v| {
//!             a.id = v.try_into()?;
//!             Ok(())
//!         }).read_only())
//!         .primary_key("Id")
//! });
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::error::{ModelError, ValueError};
use crate::value::{FieldKind, FieldValue, Row};

pub type Getter<E> = fn(&E) -> FieldValue;
pub type Setter<E> = fn(&mut E, FieldValue) -> Result<(), ValueError>;
pub type Attach<E> = fn(&mut E, Vec<Row>) -> Result<(), ValueError>;

/// A type the engine can persist and query generically.
pub trait Entity: Default + Clone + Send + Sync + 'static {
    fn descriptor() -> &'static EntityDescriptor<Self>;
}

pub struct FieldDef<E> {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
    pub writable: bool,
    pub getter: Getter<E>,
    pub setter: Setter<E>,
}

impl<E> FieldDef<E> {
    pub fn new(name: impl Into<String>, kind: FieldKind, getter: Getter<E>, setter: Setter<E>) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            writable: true,
            getter,
            setter,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn get(&self, entity: &E) -> FieldValue {
        (self.getter)(entity)
    }

    /// Coerce `value` into the field kind and assign it.
    pub fn set(&self, entity: &mut E, value: FieldValue) -> Result<(), ValueError> {
        (self.setter)(entity, value.coerce(self.kind)?)
    }
}

impl<E> Clone for FieldDef<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            nullable: self.nullable,
            writable: self.writable,
            getter: self.getter,
            setter: self.setter,
        }
    }
}

impl<E> fmt::Debug for FieldDef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .field("writable", &self.writable)
            .finish()
    }
}

/// `field` must hold an existing key of `referenced_table.referenced_key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKeyRelation {
    pub field: String,
    pub referenced_table: String,
    pub referenced_key: String,
}

/// Named eager-load relation: rows of the target table whose `target_field`
/// equals this entity's `local_field`.
pub struct IncludeDef<E> {
    pub name: String,
    pub target: fn() -> &'static TableSchema,
    pub local_field: String,
    pub target_field: String,
    pub attach: Attach<E>,
}

impl<E> IncludeDef<E> {
    pub fn new(
        name: impl Into<String>,
        target: fn() -> &'static TableSchema,
        local_field: impl Into<String>,
        target_field: impl Into<String>,
        attach: Attach<E>,
    ) -> Self {
        Self {
            name: name.into(),
            target,
            local_field: local_field.into(),
            target_field: target_field.into(),
            attach,
        }
    }
}

impl<E> fmt::Debug for IncludeDef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncludeDef")
            .field("name", &self.name)
            .field("target", &(self.target)().table)
            .field("local_field", &self.local_field)
            .field("target_field", &self.target_field)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
    pub writable: bool,
}

/// Storage-facing view of a descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableSchema {
    pub entity: String,
    pub table: String,
    pub primary_key: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
    }

    pub fn pk_column(&self) -> Option<&ColumnDef> {
        self.column(&self.primary_key)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

pub struct EntityDescriptor<E> {
    fields: Vec<FieldDef<E>>,
    index: HashMap<String, usize>,
    foreign_keys: Vec<ForeignKeyRelation>,
    includes: Vec<IncludeDef<E>>,
    schema: TableSchema,
}

impl<E> fmt::Debug for EntityDescriptor<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("schema", &self.schema)
            .field("foreign_keys", &self.foreign_keys)
            .field("includes", &self.includes)
            .finish()
    }
}

impl<E> EntityDescriptor<E> {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            fields: Vec::new(),
            index: HashMap::new(),
            foreign_keys: Vec::new(),
            includes: Vec::new(),
            schema: TableSchema {
                entity: name.into(),
                table: table.into(),
                ..Default::default()
            },
        }
    }

    pub fn field(mut self, def: FieldDef<E>) -> Self {
        self.index
            .entry(def.name.to_lowercase())
            .or_insert(self.fields.len());
        self.schema.columns.push(ColumnDef {
            name: def.name.clone(),
            kind: def.kind,
            nullable: def.nullable,
            writable: def.writable,
        });
        self.fields.push(def);
        self
    }

    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.schema.primary_key = field.into();
        self
    }

    pub fn foreign_key(
        mut self,
        field: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_key: impl Into<String>,
    ) -> Self {
        self.foreign_keys.push(ForeignKeyRelation {
            field: field.into(),
            referenced_table: referenced_table.into(),
            referenced_key: referenced_key.into(),
        });
        self
    }

    pub fn include(mut self, def: IncludeDef<E>) -> Self {
        self.includes.push(def);
        self
    }

    pub fn name(&self) -> &str {
        &self.schema.entity
    }

    pub fn table(&self) -> &str {
        &self.schema.table
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn fields(&self) -> &[FieldDef<E>] {
        &self.fields
    }

    /// Case-insensitive field lookup.
    pub fn field_def(&self, name: &str) -> Option<&FieldDef<E>> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.index.get(&name.to_lowercase()).map(|&i| &self.fields[i]))
    }

    pub fn require_field(&self, name: &str) -> Result<&FieldDef<E>, ModelError> {
        self.field_def(name).ok_or_else(|| ModelError::UnknownField {
            entity: self.name().to_string(),
            field: name.to_string(),
        })
    }

    pub fn primary_key_name(&self) -> &str {
        &self.schema.primary_key
    }

    pub fn pk_field(&self) -> Result<&FieldDef<E>, ModelError> {
        self.field_def(&self.schema.primary_key)
            .ok_or_else(|| ModelError::MissingPrimaryKey {
                entity: self.name().to_string(),
                field: self.schema.primary_key.clone(),
            })
    }

    pub fn foreign_keys(&self) -> &[ForeignKeyRelation] {
        &self.foreign_keys
    }

    pub fn includes(&self) -> &[IncludeDef<E>] {
        &self.includes
    }

    pub fn include_def(&self, name: &str) -> Option<&IncludeDef<E>> {
        self.includes
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }

    /// Structural checks run once before a descriptor is used.
    pub fn validate(&self) -> Result<(), ModelError> {
        let entity = || self.name().to_string();

        let mut seen = HashSet::new();
        for f in &self.fields {
            if !seen.insert(f.name.to_lowercase()) {
                return Err(ModelError::DuplicateField {
                    entity: entity(),
                    field: f.name.clone(),
                });
            }
        }
        self.pk_field()?;
        for fk in &self.foreign_keys {
            if self.field_def(&fk.field).is_none() {
                return Err(ModelError::UnknownForeignKeyField {
                    entity: entity(),
                    field: fk.field.clone(),
                });
            }
        }
        let mut names = HashSet::new();
        for inc in &self.includes {
            let key = inc.name.to_lowercase();
            if seen.contains(&key) || !names.insert(key) {
                return Err(ModelError::InvalidInclude {
                    entity: entity(),
                    name: inc.name.clone(),
                });
            }
            if self.field_def(&inc.local_field).is_none() {
                return Err(ModelError::UnknownIncludeField {
                    entity: entity(),
                    name: inc.name.clone(),
                    field: inc.local_field.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn key_of(&self, entity: &E) -> Result<FieldValue, ModelError> {
        Ok(self.pk_field()?.get(entity))
    }

    /// All columns of `entity`.
    pub fn to_row(&self, entity: &E) -> Row {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.get(entity)))
            .collect()
    }

    /// Decode a full row. A value that cannot be coerced fails; a null in a
    /// non-nullable field leaves the default.
    pub fn hydrate(&self, row: &Row) -> Result<E, ValueError>
    where
        E: Default,
    {
        let mut entity = E::default();
        for f in &self.fields {
            if let Some(v) = row.get(&f.name) {
                if v.is_null() && !f.nullable {
                    continue;
                }
                f.set(&mut entity, v.clone())?;
            }
        }
        Ok(entity)
    }

    /// Copy the named writable fields from `src` onto `dst`. Read-only names
    /// are skipped; unknown names fail.
    pub(crate) fn copy_fields(&self, src: &E, dst: &mut E, names: &[String]) -> Result<(), ModelError> {
        for name in names {
            let f = self.require_field(name)?;
            if !f.writable {
                debug!(entity = self.name(), field = %f.name, "skipping read-only field in subset");
                continue;
            }
            (f.setter)(dst, f.get(src))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default, Debug, PartialEq)]
    struct Tag {
        id: i64,
        label: String,
        note: Option<String>,
    }

    fn tag_desc() -> EntityDescriptor<Tag> {
        EntityDescriptor::new("Tag", "tags")
            .field(
                FieldDef::new("Id", FieldKind::I64, |t: &Tag| t.id.into(), |t, v| {
                    t.id = v.try_into()?;
                    Ok(())
                })
                .read_only(),
            )
            .field(FieldDef::new(
                "Label",
                FieldKind::String,
                |t: &Tag| t.label.clone().into(),
                |t, v| {
                    t.label = v.try_into()?;
                    Ok(())
                },
            ))
            .field(
                FieldDef::new(
                    "Note",
                    FieldKind::String,
                    |t: &Tag| t.note.clone().into(),
                    |t, v| {
                        t.note = v.try_into()?;
                        Ok(())
                    },
                )
                .nullable(),
            )
            .primary_key("Id")
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let d = tag_desc();
        assert_eq!(d.field_def("label").map(|f| f.name.as_str()), Some("Label"));
        assert!(d.field_def("missing").is_none());
        assert_eq!(d.schema().column("NOTE").map(|c| c.nullable), Some(true));
        assert_eq!(d.schema().pk_column().map(|c| c.writable), Some(false));
    }

    #[test]
    fn validate_rejects_bad_descriptors() {
        assert!(tag_desc().validate().is_ok());

        let no_pk = tag_desc().primary_key("Nope");
        assert!(matches!(
            no_pk.validate(),
            Err(ModelError::MissingPrimaryKey { .. })
        ));

        let dup = tag_desc().field(FieldDef::new(
            "label",
            FieldKind::String,
            |t: &Tag| t.label.clone().into(),
            |_, _| Ok(()),
        ));
        assert!(matches!(dup.validate(), Err(ModelError::DuplicateField { .. })));

        let fk = tag_desc().foreign_key("OwnerId", "owners", "Id");
        assert!(matches!(
            fk.validate(),
            Err(ModelError::UnknownForeignKeyField { .. })
        ));
    }

    #[test]
    fn row_round_trip_through_accessors() {
        let d = tag_desc();
        let t = Tag {
            id: 4,
            label: "rust".into(),
            note: None,
        };
        let row = d.to_row(&t);
        assert_eq!(row.get("Note"), Some(&FieldValue::Null));
        assert_eq!(d.hydrate(&row).unwrap(), t);
    }

    #[test]
    fn copy_fields_skips_read_only() {
        let d = tag_desc();
        let src = Tag {
            id: 9,
            label: "x".into(),
            note: Some("n".into()),
        };
        let mut dst = Tag::default();
        d.copy_fields(&src, &mut dst, &["note".to_string()]).unwrap();
        assert_eq!(dst.note.as_deref(), Some("n"));
        d.copy_fields(&src, &mut dst, &["Id".to_string(), "Label".to_string()])
            .unwrap();
        assert_eq!(dst.id, 0);
        assert_eq!(dst.label, "x");
        assert!(matches!(
            d.copy_fields(&src, &mut dst, &["Colour".to_string()]),
            Err(ModelError::UnknownField { .. })
        ));
    }
}

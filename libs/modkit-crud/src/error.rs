use thiserror::Error;

use crate::value::FieldKind;

/// Top-level error of every engine operation.
#[derive(Debug, Error)]
pub enum CrudError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{entity} with id {id} not found")]
    NotFound { entity: String, id: String },

    #[error("batch item {index} failed: {source}")]
    BatchItem {
        index: usize,
        #[source]
        source: Box<CrudError>,
    },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl CrudError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        match self {
            Self::Validation(_) => true,
            Self::BatchItem { source, .. } => source.is_validation(),
            _ => false,
        }
    }
}

impl From<modkit_query::Error> for CrudError {
    fn from(e: modkit_query::Error) -> Self {
        Self::Query(e.into())
    }
}

impl From<ValueError> for CrudError {
    fn from(e: ValueError) -> Self {
        Self::Model(e.into())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} references missing {referenced} with key {value}")]
    MissingReference {
        field: String,
        value: String,
        referenced: String,
    },

    #[error("{entity} {id} does not satisfy '{clause}'")]
    WhereClauseMismatch {
        entity: String,
        id: String,
        clause: String,
    },
}

/// Translating a request against an entity descriptor failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("unknown filter operator: {0}")]
    UnknownOperator(String),

    #[error("unknown include: {0}")]
    UnknownInclude(String),

    #[error("type mismatch on {field}: expected {expected:?}, got {got}")]
    TypeMismatch {
        field: String,
        expected: FieldKind,
        got: &'static str,
    },

    #[error("{field} is numeric but '{value}' is not a number")]
    NotNumeric { field: String, value: String },

    #[error("invalid literal for {field}: {message}")]
    InvalidLiteral { field: String, message: String },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("page size {requested} exceeds the maximum of {max}")]
    PageSizeTooLarge { requested: u64, max: u64 },

    #[error(transparent)]
    Request(modkit_query::Error),
}

impl From<modkit_query::Error> for QueryError {
    fn from(e: modkit_query::Error) -> Self {
        match e {
            modkit_query::Error::UnknownOperator(op) => Self::UnknownOperator(op),
            other => Self::Request(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("cannot decode column {column}: {message}")]
    Decode { column: String, message: String },

    #[error("not supported by this backend: {0}")]
    Unsupported(&'static str),

    #[cfg(feature = "sea-orm")]
    #[error(transparent)]
    Sea(#[from] sea_orm::DbErr),
}

/// Invalid entity descriptor or a value that does not fit it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("{entity}: duplicate field {field}")]
    DuplicateField { entity: String, field: String },

    #[error("{entity}: primary key {field} is not a declared field")]
    MissingPrimaryKey { entity: String, field: String },

    #[error("{entity}: foreign key field {field} is not a declared field")]
    UnknownForeignKeyField { entity: String, field: String },

    #[error("{entity}: include {name} is declared twice or shadows a field")]
    InvalidInclude { entity: String, name: String },

    #[error("{entity}: include {name} joins on undeclared field {field}")]
    UnknownIncludeField {
        entity: String,
        name: String,
        field: String,
    },

    #[error("{entity} has no field {field}")]
    UnknownField { entity: String, field: String },

    #[error(transparent)]
    Value(#[from] ValueError),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("expected {expected:?}, got {got}")]
    TypeMismatch {
        expected: FieldKind,
        got: &'static str,
    },

    #[error("cannot parse '{input}' as {kind:?}: {message}")]
    Parse {
        kind: FieldKind,
        input: String,
        message: String,
    },

    #[error("{value} is out of range for {kind:?}")]
    OutOfRange { kind: FieldKind, value: String },

    #[error("unexpected null for non-nullable {0}")]
    UnexpectedNull(&'static str),

    #[error("row must be a JSON object")]
    NotAnObject,
}

impl ValueError {
    pub(crate) fn parse(kind: FieldKind, input: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            kind,
            input: input.into(),
            message: message.to_string(),
        }
    }
}

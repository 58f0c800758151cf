//! Import failure taxonomy. Every variant carries enough context to name
//! the failing entity kind and row without re-reading logs; all of them
//! end the run in rollback.

use thiserror::Error;

use crate::model::ExternalId;

use super::order::EntityKind;

#[derive(Debug, Error)]
pub enum ImportError {
    /// A non-null foreign key referenced an external id with no recorded
    /// mapping: either a dependency-order defect or missing parent data.
    #[error("{entity} row {row}: {field} references unknown {parent} external id {external_id}")]
    Referential {
        entity: EntityKind,
        row: usize,
        field: &'static str,
        parent: EntityKind,
        external_id: ExternalId,
    },

    /// The store rejected a row (uniqueness, non-null, malformed value).
    #[error("{entity} row {row}: store rejected the row")]
    Constraint {
        entity: EntityKind,
        row: usize,
        #[source]
        source: sqlx::Error,
    },

    /// A link-table replace (delete + bulk insert) was rejected as a
    /// whole; link rows are written batched, so no single row index.
    #[error("{entity}: link replace rejected by the store")]
    LinkReplace {
        entity: EntityKind,
        #[source]
        source: sqlx::Error,
    },

    /// Connection or transaction-control failure outside any single row.
    #[error("store error during import")]
    Store(#[from] sqlx::Error),

    /// The same (entity kind, external id) was recorded with two different
    /// surrogate keys in one run. Orchestration bug, not bad input.
    #[error("{entity} external id {external_id} mapped twice: {existing} then {conflicting}")]
    IdConflict {
        entity: EntityKind,
        external_id: ExternalId,
        existing: i64,
        conflicting: i64,
    },

    /// Composition-time misconfiguration (e.g. an entity kind missing
    /// from the upsert order). Detected before any row is written.
    #[error("import configuration error: {0}")]
    Config(String),

    /// The run failed and the rollback failed too. Both causes surface.
    #[error("import failed and rollback also failed: {rollback}")]
    RollbackFailed {
        #[source]
        cause: Box<ImportError>,
        rollback: sqlx::Error,
    },
}

impl ImportError {
    /// Entity kind the failure is attributed to, when one applies.
    pub fn entity(&self) -> Option<EntityKind> {
        match self {
            ImportError::Referential { entity, .. }
            | ImportError::Constraint { entity, .. }
            | ImportError::LinkReplace { entity, .. }
            | ImportError::IdConflict { entity, .. } => Some(*entity),
            ImportError::RollbackFailed { cause, .. } => cause.entity(),
            ImportError::Store(_) | ImportError::Config(_) => None,
        }
    }

    /// Zero-based index of the failing row within its batch, when known.
    pub fn row(&self) -> Option<usize> {
        match self {
            ImportError::Referential { row, .. } | ImportError::Constraint { row, .. } => {
                Some(*row)
            }
            ImportError::RollbackFailed { cause, .. } => cause.row(),
            _ => None,
        }
    }
}

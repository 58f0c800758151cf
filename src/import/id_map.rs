//! Per-run external-id → surrogate-key map. Built fresh for every run
//! and discarded with it; the store itself is the durable record of id
//! assignment. Single writer, no locking (one run, one controller).

use std::collections::HashMap;

use crate::model::ExternalId;

use super::error::ImportError;
use super::order::EntityKind;

#[derive(Debug, Default)]
pub struct IdMap {
    maps: HashMap<EntityKind, HashMap<ExternalId, i64>>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one resolved mapping. Recording the same pair twice with
    /// the same key is a no-op; with a different key it is an orchestration
    /// bug and fails the run.
    pub fn record(
        &mut self,
        entity: EntityKind,
        external_id: ExternalId,
        internal_id: i64,
    ) -> Result<(), ImportError> {
        let per_kind = self.maps.entry(entity).or_default();
        if let Some(existing) = per_kind.get(&external_id) {
            if *existing != internal_id {
                return Err(ImportError::IdConflict {
                    entity,
                    external_id,
                    existing: *existing,
                    conflicting: internal_id,
                });
            }
            return Ok(());
        }
        per_kind.insert(external_id, internal_id);
        Ok(())
    }

    /// `None` means the parent has not been upserted in this run: either
    /// a legitimately null source reference (caller's case) or a
    /// dependency-order bug (caller reports it as referential).
    pub fn resolve(&self, entity: EntityKind, external_id: &ExternalId) -> Option<i64> {
        self.maps.get(&entity)?.get(external_id).copied()
    }

    pub fn len(&self, entity: EntityKind) -> usize {
        self.maps.get(&entity).map_or(0, |m| m.len())
    }
}

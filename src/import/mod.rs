//! Upsert orchestration: dependency ordering, external→surrogate id
//! mapping, foreign-key rewriting, insert-or-update execution, and the
//! all-or-nothing transaction around one import run.

pub mod error;
pub mod id_map;
pub mod order;
pub mod resolve;
pub mod runner;
pub mod upsert;

pub use error::ImportError;
pub use id_map::IdMap;
pub use order::{verify_upsert_order, EntityKind, UPSERT_ORDER};
pub use runner::{run_import, ImportReport, StepCounts};
pub use upsert::RowOutcome;

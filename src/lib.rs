pub mod db;
pub mod extract;
pub mod import;
pub mod model;
pub mod trace;

pub mod util {
    pub mod env;
}

pub use db::Db;
pub use import::{run_import, ImportError, ImportReport};
pub use model::ImportBatches;

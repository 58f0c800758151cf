//! Source extraction adapters. The engine only sees the typed batches
//! these produce.

pub mod csv;

pub use csv::read_import_batches;

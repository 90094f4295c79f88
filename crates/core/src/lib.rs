//! Core library: metadata normalization, offset resolution, filename
//! matching, asset filtering and the reconciliation run itself.

pub mod config;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod matcher;
pub mod metadata;
pub mod models;
pub mod offset;
pub mod reconcile;
pub mod scanner;

pub use error::ReconcileError;
pub use reconcile::{Reconciler, ReconcileOptions};

//! Infrastructure layer: stores, engines and configuration.

pub mod auth_engine;
pub mod batch_update;
pub mod catalog;
pub mod config;
pub mod store;

pub use auth_engine::{AuthEngine, AuthError, Session};
pub use batch_update::{
    BatchError, BatchResult, BatchUpdateEngine, DuplicateId, FailedUpdate, FailureReason, ItemOutcome, UpdateError,
};
pub use catalog::{ArticleCatalog, CatalogError};
pub use config::{AppConfig, SeedAdmin};

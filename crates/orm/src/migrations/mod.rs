//! Migrations: reversible schema changes tracked in batches

mod definitions;
mod manager;
mod migrator;

pub use definitions::*;
pub use manager::MigrationManager;
pub use migrator::{MigrationRecord, Migrator};

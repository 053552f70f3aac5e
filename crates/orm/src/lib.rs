//! # larix-orm: Database Layer for larix
//!
//! Connections over the sqlx `Any` driver, a fluent query builder with
//! per-dialect grammars, schema blueprints, batch-tracked migrations,
//! active-record models, factories and seeders.

pub mod connection;
pub mod error;
pub mod factory;
pub mod grammar;
pub mod migrations;
pub mod model;
pub mod query;
pub mod schema;
pub mod seeding;
pub mod support;

pub use connection::{Database, DatabaseConfig, DatabaseManager, DbTransaction, Driver, Executor, Row};
pub use error::*;
pub use factory::{Factory, Fake};
pub use grammar::{grammar_for, Grammar, MySqlGrammar, PostgresGrammar, SqliteGrammar};
pub use migrations::{
    MigrateOptions, Migration, MigrationManager, MigrationRunResult, MigrationStatus,
    MigrationStatusEntry, Migrator, RollbackOptions, RollbackResult, SqlMigration, StatusFilter,
};
pub use model::{Cast, Model, ModelExt, Record};
pub use query::{Hydrate, OrderDirection, Paginator, QueryBuilder};
pub use schema::{Blueprint, ColumnDefinition, ColumnType, ForeignKeyBuilder, Schema};
pub use seeding::{Seeder, SeederRunner};

//! Database connections over the sqlx `Any` driver

mod database;
mod driver;
mod manager;
mod value;

pub use database::{Database, DatabaseConfig, DbTransaction, Executor};
pub use driver::Driver;
pub use manager::DatabaseManager;
pub use value::{value_as_f64, value_as_i64, Row};

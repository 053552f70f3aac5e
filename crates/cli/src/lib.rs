//! # larix-cli
//!
//! The `larix` console. Applications build a [`Console`], register their
//! compiled migrations, seeders and routes, then hand over the process
//! arguments:
//!
//! ```no_run
//! # async fn run() -> std::process::ExitCode {
//! use larix_cli::Console;
//!
//! Console::new().base_path(".").run_from_args().await
//! # }
//! ```
//!
//! The stand-alone binary runs the same commands with only the `.sql`
//! migrations found under `database/migrations`.

pub mod cli;
mod commands;
pub mod console;
mod stubs;

pub use cli::Cli;
pub use console::{Console, DEFAULT_DATABASE};
pub use commands::db::DEFAULT_SEEDER;

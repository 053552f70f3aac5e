use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "larix")]
#[command(version, about = "larix application console")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run, roll back and inspect database migrations
    Migrate {
        #[command(subcommand)]
        migrate_command: MigrateCommands,
    },

    /// Seed, wipe and inspect the database
    Db {
        #[command(subcommand)]
        db_command: DbCommands,
    },

    /// Generate application code from stubs
    Make {
        #[command(subcommand)]
        make_command: MakeCommands,
    },

    /// Cache, clear and inspect configuration
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// Inspect and validate the environment
    Env {
        #[command(subcommand)]
        env_command: EnvCommands,
    },

    /// Put the application into maintenance mode
    Down {
        /// Message shown to visitors
        #[arg(long)]
        message: Option<String>,

        /// Seconds sent in the Retry-After header
        #[arg(long)]
        retry: Option<u64>,

        /// Secret that bypasses maintenance mode
        #[arg(long)]
        secret: Option<String>,

        /// IP address allowed through (repeatable)
        #[arg(long = "allow", value_name = "IP")]
        allow: Vec<String>,
    },

    /// Bring the application out of maintenance mode
    Up,

    /// Show whether the application is in maintenance mode
    Status,

    /// Manage the application key
    Key {
        #[command(subcommand)]
        key_command: KeyCommands,
    },

    /// Inspect registered routes
    Route {
        #[command(subcommand)]
        route_command: RouteCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum MigrateCommands {
    /// Run pending migrations
    Run {
        /// Run at most this many migrations
        #[arg(long)]
        step: Option<usize>,

        /// Print the SQL without executing it
        #[arg(long)]
        pretend: bool,

        /// Run the seeders afterwards
        #[arg(long)]
        seed: bool,

        /// Allow running in production
        #[arg(long)]
        force: bool,
    },

    /// Roll back the last batches
    Rollback {
        /// Number of batches to roll back
        #[arg(long, default_value_t = 1)]
        step: usize,

        #[arg(long)]
        pretend: bool,

        #[arg(long)]
        force: bool,
    },

    /// Roll back every migration
    Reset {
        #[arg(long)]
        force: bool,
    },

    /// Roll back every migration and run them again
    Refresh {
        #[arg(long)]
        seed: bool,

        #[arg(long)]
        force: bool,
    },

    /// Drop every table and run all migrations
    Fresh {
        #[arg(long)]
        seed: bool,

        #[arg(long)]
        force: bool,
    },

    /// Show which migrations have run
    Status {
        /// Only pending migrations
        #[arg(long, conflicts_with = "executed")]
        pending: bool,

        /// Only executed migrations
        #[arg(long)]
        executed: bool,
    },

    /// Create the migration tracking table
    Install,

    /// Create a new migration file
    Make {
        /// Migration name, e.g. add_votes_to_posts
        name: String,

        /// Table to create
        #[arg(long)]
        create: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DbCommands {
    /// Run database seeders
    Seed {
        /// Seeder to run instead of DatabaseSeeder
        #[arg(long)]
        class: Option<String>,

        /// Allow seeding in production
        #[arg(long)]
        force: bool,
    },

    /// Drop every table
    Wipe {
        #[arg(long)]
        force: bool,
    },

    /// List tables
    Tables,

    /// Show connection and migration status
    Status,
}

#[derive(Subcommand, Debug)]
pub enum MakeCommands {
    /// Create a model
    Model {
        name: String,

        /// Also create a create-table migration
        #[arg(short, long)]
        migration: bool,

        #[arg(long)]
        force: bool,
    },

    /// Create a controller
    Controller {
        name: String,

        /// Implement the resource actions
        #[arg(long)]
        resource: bool,

        #[arg(long)]
        force: bool,
    },

    /// Create a middleware
    Middleware {
        name: String,

        #[arg(long)]
        force: bool,
    },

    /// Create a policy
    Policy {
        name: String,

        /// Model the policy guards
        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        force: bool,
    },

    /// Create a seeder
    Seeder {
        name: String,

        #[arg(long)]
        force: bool,
    },

    /// Create a model factory
    Factory {
        name: String,

        /// Model the factory builds
        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        force: bool,
    },

    /// Create a view component
    Component {
        name: String,

        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write the merged configuration to the cache file
    Cache,

    /// Remove the configuration cache file
    Clear,

    /// Print the configuration, or a single key
    Show {
        /// Dotted key, e.g. database.default
        key: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum EnvCommands {
    /// Print the environment and the .env variables
    Show,

    /// Show every environment hint in priority order
    Detect,

    /// Check environment variables against the framework rules
    Validate,
}

#[derive(Subcommand, Debug)]
pub enum KeyCommands {
    /// Generate APP_KEY
    Generate {
        /// Print the key instead of writing .env
        #[arg(long)]
        show: bool,

        /// Replace an existing key in production
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum RouteCommands {
    /// List registered routes
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_migrate_run() {
        let cli = Cli::try_parse_from(["larix", "migrate", "run", "--step", "2", "--pretend"]).unwrap();
        match cli.command {
            Commands::Migrate {
                migrate_command: MigrateCommands::Run { step, pretend, seed, force },
            } => {
                assert_eq!(step, Some(2));
                assert!(pretend);
                assert!(!seed);
                assert!(!force);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_status_filters_conflict() {
        let result = Cli::try_parse_from(["larix", "migrate", "status", "--pending", "--executed"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_down_collects_allowed_ips() {
        let cli = Cli::try_parse_from([
            "larix", "down", "--retry", "30", "--allow", "10.0.0.1", "--allow", "10.0.0.2",
        ])
        .unwrap();
        match cli.command {
            Commands::Down { retry, allow, message, .. } => {
                assert_eq!(retry, Some(30));
                assert_eq!(allow, vec!["10.0.0.1", "10.0.0.2"]);
                assert!(message.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rollback_defaults_to_one_batch() {
        let cli = Cli::try_parse_from(["larix", "migrate", "rollback"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Migrate {
                migrate_command: MigrateCommands::Rollback { step: 1, pretend: false, force: false }
            }
        ));
    }
}

use crate::config::{Config, Environment};
use crate::container::Container;
use crate::environment::{Detection, EnvironmentDetector};
use crate::errors::{CoreError, CoreResult};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Registers services into the container and boots them once the
/// application is ready.
pub trait ServiceProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn register(&self, container: &mut Container, config: &Config) -> CoreResult<()>;

    fn boot(&self, app: &Application) -> CoreResult<()> {
        let _ = app;
        Ok(())
    }
}

type BootedCallback = Box<dyn FnOnce(&Application) + Send>;

/// Relative location of the cached configuration tree
pub const CONFIG_CACHE_PATH: &str = "bootstrap/cache/config.json";

/// Relative location of the maintenance mode marker
pub const MAINTENANCE_FILE: &str = "storage/framework/maintenance.json";

pub struct Application {
    base_path: PathBuf,
    config: Config,
    environment: Environment,
    container: Container,
    providers: Vec<Arc<dyn ServiceProvider>>,
    booted: bool,
    booted_callbacks: Vec<BootedCallback>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("base_path", &self.base_path)
            .field("environment", &self.environment)
            .field("providers", &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("booted", &self.booted)
            .finish()
    }
}

impl Application {
    pub fn new(base_path: impl Into<PathBuf>, config: Config, environment: Environment) -> Self {
        Self {
            base_path: base_path.into(),
            config,
            environment,
            container: Container::new(),
            providers: Vec::new(),
            booted: false,
            booted_callbacks: Vec::new(),
        }
    }

    /// Build an application from the files under `base_path`.
    ///
    /// Loads `.env`, detects the environment, then reads the cached config
    /// tree when present or the `config/` directory otherwise.
    pub fn bootstrap(base_path: impl Into<PathBuf>) -> CoreResult<Self> {
        let base_path = base_path.into();

        Config::load_env_file(base_path.join(".env"))?;

        let Detection {
            environment,
            source,
        } = EnvironmentDetector::new(&base_path).detect();
        tracing::info!(environment = %environment, source = %source, "bootstrapping application");

        let mut config = match Config::load_cached(base_path.join(CONFIG_CACHE_PATH))? {
            Some(cached) => {
                tracing::debug!("using cached configuration");
                cached
            }
            None => {
                let mut config = Config::new();
                config.load_directory(base_path.join("config"))?;
                config
            }
        };

        if !config.has("app.env") {
            config.set("app.env", Value::String(environment.to_string()));
        }
        if !config.has("app.debug") {
            let debug = Config::env_bool("APP_DEBUG", environment.is_debug_default());
            config.set("app.debug", Value::Bool(debug));
        }
        if !config.has("app.url") {
            if let Some(url) = Config::env("APP_URL") {
                config.set("app.url", url);
            }
        }

        Ok(Self::new(base_path, config, environment))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn config_path(&self) -> PathBuf {
        self.base_path.join("config")
    }

    pub fn storage_path(&self) -> PathBuf {
        self.base_path.join("storage")
    }

    pub fn database_path(&self) -> PathBuf {
        self.base_path.join("database")
    }

    pub fn resource_path(&self) -> PathBuf {
        self.base_path.join("resources")
    }

    pub fn public_path(&self) -> PathBuf {
        self.base_path.join("public")
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut Container {
        &mut self.container
    }

    pub fn is_local(&self) -> bool {
        self.environment.is_local()
    }

    pub fn is_production(&self) -> bool {
        self.environment.is_production()
    }

    pub fn is_booted(&self) -> bool {
        self.booted
    }

    pub fn is_down_for_maintenance(&self) -> bool {
        self.base_path.join(MAINTENANCE_FILE).exists()
    }

    pub fn make<T: Send + Sync + 'static>(&self) -> CoreResult<Arc<T>> {
        self.container.make::<T>()
    }

    /// Register a provider. Late providers are booted straight away.
    pub fn register(&mut self, provider: impl ServiceProvider + 'static) -> CoreResult<()> {
        let provider: Arc<dyn ServiceProvider> = Arc::new(provider);
        if self.providers.iter().any(|p| p.name() == provider.name()) {
            tracing::debug!(provider = provider.name(), "provider already registered");
            return Ok(());
        }

        provider
            .register(&mut self.container, &self.config)
            .map_err(|e| CoreError::provider(provider.name(), e.to_string()))?;
        tracing::debug!(provider = provider.name(), "provider registered");

        if self.booted {
            provider
                .boot(self)
                .map_err(|e| CoreError::provider(provider.name(), e.to_string()))?;
        }
        self.providers.push(provider);
        Ok(())
    }

    /// Boot every registered provider. Booting twice is a no-op.
    pub fn boot(&mut self) -> CoreResult<()> {
        if self.booted {
            return Ok(());
        }

        for provider in &self.providers {
            provider
                .boot(self)
                .map_err(|e| CoreError::provider(provider.name(), e.to_string()))?;
        }
        self.booted = true;
        tracing::info!(providers = self.providers.len(), "application booted");

        for callback in std::mem::take(&mut self.booted_callbacks) {
            callback(self);
        }
        Ok(())
    }

    /// Run `callback` once the application has booted
    pub fn booted(&mut self, callback: impl FnOnce(&Application) + Send + 'static) {
        if self.booted {
            callback(self);
        } else {
            self.booted_callbacks.push(Box::new(callback));
        }
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.name())
    }
}

use crate::config::Environment;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a detected environment came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionSource {
    AppEnvVar,
    LarixEnvVar,
    DotEnvFile,
    ConfigFile(PathBuf),
    Hostname(String),
    MarkerFile(PathBuf),
    ContinuousIntegration(String),
    Container,
    Fallback,
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionSource::AppEnvVar => write!(f, "APP_ENV variable"),
            DetectionSource::LarixEnvVar => write!(f, "LARIX_ENV variable"),
            DetectionSource::DotEnvFile => write!(f, ".env file"),
            DetectionSource::ConfigFile(path) => write!(f, "config file {}", path.display()),
            DetectionSource::Hostname(host) => write!(f, "hostname '{}'", host),
            DetectionSource::MarkerFile(path) => write!(f, "marker file {}", path.display()),
            DetectionSource::ContinuousIntegration(var) => write!(f, "CI variable {}", var),
            DetectionSource::Container => write!(f, "container runtime"),
            DetectionSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// Result of environment detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub environment: Environment,
    pub source: DetectionSource,
}

/// Detects the running environment from variables, files and host hints.
///
/// Sources are consulted in a fixed order and the first one that yields a
/// recognised environment wins. Without any hint the environment is `local`.
#[derive(Debug, Clone)]
pub struct EnvironmentDetector {
    base_path: PathBuf,
    vars: Option<HashMap<String, String>>,
    hostname: Option<String>,
    container_probe: bool,
}

impl EnvironmentDetector {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            vars: None,
            hostname: None,
            container_probe: true,
        }
    }

    /// Read variables from the given map instead of the process environment
    pub fn with_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars = Some(vars);
        self
    }

    /// Use a fixed hostname instead of probing the host
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Skip the `/.dockerenv` probe
    pub fn without_container_probe(mut self) -> Self {
        self.container_probe = false;
        self
    }

    pub fn detect(&self) -> Detection {
        self.detect_all()
            .into_iter()
            .next()
            .unwrap_or(Detection {
                environment: Environment::Local,
                source: DetectionSource::Fallback,
            })
    }

    /// Every source's opinion, in priority order
    pub fn detect_all(&self) -> Vec<Detection> {
        let probes: [&dyn Fn() -> Option<Detection>; 8] = [
            &|| self.from_var("APP_ENV", DetectionSource::AppEnvVar),
            &|| self.from_var("LARIX_ENV", DetectionSource::LarixEnvVar),
            &|| self.from_dotenv(),
            &|| self.from_config_file(),
            &|| self.from_hostname(),
            &|| self.from_marker_files(),
            &|| self.from_ci(),
            &|| self.from_container(),
        ];

        let detections: Vec<Detection> = probes.iter().filter_map(|probe| probe()).collect();
        if let Some(first) = detections.first() {
            tracing::debug!(
                environment = %first.environment,
                source = %first.source,
                "environment detected"
            );
        }
        detections
    }

    fn var(&self, name: &str) -> Option<String> {
        match &self.vars {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
        .filter(|value| !value.trim().is_empty())
    }

    fn from_var(&self, name: &str, source: DetectionSource) -> Option<Detection> {
        let environment = self.var(name)?.parse().ok()?;
        Some(Detection { environment, source })
    }

    fn from_dotenv(&self) -> Option<Detection> {
        let contents = fs::read_to_string(self.base_path.join(".env")).ok()?;
        let raw = contents.lines().find_map(|line| {
            let line = line.trim();
            let value = line.strip_prefix("APP_ENV=")?;
            Some(value.trim().trim_matches('"').trim_matches('\'').to_string())
        })?;
        Some(Detection {
            environment: raw.parse().ok()?,
            source: DetectionSource::DotEnvFile,
        })
    }

    fn from_config_file(&self) -> Option<Detection> {
        let config_dir = self.base_path.join("config");
        for file in ["app.json", "app.yaml", "app.yml"] {
            let path = config_dir.join(file);
            let Ok(contents) = fs::read_to_string(&path) else {
                continue;
            };
            let parsed: Option<Value> = if file.ends_with(".json") {
                serde_json::from_str(&contents).ok()
            } else {
                serde_yaml::from_str(&contents).ok()
            };
            let environment = parsed
                .as_ref()
                .and_then(|value| value.get("env"))
                .and_then(Value::as_str)
                .and_then(|raw| raw.parse().ok());
            if let Some(environment) = environment {
                return Some(Detection {
                    environment,
                    source: DetectionSource::ConfigFile(path),
                });
            }
        }
        None
    }

    fn from_hostname(&self) -> Option<Detection> {
        let hostname = self
            .hostname
            .clone()
            .or_else(|| self.var("HOSTNAME"))
            .or_else(|| {
                fs::read_to_string("/etc/hostname")
                    .ok()
                    .map(|h| h.trim().to_string())
            })?
            .to_lowercase();

        let environment = classify_hostname(&hostname)?;
        Some(Detection {
            environment,
            source: DetectionSource::Hostname(hostname),
        })
    }

    fn from_marker_files(&self) -> Option<Detection> {
        [
            (".production", Environment::Production),
            (".staging", Environment::Staging),
            (".testing", Environment::Testing),
            (".development", Environment::Development),
        ]
        .into_iter()
        .map(|(marker, environment)| (self.base_path.join(marker), environment))
        .find(|(path, _)| path.exists())
        .map(|(path, environment)| Detection {
            environment,
            source: DetectionSource::MarkerFile(path),
        })
    }

    fn from_ci(&self) -> Option<Detection> {
        ["CI", "GITHUB_ACTIONS", "GITLAB_CI"]
            .into_iter()
            .find(|name| self.var(name).is_some())
            .map(|name| Detection {
                environment: Environment::Testing,
                source: DetectionSource::ContinuousIntegration(name.to_string()),
            })
    }

    fn from_container(&self) -> Option<Detection> {
        let in_container = self.var("KUBERNETES_SERVICE_HOST").is_some()
            || (self.container_probe && Path::new("/.dockerenv").exists());
        in_container.then_some(Detection {
            environment: Environment::Production,
            source: DetectionSource::Container,
        })
    }
}

fn classify_hostname(hostname: &str) -> Option<Environment> {
    if hostname.contains("prod") {
        Some(Environment::Production)
    } else if hostname.contains("stag") {
        Some(Environment::Staging)
    } else if hostname.contains("test") || hostname.contains("ci") {
        Some(Environment::Testing)
    } else if hostname.contains("dev") || hostname.contains("local") {
        Some(Environment::Development)
    } else {
        None
    }
}

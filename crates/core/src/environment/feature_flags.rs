use crate::config::{ConfigError, Environment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Base state of a flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagState {
    Enabled,
    Disabled,
    Conditional,
}

/// Extra requirement evaluated for conditional flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FlagCondition {
    UserRole(Vec<String>),
    UserIds(Vec<String>),
    UserIdRange { min: i64, max: i64 },
    /// RFC3339 bounds, either side may be open
    TimeWindow {
        start: Option<String>,
        end: Option<String>,
    },
    EnvVar { name: String, value: String },
    RequestHeader { name: String, value: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub state: FlagState,
    #[serde(default)]
    pub environments: Vec<String>,
    #[serde(default)]
    pub rollout_percentage: Option<u8>,
    #[serde(default)]
    pub user_segments: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<FlagCondition>,
}

impl FeatureFlag {
    pub fn new(name: impl Into<String>, state: FlagState) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            state,
            environments: Vec::new(),
            rollout_percentage: None,
            user_segments: Vec::new(),
            conditions: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn environments(mut self, environments: &[Environment]) -> Self {
        self.environments = environments.iter().map(|e| e.as_str().to_string()).collect();
        self
    }

    pub fn rollout(mut self, percentage: u8) -> Self {
        self.rollout_percentage = Some(percentage.min(100));
        self
    }

    pub fn segments(mut self, segments: &[&str]) -> Self {
        self.user_segments = segments.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn condition(mut self, condition: FlagCondition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// Per-request facts a flag is evaluated against
#[derive(Debug, Clone, Default)]
pub struct FeatureContext {
    pub user_id: Option<String>,
    pub user_role: Option<String>,
    pub user_segments: Vec<String>,
    pub environment: Option<Environment>,
    pub headers: HashMap<String, String>,
}

impl FeatureContext {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.user_role = Some(role.into());
        self
    }

    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.user_segments.push(segment.into());
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FlagFile {
    flags: Vec<FeatureFlag>,
}

/// Registry of feature flags
#[derive(Debug, Clone, Default)]
pub struct FeatureFlagManager {
    flags: BTreeMap<String, FeatureFlag>,
}

impl FeatureFlagManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a flag
    pub fn define(&mut self, flag: FeatureFlag) {
        self.flags.insert(flag.name.clone(), flag);
    }

    /// Force a flag on, creating it when unknown
    pub fn enable(&mut self, name: &str) {
        self.flags
            .entry(name.to_string())
            .or_insert_with(|| FeatureFlag::new(name, FlagState::Enabled))
            .state = FlagState::Enabled;
    }

    pub fn disable(&mut self, name: &str) {
        self.flags
            .entry(name.to_string())
            .or_insert_with(|| FeatureFlag::new(name, FlagState::Disabled))
            .state = FlagState::Disabled;
    }

    pub fn remove(&mut self, name: &str) -> Option<FeatureFlag> {
        self.flags.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&FeatureFlag> {
        self.flags.get(name)
    }

    pub fn flags(&self) -> impl Iterator<Item = &FeatureFlag> {
        self.flags.values()
    }

    pub fn is_enabled(&self, name: &str, ctx: &FeatureContext) -> bool {
        let Some(flag) = self.flags.get(name) else {
            return false;
        };

        if flag.state == FlagState::Disabled {
            return false;
        }

        if !flag.environments.is_empty() {
            let matches = ctx
                .environment
                .map(|env| flag.environments.iter().any(|e| e.eq_ignore_ascii_case(env.as_str())))
                .unwrap_or(false);
            if !matches {
                return false;
            }
        }

        if !flag.user_segments.is_empty()
            && !ctx.user_segments.iter().any(|s| flag.user_segments.contains(s))
        {
            return false;
        }

        if let Some(percentage) = flag.rollout_percentage {
            let included = match &ctx.user_id {
                Some(user_id) => rollout_bucket(&flag.name, user_id) < u64::from(percentage),
                None => percentage >= 100,
            };
            if !included {
                return false;
            }
        }

        if flag.state == FlagState::Conditional {
            return flag.conditions.iter().all(|c| condition_holds(c, ctx));
        }

        true
    }

    /// Load flags from a JSON or YAML file, replacing flags with the same name
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let file: FlagFile = if is_yaml(path) {
            serde_yaml::from_str(&contents)?
        } else {
            serde_json::from_str(&contents)?
        };
        let count = file.flags.len();
        for flag in file.flags {
            self.define(flag);
        }
        Ok(count)
    }

    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let file = FlagFile {
            flags: self.flags.values().cloned().collect(),
        };
        let contents = if is_yaml(path) {
            serde_yaml::to_string(&file)?
        } else {
            serde_json::to_string_pretty(&file)?
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Stable 0..100 bucket for a flag/user pair
pub fn rollout_bucket(flag: &str, user_id: &str) -> u64 {
    let digest = Sha256::digest(format!("{}:{}", flag, user_id).as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % 100
}

fn condition_holds(condition: &FlagCondition, ctx: &FeatureContext) -> bool {
    match condition {
        FlagCondition::UserRole(roles) => ctx
            .user_role
            .as_ref()
            .map(|role| roles.contains(role))
            .unwrap_or(false),
        FlagCondition::UserIds(ids) => ctx
            .user_id
            .as_ref()
            .map(|id| ids.contains(id))
            .unwrap_or(false),
        FlagCondition::UserIdRange { min, max } => ctx
            .user_id
            .as_ref()
            .and_then(|id| id.parse::<i64>().ok())
            .map(|id| id >= *min && id <= *max)
            .unwrap_or(false),
        FlagCondition::TimeWindow { start, end } => {
            let now = Utc::now();
            let after_start = match start.as_deref().map(DateTime::parse_from_rfc3339) {
                Some(Ok(start)) => now >= start,
                Some(Err(_)) => false,
                None => true,
            };
            let before_end = match end.as_deref().map(DateTime::parse_from_rfc3339) {
                Some(Ok(end)) => now <= end,
                Some(Err(_)) => false,
                None => true,
            };
            after_start && before_end
        }
        FlagCondition::EnvVar { name, value } => {
            std::env::var(name).map(|v| &v == value).unwrap_or(false)
        }
        FlagCondition::RequestHeader { name, value } => {
            match (ctx.headers.get(&name.to_lowercase()), value) {
                (Some(actual), Some(expected)) => actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            }
        }
    }
}

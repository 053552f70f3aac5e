use crate::config::parse_bool;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// Expected shape of an environment value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvType {
    String,
    Integer,
    Float,
    Boolean,
    Url,
    Email,
}

impl EnvType {
    fn accepts(&self, value: &str) -> bool {
        match self {
            EnvType::String => true,
            EnvType::Integer => value.parse::<i64>().is_ok(),
            EnvType::Float => value.parse::<f64>().is_ok(),
            EnvType::Boolean => parse_bool(value).is_some(),
            EnvType::Url => url::Url::parse(value).map(|u| u.has_host()).unwrap_or(false),
            EnvType::Email => {
                let mut parts = value.splitn(2, '@');
                match (parts.next(), parts.next()) {
                    (Some(local), Some(domain)) => {
                        !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
                    }
                    _ => false,
                }
            }
        }
    }
}

#[derive(Clone)]
pub enum EnvRule {
    Required,
    Type(EnvType),
    Pattern(Regex),
    Choices(Vec<String>),
    Range { min: f64, max: f64 },
    MinLength(usize),
    Custom(String, fn(&str) -> bool),
}

impl fmt::Debug for EnvRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvRule::Required => write!(f, "Required"),
            EnvRule::Type(ty) => write!(f, "Type({:?})", ty),
            EnvRule::Pattern(re) => write!(f, "Pattern({})", re.as_str()),
            EnvRule::Choices(choices) => write!(f, "Choices({:?})", choices),
            EnvRule::Range { min, max } => write!(f, "Range({}..={})", min, max),
            EnvRule::MinLength(len) => write!(f, "MinLength({})", len),
            EnvRule::Custom(name, _) => write!(f, "Custom({})", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
struct RuleEntry {
    variable: String,
    rule: EnvRule,
    severity: Severity,
    message: String,
    /// Only applies when `APP_ENV` is one of these
    only_in: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub variable: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.error_count == 0
    }

    fn push(&mut self, issue: ValidationIssue) {
        match issue.severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            Severity::Info => self.info_count += 1,
        }
        self.issues.push(issue);
    }
}

/// Rule-based checker for environment variables
#[derive(Debug, Clone, Default)]
pub struct EnvValidator {
    rules: Vec<RuleEntry>,
}

impl EnvValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(
        mut self,
        variable: impl Into<String>,
        rule: EnvRule,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        self.rules.push(RuleEntry {
            variable: variable.into(),
            rule,
            severity,
            message: message.into(),
            only_in: Vec::new(),
        });
        self
    }

    /// Like [`EnvValidator::rule`] but only checked when `APP_ENV` is `environment`
    pub fn rule_in(
        mut self,
        environment: &str,
        variable: impl Into<String>,
        rule: EnvRule,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        self.rules.push(RuleEntry {
            variable: variable.into(),
            rule,
            severity,
            message: message.into(),
            only_in: vec![environment.to_string()],
        });
        self
    }

    /// Rules for the variables every larix application reads
    pub fn with_defaults() -> Self {
        Self::new()
            .rule(
                "APP_ENV",
                EnvRule::Choices(
                    ["local", "development", "testing", "staging", "production"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
                Severity::Error,
                "APP_ENV must be one of local, development, testing, staging, production",
            )
            .rule(
                "APP_DEBUG",
                EnvRule::Type(EnvType::Boolean),
                Severity::Error,
                "APP_DEBUG must be a boolean",
            )
            .rule(
                "APP_URL",
                EnvRule::Type(EnvType::Url),
                Severity::Warning,
                "APP_URL should be an absolute URL",
            )
            .rule(
                "SERVER_PORT",
                EnvRule::Type(EnvType::Integer),
                Severity::Error,
                "SERVER_PORT must be an integer",
            )
            .rule(
                "SERVER_PORT",
                EnvRule::Range { min: 1.0, max: 65535.0 },
                Severity::Error,
                "SERVER_PORT must be between 1 and 65535",
            )
            .rule(
                "APP_KEY",
                EnvRule::Required,
                Severity::Error,
                "APP_KEY is not set, run `larix key generate`",
            )
            .rule_in(
                "production",
                "APP_KEY",
                EnvRule::MinLength(32),
                Severity::Error,
                "APP_KEY must be at least 32 characters in production",
            )
    }

    pub fn validate(&self, vars: &HashMap<String, String>) -> ValidationReport {
        let mut report = ValidationReport::default();
        let app_env = vars.get("APP_ENV").map(|e| e.to_lowercase());

        for entry in &self.rules {
            if !entry.only_in.is_empty()
                && !app_env
                    .as_ref()
                    .map(|env| entry.only_in.contains(env))
                    .unwrap_or(false)
            {
                continue;
            }

            let value = vars.get(&entry.variable).filter(|v| !v.is_empty());
            let passed = match (&entry.rule, value) {
                (EnvRule::Required, value) => value.is_some(),
                (_, None) => true,
                (rule, Some(value)) => rule_passes(rule, value),
            };

            if !passed {
                report.push(ValidationIssue {
                    variable: entry.variable.clone(),
                    severity: entry.severity,
                    message: entry.message.clone(),
                });
            }
        }

        for issue in &report.issues {
            match issue.severity {
                Severity::Error => tracing::error!(variable = %issue.variable, "{}", issue.message),
                Severity::Warning => tracing::warn!(variable = %issue.variable, "{}", issue.message),
                Severity::Info => tracing::info!(variable = %issue.variable, "{}", issue.message),
            }
        }

        report
    }

    pub fn validate_process_env(&self) -> ValidationReport {
        let vars: HashMap<String, String> = std::env::vars().collect();
        self.validate(&vars)
    }
}

fn rule_passes(rule: &EnvRule, value: &str) -> bool {
    match rule {
        EnvRule::Required => true,
        EnvRule::Type(ty) => ty.accepts(value),
        EnvRule::Pattern(re) => re.is_match(value),
        EnvRule::Choices(choices) => choices.iter().any(|c| c.eq_ignore_ascii_case(value)),
        EnvRule::Range { min, max } => value
            .parse::<f64>()
            .map(|n| n >= *min && n <= *max)
            .unwrap_or(false),
        EnvRule::MinLength(len) => value.chars().count() >= *len,
        EnvRule::Custom(_, check) => check(value),
    }
}

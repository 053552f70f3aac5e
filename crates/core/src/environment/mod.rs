//! Environment detection, feature flags and environment validation

pub mod detector;
pub mod feature_flags;
pub mod validator;

pub use detector::{Detection, DetectionSource, EnvironmentDetector};
pub use feature_flags::{FeatureContext, FeatureFlag, FeatureFlagManager, FlagCondition, FlagState};
pub use validator::{EnvRule, EnvType, EnvValidator, Severity, ValidationIssue, ValidationReport};

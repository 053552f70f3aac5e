//! Feature flag gate for routes

use super::pipeline::{Middleware, Next, NextFuture};
use crate::errors::HttpError;
use crate::request::{LarixRequest, UserId, UserRole, UserSegments};
use larix_core::{Environment, FeatureContext, FeatureFlagManager};
use std::sync::Arc;

/// Responds 404 unless `flag` is enabled for the request context
#[derive(Debug, Clone)]
pub struct RequireFeature {
    flag: String,
    flags: Arc<FeatureFlagManager>,
    environment: Option<Environment>,
}

impl RequireFeature {
    pub fn new(flag: impl Into<String>, flags: Arc<FeatureFlagManager>) -> Self {
        Self {
            flag: flag.into(),
            flags,
            environment: None,
        }
    }

    pub fn in_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Feature context derived from the authenticated user, their role and
    /// segments, and the request headers
    pub fn context_for(&self, request: &LarixRequest) -> FeatureContext {
        let mut context = match request.get_extension::<UserId>() {
            Some(user) => FeatureContext::for_user(user.0.clone()),
            None => FeatureContext::default(),
        };
        if let Some(UserRole(role)) = request.get_extension::<UserRole>() {
            context = context.with_role(role.clone());
        }
        if let Some(UserSegments(segments)) = request.get_extension::<UserSegments>() {
            for segment in segments {
                context = context.with_segment(segment.clone());
            }
        }
        if let Some(environment) = self.environment {
            context = context.with_environment(environment);
        }
        for (name, value) in request.headers.iter() {
            if let Ok(value) = value.to_str() {
                context = context.with_header(name.as_str(), value);
            }
        }
        context
    }
}

impl Middleware for RequireFeature {
    fn handle(&self, request: LarixRequest, next: Next) -> NextFuture<'static> {
        let enabled = self.flags.is_enabled(&self.flag, &self.context_for(&request));
        let flag = self.flag.clone();
        Box::pin(async move {
            if enabled {
                next.run(request).await
            } else {
                tracing::debug!(flag = %flag, "feature disabled, hiding route");
                HttpError::not_found(request.path()).into_response(false)
            }
        })
    }

    fn name(&self) -> &'static str {
        "RequireFeature"
    }
}

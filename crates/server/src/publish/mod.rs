// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence of token state into the Railway variable store.
//!
//! Failures here never touch the in-memory token: a refresh that succeeded
//! stays applied even when publishing it does not.

pub mod railway;

use std::time::Duration;

use serde::Serialize;

pub use railway::RailwayPublisher;

pub const VAR_ACCESS_TOKEN: &str = "WITHINGS_ACCESS_TOKEN";
pub const VAR_REFRESH_TOKEN: &str = "WITHINGS_REFRESH_TOKEN";
pub const VAR_EXPIRES_AT: &str = "WITHINGS_TOKEN_EXPIRES_AT";
pub const VAR_LAST_REFRESHED: &str = "WITHINGS_TOKEN_LAST_REFRESHED";

/// Railway connection settings. Every id is required before any call.
#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub api_token: Option<String>,
    pub project_id: Option<String>,
    pub service_id: Option<String>,
    pub environment_id: Option<String>,
    pub api_url: String,
    pub timeout: Duration,
}

impl PublisherSettings {
    /// Names of the unset settings, in a stable order.
    pub fn missing(&self) -> Vec<String> {
        [
            ("RAILWAY_API_TOKEN", &self.api_token),
            ("RAILWAY_PROJECT_ID", &self.project_id),
            ("RAILWAY_SERVICE_ID", &self.service_id),
            ("RAILWAY_ENVIRONMENT_ID", &self.environment_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().map_or(true, |v| v.trim().is_empty()))
        .map(|(name, _)| name.to_owned())
        .collect()
    }

    pub fn is_configured(&self) -> bool {
        self.missing().is_empty()
    }
}

/// Outcome of a publish or redeploy. Variable names only, never values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishResult {
    Success { variables: Vec<String> },
    PartialSuccess { updated: Vec<String>, failed: Vec<String>, message: String },
    Deployed { deployment_id: String, url: Option<String> },
    AuthenticationError { message: String },
    NotFound { message: String },
    ApiError { message: String },
    DeploymentFailed { message: String },
    ConfigurationError { missing: Vec<String> },
}

impl PublishResult {
    /// Everything the call set out to do happened.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Deployed { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::PartialSuccess { .. } => "partial_success",
            Self::Deployed { .. } => "deployed",
            Self::AuthenticationError { .. } => "authentication_error",
            Self::NotFound { .. } => "not_found",
            Self::ApiError { .. } => "api_error",
            Self::DeploymentFailed { .. } => "deployment_failed",
            Self::ConfigurationError { .. } => "configuration_error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Success { variables } => format!("updated {}", variables.join(", ")),
            Self::Deployed { deployment_id, .. } => format!("deployment {deployment_id} started"),
            Self::PartialSuccess { message, .. }
            | Self::AuthenticationError { message }
            | Self::NotFound { message }
            | Self::ApiError { message }
            | Self::DeploymentFailed { message } => message.clone(),
            Self::ConfigurationError { missing } => {
                format!("missing configuration: {}", missing.join(", "))
            }
        }
    }
}

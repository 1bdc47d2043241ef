// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Railway GraphQL client: variable upserts, redeploys, variable read-back.

use std::collections::HashMap;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{PublishResult, PublisherSettings};
use crate::token::TokenState;

const UPSERT_COLLECTION: &str = "mutation VariablesUpsert($input: VariableCollectionUpsertInput!) { variableCollectionUpsert(input: $input) }";
const UPSERT_ONE: &str =
    "mutation VariableUpsert($input: VariableUpsertInput!) { variableUpsert(input: $input) }";
const DEPLOY: &str = "mutation ServiceInstanceDeploy($serviceId: String!, $environmentId: String!) { serviceInstanceDeployV2(serviceId: $serviceId, environmentId: $environmentId) }";
const VARIABLES: &str = "query Variables($projectId: String!, $environmentId: String!, $serviceId: String!) { variables(projectId: $projectId, environmentId: $environmentId, serviceId: $serviceId) }";

#[derive(Debug, Default, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

/// A GraphQL call that did not produce a usable response body.
#[derive(Debug)]
enum CallError {
    Transport(String),
    Status(StatusCode, String),
}

/// Classification of a GraphQL-level failure.
enum Rejection {
    Auth(String),
    NotFound(String),
    Other(String),
}

fn classify_messages(errors: &[GraphqlError]) -> Rejection {
    let joined = errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; ");
    let lower = joined.to_lowercase();
    if lower.contains("not authorized") || lower.contains("unauthorized") {
        Rejection::Auth(joined)
    } else if lower.contains("not found") {
        Rejection::NotFound(joined)
    } else {
        Rejection::Other(joined)
    }
}

/// Ids validated present, borrowed for one call.
struct Target<'a> {
    token: &'a str,
    project_id: &'a str,
    service_id: &'a str,
    environment_id: &'a str,
}

#[derive(Debug, Clone)]
pub struct RailwayPublisher {
    settings: PublisherSettings,
    http: reqwest::Client,
}

impl RailwayPublisher {
    pub fn new(settings: PublisherSettings) -> Self {
        let http = crate::http_client(settings.timeout);
        Self { settings, http }
    }

    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    pub fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    fn target(&self) -> Result<Target<'_>, Vec<String>> {
        let s = &self.settings;
        match (
            s.api_token.as_deref(),
            s.project_id.as_deref(),
            s.service_id.as_deref(),
            s.environment_id.as_deref(),
        ) {
            (Some(token), Some(project_id), Some(service_id), Some(environment_id))
                if s.is_configured() =>
            {
                Ok(Target { token, project_id, service_id, environment_id })
            }
            _ => Err(s.missing()),
        }
    }

    /// Write the four token variables without triggering a deploy.
    pub async fn publish(&self, state: &TokenState) -> PublishResult {
        let target = match self.target() {
            Ok(target) => target,
            Err(missing) => return PublishResult::ConfigurationError { missing },
        };
        let vars = state.to_variables();
        let names: Vec<String> = vars.iter().map(|(name, _)| (*name).to_owned()).collect();
        let collection: serde_json::Map<String, Value> =
            vars.iter().map(|(name, value)| ((*name).to_owned(), Value::String(value.clone()))).collect();

        let input = json!({
            "input": {
                "projectId": target.project_id,
                "environmentId": target.environment_id,
                "serviceId": target.service_id,
                "variables": collection,
                "skipDeploys": true,
            }
        });

        let resp = match self.call(&target, UPSERT_COLLECTION, input).await {
            Ok(resp) => resp,
            Err(e) => return call_failure(e),
        };
        if resp.errors.is_empty() {
            info!(count = names.len(), "published token variables to Railway");
            return PublishResult::Success { variables: names };
        }
        match classify_messages(&resp.errors) {
            Rejection::Auth(message) => PublishResult::AuthenticationError { message },
            Rejection::NotFound(message) => PublishResult::NotFound { message },
            Rejection::Other(message) => {
                warn!(err = %message, "collection upsert rejected, retrying per variable");
                self.publish_each(&target, &vars).await
            }
        }
    }

    async fn publish_each(&self, target: &Target<'_>, vars: &[(&'static str, String)]) -> PublishResult {
        let mut updated = Vec::new();
        let mut failed = Vec::new();
        let mut messages = Vec::new();

        for (name, value) in vars {
            let input = json!({
                "input": {
                    "projectId": target.project_id,
                    "environmentId": target.environment_id,
                    "serviceId": target.service_id,
                    "name": name,
                    "value": value,
                    "skipDeploys": true,
                }
            });
            let error = match self.call(target, UPSERT_ONE, input).await {
                Ok(resp) if resp.errors.is_empty() => None,
                Ok(resp) => Some(
                    resp.errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; "),
                ),
                Err(CallError::Transport(message)) => Some(message),
                Err(CallError::Status(status, _)) => Some(format!("HTTP {status}")),
            };
            match error {
                None => updated.push((*name).to_owned()),
                Some(message) => {
                    debug!(variable = *name, err = %message, "variable upsert failed");
                    failed.push((*name).to_owned());
                    messages.push(format!("{name}: {message}"));
                }
            }
        }

        if failed.is_empty() {
            info!(count = updated.len(), "published token variables to Railway one by one");
            PublishResult::Success { variables: updated }
        } else if updated.is_empty() {
            PublishResult::ApiError { message: messages.join("; ") }
        } else {
            PublishResult::PartialSuccess { updated, failed, message: messages.join("; ") }
        }
    }

    /// Start a new deployment of the configured service instance.
    pub async fn trigger_redeploy(&self) -> PublishResult {
        let target = match self.target() {
            Ok(target) => target,
            Err(missing) => return PublishResult::ConfigurationError { missing },
        };
        let vars = json!({
            "serviceId": target.service_id,
            "environmentId": target.environment_id,
        });

        let resp = match self.call(&target, DEPLOY, vars).await {
            Ok(resp) => resp,
            Err(CallError::Transport(message)) => return PublishResult::DeploymentFailed { message },
            Err(CallError::Status(status, body)) => {
                return PublishResult::DeploymentFailed { message: format!("HTTP {status}: {body}") }
            }
        };
        if !resp.errors.is_empty() {
            let message = resp.errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; ");
            return PublishResult::DeploymentFailed { message };
        }

        let deployment_id = resp
            .data
            .as_ref()
            .and_then(|d| d.get("serviceInstanceDeployV2"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_owned);
        let Some(deployment_id) = deployment_id else {
            return PublishResult::DeploymentFailed {
                message: "Railway returned no deployment".to_owned(),
            };
        };
        let url = format!(
            "https://railway.com/project/{}/service/{}?environmentId={}",
            target.project_id, target.service_id, target.environment_id
        );
        info!(deployment_id = %deployment_id, "triggered Railway redeploy");
        PublishResult::Deployed { deployment_id, url: Some(url) }
    }

    /// Read the service's current variables.
    pub async fn fetch_variables(&self) -> anyhow::Result<HashMap<String, String>> {
        let target = self.target().map_err(|missing| {
            anyhow::anyhow!("Railway not configured, missing: {}", missing.join(", "))
        })?;
        let vars = json!({
            "projectId": target.project_id,
            "environmentId": target.environment_id,
            "serviceId": target.service_id,
        });
        let resp = self.call(&target, VARIABLES, vars).await.map_err(|e| match e {
            CallError::Transport(message) => anyhow::anyhow!("Railway request failed: {message}"),
            CallError::Status(status, body) => anyhow::anyhow!("Railway returned HTTP {status}: {body}"),
        })?;
        if let Some(first) = resp.errors.first() {
            anyhow::bail!("Railway rejected variables query: {}", first.message);
        }

        let Some(Value::Object(map)) = resp.data.and_then(|mut d| d.get_mut("variables").map(Value::take))
        else {
            anyhow::bail!("Railway response has no variables object");
        };
        Ok(map
            .into_iter()
            .filter_map(|(name, value)| match value {
                Value::String(s) => Some((name, s)),
                _ => None,
            })
            .collect())
    }

    async fn call(&self, target: &Target<'_>, query: &str, variables: Value) -> Result<GraphqlResponse, CallError> {
        let resp = self
            .http
            .post(&self.settings.api_url)
            .bearer_auth(target.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallError::Transport("Railway API timeout".to_owned())
                } else {
                    CallError::Transport(format!("request error: {e}"))
                }
            })?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(CallError::Status(status, text.chars().take(200).collect()));
        }
        serde_json::from_str(&text)
            .map_err(|e| CallError::Transport(format!("unreadable Railway response: {e}")))
    }
}

fn call_failure(e: CallError) -> PublishResult {
    match e {
        CallError::Transport(message) => PublishResult::ApiError { message },
        CallError::Status(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, body) => {
            PublishResult::AuthenticationError { message: format!("Railway rejected the API token: {body}") }
        }
        CallError::Status(StatusCode::NOT_FOUND, body) => {
            PublishResult::NotFound { message: format!("Railway resource not found: {body}") }
        }
        CallError::Status(status, body) => {
            PublishResult::ApiError { message: format!("Railway returned HTTP {status}: {body}") }
        }
    }
}

#[cfg(test)]
#[path = "railway_tests.rs"]
mod tests;

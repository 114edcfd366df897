//! Client traits for the slices of the AWS control plane this crate uses.
//!
//! Every component takes one injected client handle through these traits
//! instead of constructing API clients per call, so production code shares
//! a single session and tests substitute in-memory fakes.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::types::{
    CreateRuleRequest, CreateTargetGroupRequest, Listener, LoadBalancerDescription, Rule, Service,
    ServiceRequest, TargetGroup, TaskDefinition,
};

/// Errors surfaced by the AWS control plane or the client wrapping it.
///
/// API errors are propagated verbatim: there is no retry or backoff
/// layer in front of them, and throttling surfaces as `CommandFailed`
/// like any other API error.
#[derive(Debug, Error)]
pub enum AwsError {
    /// The AWS call returned a non-zero exit status; `stderr` carries the
    /// API's error message unchanged.
    #[error("aws {operation} failed with exit code {code}: {stderr}")]
    CommandFailed {
        operation: String,
        code: i32,
        stderr: String,
    },

    #[error("aws {operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("failed to spawn '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("unexpected response from aws {operation}: {source}")]
    InvalidResponse {
        operation: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The ECS control-plane surface: task definitions and services.
#[async_trait]
pub trait EcsApi: Send + Sync {
    /// Families that currently have at least one ACTIVE revision.
    async fn list_task_definition_families(&self) -> Result<Vec<String>, AwsError>;

    /// ARNs of the given family's registered revisions, oldest first.
    async fn list_task_definitions(&self, family: &str) -> Result<Vec<String>, AwsError>;

    /// Full definition for a `family:revision` reference or ARN.
    async fn describe_task_definition(&self, reference: &str)
        -> Result<TaskDefinition, AwsError>;

    /// Register a new revision; ECS assigns the revision number.
    async fn register_task_definition(
        &self,
        definition: &TaskDefinition,
    ) -> Result<TaskDefinition, AwsError>;

    /// CreateService. There is deliberately no update-service call here;
    /// redeploying an existing service name surfaces the API error.
    async fn create_service(&self, request: &ServiceRequest) -> Result<Service, AwsError>;
}

/// The ELBv2 control-plane surface: target groups, rules, listeners.
#[async_trait]
pub trait ElbApi: Send + Sync {
    async fn describe_target_groups(&self) -> Result<Vec<TargetGroup>, AwsError>;

    async fn create_target_group(
        &self,
        request: &CreateTargetGroupRequest,
    ) -> Result<TargetGroup, AwsError>;

    /// All rules attached to a listener, including the default rule.
    async fn describe_rules(&self, listener_arn: &str) -> Result<Vec<Rule>, AwsError>;

    async fn create_rule(&self, request: &CreateRuleRequest) -> Result<Rule, AwsError>;

    async fn describe_listener(&self, listener_arn: &str) -> Result<Listener, AwsError>;

    async fn describe_load_balancer(
        &self,
        load_balancer_arn: &str,
    ) -> Result<LoadBalancerDescription, AwsError>;
}

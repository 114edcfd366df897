//! Event types for the deployment log.
//!
//! Every phase transition of a deployment is recorded as an immutable
//! event in an append-only log; the final event doubles as the payload
//! published to the webhook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single record in a deployment's append-only event log.
///
/// Events are the source of truth for deployment state. The state of any
/// deployment can be reconstructed by replaying its events in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The deployment this event belongs to
    pub deployment_id: Uuid,

    /// Service being deployed
    pub service_name: String,

    /// Type of event
    pub kind: EventKind,

    /// Deployment phase this event belongs to (if applicable)
    pub phase: Option<DeployPhase>,

    /// Human-readable summary (no secrets)
    pub summary: String,

    /// Time taken in milliseconds (for completed phases)
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,

    /// Resolved endpoint, set on the final event of a successful deploy
    pub external_url: Option<String>,

    /// Commit the deployed image was built from
    pub sha: Option<String>,

    /// Branch the deployed image was built from
    pub branch: Option<String>,

    /// Environment label (e.g. "staging")
    pub environment: Option<String>,

    /// `family:revision` reference once the task definition is resolved
    pub task_definition: Option<String>,

    /// Short digest of the desired task definition
    pub definition_digest: Option<String>,
}

impl DeploymentEvent {
    /// Create a new event with the current timestamp.
    pub fn new(
        deployment_id: Uuid,
        service_name: impl Into<String>,
        kind: EventKind,
        phase: Option<DeployPhase>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            deployment_id,
            service_name: service_name.into(),
            kind,
            phase,
            summary: summary.into(),
            duration_ms: None,
            error: None,
            external_url: None,
            sha: None,
            branch: None,
            environment: None,
            task_definition: None,
            definition_digest: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_endpoint(mut self, external_url: impl Into<String>) -> Self {
        self.external_url = Some(external_url.into());
        self
    }

    pub fn with_task_definition(mut self, reference: impl Into<String>) -> Self {
        self.task_definition = Some(reference.into());
        self
    }

    pub fn with_definition_digest(mut self, digest: impl Into<String>) -> Self {
        self.definition_digest = Some(digest.into());
        self
    }

    /// Attach the source provenance carried on the deploy request.
    pub fn with_source(
        mut self,
        sha: Option<String>,
        branch: Option<String>,
        environment: Option<String>,
    ) -> Self {
        self.sha = sha;
        self.branch = branch;
        self.environment = environment;
        self
    }
}

/// Types of events recorded during a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A deployment has started
    DeployStarted,

    /// A phase has started
    PhaseStarted,

    /// A phase completed successfully
    PhaseCompleted,

    /// The deployment completed; `external_url` carries the endpoint
    DeployCompleted,

    /// The deployment failed; `error` carries the message
    DeployFailed,
}

/// The phases a deployment moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    /// Derive the desired container spec (image, port)
    Init,

    /// Ensure target group and listener rule exist
    EnsureNetworking,

    /// Ensure the right task-definition revision is registered
    EnsureTaskDefinition,

    /// Create the ECS service
    CreateService,

    /// Terminal: endpoint resolved
    Done,

    /// Terminal: a phase failed
    Failed,
}

impl DeployPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployPhase::Init => "init",
            DeployPhase::EnsureNetworking => "ensure-networking",
            DeployPhase::EnsureTaskDefinition => "ensure-task-definition",
            DeployPhase::CreateService => "create-service",
            DeployPhase::Done => "done",
            DeployPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Deployment state and reconstruction from events.
//!
//! A Deployment represents a single execution of the deploy flow for one
//! service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{DeployPhase, DeploymentEvent, EventKind};

/// One deployment of a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique identifier for this deployment
    pub id: Uuid,

    /// Service being deployed
    pub service_name: String,

    /// Current state
    pub state: DeployState,

    /// Phase the deployment is in (or stopped at)
    pub phase: DeployPhase,

    /// When the deployment started
    pub started_at: DateTime<Utc>,

    /// When the deployment finished (if it has)
    pub completed_at: Option<DateTime<Utc>>,

    /// `family:revision` reference once resolved
    pub task_definition: Option<String>,

    /// Commit the deployed image was built from
    pub sha: Option<String>,

    /// Branch the deployed image was built from
    pub branch: Option<String>,

    /// Environment label
    pub environment: Option<String>,
}

impl Deployment {
    /// Create a new running deployment.
    pub fn new(id: Uuid, service_name: String) -> Self {
        Self {
            id,
            service_name,
            state: DeployState::Running,
            phase: DeployPhase::Init,
            started_at: Utc::now(),
            completed_at: None,
            task_definition: None,
            sha: None,
            branch: None,
            environment: None,
        }
    }

    /// Reconstruct deployment state from a sequence of events.
    pub fn from_events(events: &[DeploymentEvent]) -> Option<Self> {
        let first = events.first()?;

        let mut deployment = Self {
            id: first.deployment_id,
            service_name: first.service_name.clone(),
            state: DeployState::Running,
            phase: DeployPhase::Init,
            started_at: first.timestamp,
            completed_at: None,
            task_definition: None,
            sha: None,
            branch: None,
            environment: None,
        };

        for event in events {
            deployment.apply_event(event);
        }

        Some(deployment)
    }

    /// Apply a single event to update deployment state.
    pub fn apply_event(&mut self, event: &DeploymentEvent) {
        if let Some(ref reference) = event.task_definition {
            self.task_definition = Some(reference.clone());
        }
        if event.sha.is_some() {
            self.sha = event.sha.clone();
        }
        if event.branch.is_some() {
            self.branch = event.branch.clone();
        }
        if event.environment.is_some() {
            self.environment = event.environment.clone();
        }

        match event.kind {
            EventKind::DeployStarted => {
                self.state = DeployState::Running;
                self.started_at = event.timestamp;
            }
            EventKind::PhaseStarted | EventKind::PhaseCompleted => {
                if let Some(phase) = event.phase {
                    self.phase = phase;
                }
            }
            EventKind::DeployCompleted => {
                self.state = DeployState::Done {
                    target_url: event.external_url.clone().unwrap_or_default(),
                };
                self.phase = DeployPhase::Done;
                self.completed_at = Some(event.timestamp);
            }
            EventKind::DeployFailed => {
                self.state = DeployState::Failed {
                    error: event.error.clone().unwrap_or_default(),
                };
                self.phase = DeployPhase::Failed;
                self.completed_at = Some(event.timestamp);
            }
        }
    }

    /// Check if the deployment is still in progress.
    pub fn is_running(&self) -> bool {
        matches!(self.state, DeployState::Running)
    }

    /// Check if the deployment has finished (successfully or not).
    pub fn is_finished(&self) -> bool {
        !self.is_running()
    }

    /// The resolved endpoint, if the deployment succeeded.
    pub fn target_url(&self) -> Option<&str> {
        match self.state {
            DeployState::Done { ref target_url } => Some(target_url),
            _ => None,
        }
    }
}

/// State of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DeployState {
    /// Currently executing
    Running,

    /// Completed successfully; the service answers at `target_url`
    Done { target_url: String },

    /// Failed with error
    Failed { error: String },
}

impl Default for DeployState {
    fn default() -> Self {
        Self::Running
    }
}

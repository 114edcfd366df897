//! Core domain types for deployments.

pub mod deployment;
pub mod events;
pub mod target;

pub use deployment::{DeployState, Deployment};
pub use events::{DeployPhase, DeploymentEvent, EventKind};
pub use target::{DeployTarget, DeploymentSpec};

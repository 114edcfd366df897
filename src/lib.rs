//! gantry - Deployment orchestrator for Amazon ECS services
//!
//! Deploys containerized services to an ECS cluster behind a shared
//! application load balancer: one target group and one path-based listener
//! rule per service, task definitions registered only when they change,
//! and the whole run recorded as an event log.
//!
//! # Architecture
//!
//! Every deployment is event sourced:
//! - Each phase transition is recorded as an immutable event
//! - Deployment state is derived by replaying events
//! - Failed deployments leave a readable trail, including what they
//!   created on AWS before failing
//!
//! # Modules
//!
//! - `aws`: AWS access (typed ECS/ELB operations over the AWS CLI)
//! - `deploy`: Provisioners, the deployer, history, locking
//! - `domain`: Data structures (DeploymentEvent, Deployment, DeployTarget)
//! - `notify`: Webhook notifications
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Deploy a service
//! gantry deploy my-svc --image registry.example.com/my-svc:abc123
//!
//! # Check deployment status
//! gantry status <deployment-id>
//!
//! # List recent deployments
//! gantry history
//! ```

pub mod aws;
pub mod cli;
pub mod config;
pub mod deploy;
pub mod domain;
pub mod notify;

// Re-export main types at crate root for convenience
pub use aws::{AwsCli, AwsError, EcsApi, ElbApi};
pub use deploy::{
    DeployError, DeploymentLog, EcsDeployer, ListenerRuleProvisioner, RegisterOutcome,
    RuleOutcome, TargetGroupProvisioner, TaskDefinitionStore,
};
pub use domain::{
    DeployPhase, DeployState, DeployTarget, Deployment, DeploymentEvent, DeploymentSpec, EventKind,
};
pub use notify::WebhookPublisher;

//! Deployment pipeline: provisioners, orchestration, history.

pub mod deployer;
pub mod dockerfile;
pub mod error;
pub mod history;
pub mod listener_rules;
pub mod lock;
pub mod target_groups;
pub mod task_definitions;

pub use deployer::EcsDeployer;
pub use error::DeployError;
pub use history::DeploymentLog;
pub use listener_rules::{ListenerRuleProvisioner, RuleOutcome};
pub use lock::DeployLock;
pub use target_groups::{ProvisionedTargetGroup, TargetGroupProvisioner};
pub use task_definitions::{RegisterOutcome, TaskDefinitionStore};

//! Deployment orchestration.
//!
//! Runs one deployment through its phases: provision networking, settle the
//! task definition, create the ECS service, resolve the public endpoint.
//! Every phase transition is appended to the deployment's event log before
//! the next phase starts, so a crashed or failed deployment leaves a
//! readable trail.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::aws::types::{
    AwsVpcConfiguration, ContainerDefinition, LoadBalancerBinding, NetworkConfiguration,
    PortMapping, ServiceRequest, TaskDefinition,
};
use crate::aws::{EcsApi, ElbApi};
use crate::domain::{
    DeployPhase, DeployState, DeployTarget, Deployment, DeploymentEvent, DeploymentSpec, EventKind,
};
use crate::notify::WebhookPublisher;

use super::error::DeployError;
use super::history::DeploymentLog;
use super::listener_rules::{ListenerRuleProvisioner, RuleOutcome};
use super::lock::DeployLock;
use super::target_groups::TargetGroupProvisioner;
use super::task_definitions::TaskDefinitionStore;

/// Orchestrates deployments of services to one ECS cluster behind one
/// load-balancer listener.
pub struct EcsDeployer<C> {
    aws: C,
    target: DeployTarget,
    history_root: PathBuf,
    locks_dir: PathBuf,
    webhook: Option<WebhookPublisher>,
}

/// What the networking phase found or created.
struct ProvisionedNetworking {
    binding: LoadBalancerBinding,
    target_group_created: bool,
    rule: RuleOutcome,
}

impl<C: EcsApi + ElbApi> EcsDeployer<C> {
    pub fn new(
        aws: C,
        target: DeployTarget,
        history_root: impl Into<PathBuf>,
        locks_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            aws,
            target,
            history_root: history_root.into(),
            locks_dir: locks_dir.into(),
            webhook: None,
        }
    }

    /// Publish the final deployment event to this webhook.
    pub fn with_webhook(mut self, webhook: WebhookPublisher) -> Self {
        self.webhook = Some(webhook);
        self
    }

    pub fn target(&self) -> &DeployTarget {
        &self.target
    }

    /// Run a full deployment for `spec`.
    ///
    /// On success the returned deployment carries the service's URL. On
    /// failure the error is returned after a failure event has been
    /// recorded; nothing created on AWS is rolled back.
    #[instrument(skip(self, spec), fields(service = %spec.service_name, cluster = %self.target.cluster))]
    pub async fn deploy(&self, spec: &DeploymentSpec) -> Result<Deployment, DeployError> {
        self.validate(spec)?;

        let deployment_id = Uuid::new_v4();
        let started = Instant::now();
        info!(%deployment_id, image = %spec.image, "starting deployment");

        let log = DeploymentLog::open(&self.history_root, deployment_id)
            .await
            .map_err(DeployError::History)?;

        let mut deployment = Deployment::new(deployment_id, spec.service_name.clone());
        deployment.sha = spec.sha.clone();
        deployment.branch = spec.branch.clone();
        deployment.environment = self.target.environment.clone();

        let start_event = DeploymentEvent::new(
            deployment_id,
            &spec.service_name,
            EventKind::DeployStarted,
            Some(DeployPhase::Init),
            format!(
                "Deployment of '{}' to cluster '{}' started",
                spec.service_name, self.target.cluster
            ),
        )
        .with_source(
            spec.sha.clone(),
            spec.branch.clone(),
            self.target.environment.clone(),
        );
        self.append(&log, &start_event).await?;

        match self.run_phases(&log, &mut deployment, spec).await {
            Ok(target_url) => {
                self.complete(&log, &mut deployment, target_url, started)
                    .await
            }
            Err(error) => self.fail(&log, &mut deployment, error, started).await,
        }
    }

    /// Reject requests that cannot possibly succeed before touching AWS.
    fn validate(&self, spec: &DeploymentSpec) -> Result<(), DeployError> {
        if self.target.cluster.is_empty() {
            return Err(DeployError::Configuration("Cluster is not set".to_string()));
        }
        if self.target.listener_arn.is_empty() {
            return Err(DeployError::Configuration(
                "Listener ARN is not set".to_string(),
            ));
        }
        if self.target.vpc_id.is_empty() {
            return Err(DeployError::Configuration("VPC ID is not set".to_string()));
        }
        if spec.image.is_empty() && spec.task_definition.is_none() {
            return Err(DeployError::Configuration(
                "Either an image or a task definition is required".to_string(),
            ));
        }
        Ok(())
    }

    async fn run_phases(
        &self,
        log: &DeploymentLog,
        deployment: &mut Deployment,
        spec: &DeploymentSpec,
    ) -> Result<String, DeployError> {
        // Networking first, under the per-listener lock: rule priorities are
        // computed max+1 from a read, so concurrent deploys to the same
        // listener must not interleave here.
        self.phase_started(
            log,
            deployment,
            DeployPhase::EnsureNetworking,
            format!("Provisioning networking for '{}'", spec.service_name),
        )
        .await?;
        let phase_start = Instant::now();

        let networking = {
            let _lock = DeployLock::acquire(&self.locks_dir, &self.target.listener_arn)?;
            self.ensure_networking(spec).await?
        };

        self.phase_completed(
            log,
            deployment,
            DeployPhase::EnsureNetworking,
            networking_summary(&networking),
            phase_start,
        )
        .await?;

        let result = self.finish_phases(log, deployment, spec, &networking).await;

        if result.is_err() {
            // No rollback. Surface anything this deployment created so an
            // operator can clean up by hand.
            if networking.target_group_created {
                warn!(
                    target_group = %networking.binding.target_group_arn,
                    "deployment failed after creating a target group; it was left behind"
                );
            }
            if let RuleOutcome::Created { priority } = networking.rule {
                warn!(
                    priority,
                    path = %format!("/{}", spec.service_name),
                    "deployment failed after creating a listener rule; it was left behind"
                );
            }
        }

        result
    }

    async fn ensure_networking(
        &self,
        spec: &DeploymentSpec,
    ) -> Result<ProvisionedNetworking, DeployError> {
        let target_groups = TargetGroupProvisioner::new(&self.aws);
        let provisioned = target_groups
            .ensure(&spec.service_name, &self.target.vpc_id, spec.container_port)
            .await?;

        let rules = ListenerRuleProvisioner::new(&self.aws);
        let rule = rules
            .ensure(
                &self.target.listener_arn,
                &spec.service_name,
                &provisioned.binding.target_group_arn,
            )
            .await?;

        Ok(ProvisionedNetworking {
            binding: provisioned.binding,
            target_group_created: provisioned.created,
            rule,
        })
    }

    async fn finish_phases(
        &self,
        log: &DeploymentLog,
        deployment: &mut Deployment,
        spec: &DeploymentSpec,
        networking: &ProvisionedNetworking,
    ) -> Result<String, DeployError> {
        // Settle the task definition.
        self.phase_started(
            log,
            deployment,
            DeployPhase::EnsureTaskDefinition,
            format!("Resolving task definition for '{}'", spec.service_name),
        )
        .await?;
        let phase_start = Instant::now();

        let desired = self.desired_task_definition(spec);
        let store = TaskDefinitionStore::new(&self.aws);
        let outcome = store.register_if_different(&desired).await?;
        let definition = outcome.definition();
        let reference = definition.reference().ok_or_else(|| {
            DeployError::Configuration(format!(
                "Task definition for '{}' came back without a revision",
                spec.service_name
            ))
        })?;
        deployment.task_definition = Some(reference.clone());

        let summary = if outcome.is_registered() {
            format!("Registered task definition {}", reference)
        } else {
            format!("Reusing task definition {}", reference)
        };
        let mut event = DeploymentEvent::new(
            deployment.id,
            &deployment.service_name,
            EventKind::PhaseCompleted,
            Some(DeployPhase::EnsureTaskDefinition),
            summary,
        )
        .with_task_definition(reference.clone())
        .with_duration(phase_start.elapsed().as_millis() as u64);
        if let Some(digest) = definition_digest(definition) {
            event = event.with_definition_digest(digest);
        }
        self.append(log, &event).await?;

        // Create the service. There is no update path: redeploying an
        // existing service name fails on the AWS side and surfaces here.
        self.phase_started(
            log,
            deployment,
            DeployPhase::CreateService,
            format!("Creating service '{}'", spec.service_name),
        )
        .await?;
        let phase_start = Instant::now();

        let request = self.service_request(spec, &reference, networking.binding.clone());
        let service = self.aws.create_service(&request).await?;
        debug!(
            service_arn = service.service_arn.as_deref().unwrap_or("unknown"),
            "service created"
        );

        self.phase_completed(
            log,
            deployment,
            DeployPhase::CreateService,
            format!(
                "Service '{}' created with {} task(s)",
                spec.service_name, self.target.desired_count
            ),
            phase_start,
        )
        .await?;

        self.resolve_endpoint(&spec.service_name).await
    }

    /// The task definition this deploy wants active, either caller-supplied
    /// or generated from the image and port. A caller-supplied definition
    /// with no family is filed under the service name.
    fn desired_task_definition(&self, spec: &DeploymentSpec) -> TaskDefinition {
        if let Some(explicit) = &spec.task_definition {
            let mut definition = explicit.clone();
            if definition.family.is_empty() {
                definition.family = spec.service_name.clone();
            }
            return definition;
        }

        TaskDefinition {
            family: spec.service_name.clone(),
            revision: None,
            task_definition_arn: None,
            container_definitions: vec![ContainerDefinition {
                name: spec.service_name.clone(),
                image: spec.image.clone(),
                port_mappings: vec![PortMapping {
                    container_port: spec.container_port,
                    host_port: Some(spec.container_port),
                    protocol: Some("tcp".to_string()),
                }],
                essential: Some(true),
                environment: Vec::new(),
            }],
            cpu: self.target.cpu.clone(),
            memory: self.target.memory.clone(),
            network_mode: self.target.network_mode.clone(),
            requires_compatibilities: self.target.requires_compatibilities.clone(),
            execution_role_arn: self.target.execution_role_arn.clone(),
        }
    }

    fn service_request(
        &self,
        spec: &DeploymentSpec,
        reference: &str,
        binding: LoadBalancerBinding,
    ) -> ServiceRequest {
        let network_configuration = if self.target.subnets.is_empty() {
            None
        } else {
            Some(NetworkConfiguration {
                awsvpc_configuration: AwsVpcConfiguration {
                    subnets: self.target.subnets.clone(),
                    security_groups: self.target.security_groups.clone(),
                    assign_public_ip: self.target.assign_public_ip.map(|enabled| {
                        if enabled { "ENABLED" } else { "DISABLED" }.to_string()
                    }),
                },
            })
        };

        ServiceRequest {
            service_name: spec.service_name.clone(),
            cluster: self.target.cluster.clone(),
            task_definition: reference.to_string(),
            desired_count: self.target.desired_count,
            launch_type: self.target.launch_type.clone(),
            load_balancers: vec![binding],
            network_configuration,
        }
    }

    /// Resolve the service's public URL from the listener's load balancer.
    async fn resolve_endpoint(&self, service_name: &str) -> Result<String, DeployError> {
        let listener = self.aws.describe_listener(&self.target.listener_arn).await?;
        let lb = self
            .aws
            .describe_load_balancer(&listener.load_balancer_arn)
            .await?;

        let scheme = listener.protocol.to_lowercase();
        let authority = match (scheme.as_str(), listener.port) {
            ("http", 80) | ("https", 443) => lb.dns_name.clone(),
            _ => format!("{}:{}", lb.dns_name, listener.port),
        };

        Ok(format!("{}://{}/{}", scheme, authority, service_name))
    }

    async fn phase_started(
        &self,
        log: &DeploymentLog,
        deployment: &mut Deployment,
        phase: DeployPhase,
        summary: impl Into<String>,
    ) -> Result<(), DeployError> {
        deployment.phase = phase;
        debug!(%phase, "phase started");

        let event = DeploymentEvent::new(
            deployment.id,
            &deployment.service_name,
            EventKind::PhaseStarted,
            Some(phase),
            summary,
        );
        self.append(log, &event).await
    }

    async fn phase_completed(
        &self,
        log: &DeploymentLog,
        deployment: &mut Deployment,
        phase: DeployPhase,
        summary: impl Into<String>,
        phase_start: Instant,
    ) -> Result<(), DeployError> {
        let duration_ms = phase_start.elapsed().as_millis() as u64;
        deployment.phase = phase;
        debug!(%phase, duration_ms, "phase completed");

        let event = DeploymentEvent::new(
            deployment.id,
            &deployment.service_name,
            EventKind::PhaseCompleted,
            Some(phase),
            summary,
        )
        .with_duration(duration_ms);
        self.append(log, &event).await
    }

    async fn complete(
        &self,
        log: &DeploymentLog,
        deployment: &mut Deployment,
        target_url: String,
        started: Instant,
    ) -> Result<Deployment, DeployError> {
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(%target_url, duration_ms, "deployment completed");

        deployment.state = DeployState::Done {
            target_url: target_url.clone(),
        };
        deployment.phase = DeployPhase::Done;
        deployment.completed_at = Some(Utc::now());

        let mut event = DeploymentEvent::new(
            deployment.id,
            &deployment.service_name,
            EventKind::DeployCompleted,
            Some(DeployPhase::Done),
            format!(
                "Service '{}' is live at {}",
                deployment.service_name, target_url
            ),
        )
        .with_endpoint(target_url)
        .with_duration(duration_ms)
        .with_source(
            deployment.sha.clone(),
            deployment.branch.clone(),
            deployment.environment.clone(),
        );
        if let Some(reference) = &deployment.task_definition {
            event = event.with_task_definition(reference.clone());
        }
        self.append(log, &event).await?;

        self.notify(&event).await;

        Ok(deployment.clone())
    }

    async fn fail(
        &self,
        log: &DeploymentLog,
        deployment: &mut Deployment,
        failure: DeployError,
        started: Instant,
    ) -> Result<Deployment, DeployError> {
        let message = failure.to_string();
        error!(error = %message, "deployment failed");

        deployment.state = DeployState::Failed {
            error: message.clone(),
        };
        deployment.phase = DeployPhase::Failed;
        deployment.completed_at = Some(Utc::now());

        let event = DeploymentEvent::new(
            deployment.id,
            &deployment.service_name,
            EventKind::DeployFailed,
            Some(DeployPhase::Failed),
            format!("Deployment failed: {}", message),
        )
        .with_error(message)
        .with_duration(started.elapsed().as_millis() as u64)
        .with_source(
            deployment.sha.clone(),
            deployment.branch.clone(),
            deployment.environment.clone(),
        );

        // The failure event must not mask the failure itself.
        if let Err(append_error) = log.append(&event).await {
            warn!(error = %append_error, "could not record failure event");
        }

        self.notify(&event).await;

        Err(failure)
    }

    async fn append(&self, log: &DeploymentLog, event: &DeploymentEvent) -> Result<(), DeployError> {
        log.append(event).await.map_err(DeployError::History)
    }

    /// Fire-and-forget: a webhook failure is logged, never propagated.
    async fn notify(&self, event: &DeploymentEvent) {
        if let Some(webhook) = &self.webhook {
            if let Err(error) = webhook.publish(event).await {
                warn!(error = %error, "webhook notification failed");
            }
        }
    }
}

fn networking_summary(networking: &ProvisionedNetworking) -> String {
    let group = if networking.target_group_created {
        "created target group"
    } else {
        "target group exists"
    };
    let rule = match networking.rule {
        RuleOutcome::Created { priority } => format!("created listener rule at priority {}", priority),
        RuleOutcome::Exists => "listener rule exists".to_string(),
    };
    format!("Networking ready: {}, {}", group, rule)
}

/// Short content digest of a task definition, recorded with the
/// registration event for later comparison across deploys.
fn definition_digest(definition: &TaskDefinition) -> Option<String> {
    let json = serde_json::to_string(definition).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Some(hex::encode(&hasher.finalize()[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_networking_summary_wording() {
        let networking = ProvisionedNetworking {
            binding: LoadBalancerBinding {
                target_group_arn: "arn:tg".to_string(),
                container_name: "api".to_string(),
                container_port: 8080,
            },
            target_group_created: true,
            rule: RuleOutcome::Created { priority: 7 },
        };

        let summary = networking_summary(&networking);
        assert!(summary.contains("created target group"));
        assert!(summary.contains("priority 7"));
    }

    #[test]
    fn test_definition_digest_is_stable() {
        let definition = TaskDefinition {
            family: "api".to_string(),
            revision: None,
            task_definition_arn: None,
            container_definitions: Vec::new(),
            cpu: None,
            memory: None,
            network_mode: None,
            requires_compatibilities: Vec::new(),
            execution_role_arn: None,
        };

        let first = definition_digest(&definition).unwrap();
        let second = definition_digest(&definition).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 16);
    }
}

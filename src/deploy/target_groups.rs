//! Target group provisioning.
//!
//! Each service gets exactly one target group, named after the service. The
//! name is the idempotency key: an existing group is returned as-is, with no
//! drift correction of its health-check settings.

use tracing::{debug, info};

use crate::aws::types::{CreateTargetGroupRequest, LoadBalancerBinding};
use crate::aws::{AwsError, ElbApi};

const HEALTH_CHECK_PROTOCOL: &str = "HTTP";
const HEALTH_CHECK_PATH: &str = "/";
const HEALTH_CHECK_INTERVAL_SECONDS: u32 = 30;
const HEALTH_CHECK_TIMEOUT_SECONDS: u32 = 5;
const TARGET_TYPE: &str = "ip";

/// Ensures a service's target group exists.
pub struct TargetGroupProvisioner<'a, C: ElbApi + ?Sized> {
    elb: &'a C,
}

/// Result of [`TargetGroupProvisioner::ensure`].
#[derive(Debug, Clone)]
pub struct ProvisionedTargetGroup {
    /// Load-balancer binding for the service-creation request
    pub binding: LoadBalancerBinding,

    /// Whether this call created the group
    pub created: bool,
}

impl<'a, C: ElbApi + ?Sized> TargetGroupProvisioner<'a, C> {
    pub fn new(elb: &'a C) -> Self {
        Self { elb }
    }

    /// Find the target group named `service_name`, creating it if absent.
    ///
    /// Lookup is by exact, case-sensitive name. A freshly created group uses
    /// the fixed health-check policy (HTTP on "/", 30s interval, 5s timeout)
    /// against `health_check_port` in the given VPC.
    pub async fn ensure(
        &self,
        service_name: &str,
        vpc_id: &str,
        health_check_port: u16,
    ) -> Result<ProvisionedTargetGroup, AwsError> {
        let groups = self.elb.describe_target_groups().await?;

        if let Some(existing) = groups
            .iter()
            .find(|group| group.target_group_name == service_name)
        {
            debug!(
                service = service_name,
                arn = %existing.target_group_arn,
                "target group already exists"
            );
            return Ok(ProvisionedTargetGroup {
                binding: self.binding(service_name, &existing.target_group_arn, health_check_port),
                created: false,
            });
        }

        let request = CreateTargetGroupRequest {
            name: service_name.to_string(),
            protocol: HEALTH_CHECK_PROTOCOL.to_string(),
            port: health_check_port,
            vpc_id: vpc_id.to_string(),
            health_check_protocol: HEALTH_CHECK_PROTOCOL.to_string(),
            health_check_path: HEALTH_CHECK_PATH.to_string(),
            health_check_interval_seconds: HEALTH_CHECK_INTERVAL_SECONDS,
            health_check_timeout_seconds: HEALTH_CHECK_TIMEOUT_SECONDS,
            target_type: TARGET_TYPE.to_string(),
        };

        let group = self.elb.create_target_group(&request).await?;
        info!(
            service = service_name,
            arn = %group.target_group_arn,
            port = health_check_port,
            "created target group"
        );

        Ok(ProvisionedTargetGroup {
            binding: self.binding(service_name, &group.target_group_arn, health_check_port),
            created: true,
        })
    }

    fn binding(&self, service_name: &str, arn: &str, port: u16) -> LoadBalancerBinding {
        // Container name always matches the service name, so the binding
        // can be assembled here instead of by the caller.
        LoadBalancerBinding {
            target_group_arn: arn.to_string(),
            container_name: service_name.to_string(),
            container_port: port,
        }
    }
}

//! Serde models of the ECS and ELBv2 wire entities.
//!
//! Field names mirror what the `aws` CLI emits with `--output json`: the
//! ECS API speaks camelCase, the ELBv2 API PascalCase. Optional fields
//! skip serialization when unset so that registration payloads stay
//! minimal and structural comparison sees only what the caller asked for.

use serde::{Deserialize, Serialize};

/// A versioned, immutable description of the containers a service runs.
///
/// A desired definition carries no `revision` or ARN; ECS assigns both at
/// registration time (revisions are monotonic per family) and returns them
/// on describe. A desired definition never mutates an existing revision:
/// it either matches one (reused) or causes registration of a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub family: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_definition_arn: Option<String>,

    pub container_definitions: Vec<ContainerDefinition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires_compatibilities: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_role_arn: Option<String>,
}

impl TaskDefinition {
    /// The `family:revision` reference, available once registered.
    pub fn reference(&self) -> Option<String> {
        self.revision.map(|rev| format!("{}:{}", self.family, rev))
    }
}

/// One container within a task definition.
///
/// Identity for diffing purposes is structural equality of the whole
/// value, not the container name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDefinition {
    pub name: String,

    /// Image reference including tag, e.g. `repo/svc:v2`.
    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_mappings: Vec<PortMapping>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<KeyValuePair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub name: String,
    pub value: String,
}

/// The CreateService payload.
///
/// Assembled once by the deployer from the provisioners' return values;
/// nothing mutates it after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub service_name: String,

    pub cluster: String,

    /// `family:revision` reference of the task definition to run.
    pub task_definition: String,

    pub desired_count: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_type: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_balancers: Vec<LoadBalancerBinding>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_configuration: Option<NetworkConfiguration>,
}

/// Binds one container port of the service to a target group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerBinding {
    pub target_group_arn: String,
    pub container_name: String,
    pub container_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfiguration {
    pub awsvpc_configuration: AwsVpcConfiguration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsVpcConfiguration {
    pub subnets: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<String>,

    /// `ENABLED` or `DISABLED` on the wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assign_public_ip: Option<String>,
}

/// The ECS service as returned by CreateService.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub service_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_arn: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_definition: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_balancers: Vec<LoadBalancerBinding>,
}

/// A named set of routable backends behind the load balancer.
///
/// The target group name doubles as the service name; that equality is
/// the lookup key for idempotent provisioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TargetGroup {
    pub target_group_name: String,

    pub target_group_arn: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// CreateTargetGroup payload with the fixed health-check policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateTargetGroupRequest {
    pub name: String,
    pub protocol: String,
    pub port: u16,
    pub vpc_id: String,
    pub health_check_protocol: String,
    pub health_check_path: String,
    pub health_check_interval_seconds: u32,
    pub health_check_timeout_seconds: u32,
    pub target_type: String,
}

/// A listener routing rule, ordered by priority.
///
/// The wire value of `Priority` is a string and may be the literal
/// `default` for the listener's fallback rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Rule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_arn: Option<String>,

    pub priority: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<RuleCondition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<RuleAction>,

    #[serde(default)]
    pub is_default: bool,
}

/// One condition on a rule. Path patterns may appear in the legacy
/// `Values` list, in `PathPatternConfig.Values`, or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleCondition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_pattern_config: Option<PathPatternConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PathPatternConfig {
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleAction {
    #[serde(rename = "Type")]
    pub action_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_group_arn: Option<String>,
}

/// CreateRule payload; here `Priority` is an integer on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRuleRequest {
    pub listener_arn: String,
    pub priority: i64,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
}

/// Minimal listener shape used for endpoint resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Listener {
    pub listener_arn: String,
    pub load_balancer_arn: String,
    pub port: u16,
    pub protocol: String,
}

/// Minimal load-balancer shape used for endpoint resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancerDescription {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancer_arn: Option<String>,

    #[serde(rename = "DNSName")]
    pub dns_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

/// Identity returned by `sts get-caller-identity`, used by health checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    pub user_id: String,
}

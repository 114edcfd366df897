//! Deployment inputs: what to deploy and where to put it.

use serde::{Deserialize, Serialize};

use crate::aws::types::TaskDefinition;

/// What to deploy: one service, one image, one container port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSpec {
    /// Service name; also the routing path segment on the load balancer
    pub service_name: String,

    /// Fully qualified image reference (registry/repo:tag)
    pub image: String,

    /// Port the container listens on
    pub container_port: u16,

    /// Commit the image was built from
    pub sha: Option<String>,

    /// Branch the image was built from
    pub branch: Option<String>,

    /// Pre-built task definition to register instead of generating one
    /// from the image and port
    pub task_definition: Option<TaskDefinition>,
}

impl DeploymentSpec {
    pub fn new(service_name: impl Into<String>, image: impl Into<String>, container_port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            image: image.into(),
            container_port,
            sha: None,
            branch: None,
            task_definition: None,
        }
    }

    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_task_definition(mut self, definition: TaskDefinition) -> Self {
        self.task_definition = Some(definition);
        self
    }
}

/// Where to deploy: the cluster, load balancer listener, and network a
/// service lands in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployTarget {
    /// ECS cluster name or ARN
    pub cluster: String,

    /// Listener whose rules route traffic to services
    pub listener_arn: String,

    /// VPC target groups are created in
    pub vpc_id: String,

    /// Environment label attached to deployment events
    #[serde(default)]
    pub environment: Option<String>,

    /// Number of tasks to run
    #[serde(default = "default_desired_count")]
    pub desired_count: i64,

    /// ECS launch type (e.g. FARGATE)
    #[serde(default)]
    pub launch_type: Option<String>,

    /// Subnets for awsvpc networking
    #[serde(default)]
    pub subnets: Vec<String>,

    /// Security groups for awsvpc networking
    #[serde(default)]
    pub security_groups: Vec<String>,

    /// Whether tasks get public IPs
    #[serde(default)]
    pub assign_public_ip: Option<bool>,

    /// Task-level CPU units (e.g. "256")
    #[serde(default)]
    pub cpu: Option<String>,

    /// Task-level memory in MiB (e.g. "512")
    #[serde(default)]
    pub memory: Option<String>,

    /// Task networking mode (e.g. "awsvpc")
    #[serde(default)]
    pub network_mode: Option<String>,

    /// Role the agent assumes to pull images and ship logs
    #[serde(default)]
    pub execution_role_arn: Option<String>,

    /// Launch compatibilities stamped on registered task definitions
    #[serde(default)]
    pub requires_compatibilities: Vec<String>,
}

fn default_desired_count() -> i64 {
    1
}

impl DeployTarget {
    pub fn new(
        cluster: impl Into<String>,
        listener_arn: impl Into<String>,
        vpc_id: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            listener_arn: listener_arn.into(),
            vpc_id: vpc_id.into(),
            environment: None,
            desired_count: default_desired_count(),
            launch_type: None,
            subnets: Vec::new(),
            security_groups: Vec::new(),
            assign_public_ip: None,
            cpu: None,
            memory: None,
            network_mode: None,
            execution_role_arn: None,
            requires_compatibilities: Vec::new(),
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_launch_type(mut self, launch_type: impl Into<String>) -> Self {
        self.launch_type = Some(launch_type.into());
        self
    }

    pub fn with_network(mut self, subnets: Vec<String>, security_groups: Vec<String>) -> Self {
        self.subnets = subnets;
        self.security_groups = security_groups;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builders() {
        let spec = DeploymentSpec::new("api", "registry.example.com/api:abc123", 8080)
            .with_sha("abc123")
            .with_branch("main");

        assert_eq!(spec.service_name, "api");
        assert_eq!(spec.container_port, 8080);
        assert_eq!(spec.sha.as_deref(), Some("abc123"));
        assert!(spec.task_definition.is_none());
    }

    #[test]
    fn test_target_defaults_from_yaml() {
        let yaml = r#"
cluster: prod
listener_arn: "arn:aws:elasticloadbalancing:us-east-1:123:listener/app/lb/abc/def"
vpc_id: vpc-123
"#;
        let target: DeployTarget = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(target.cluster, "prod");
        assert_eq!(target.desired_count, 1);
        assert!(target.subnets.is_empty());
        assert!(target.launch_type.is_none());
    }
}

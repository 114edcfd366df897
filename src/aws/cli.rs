//! Production AWS client wrapping the `aws` CLI as a subprocess.
//!
//! Every call shells out to `aws <service> <operation> ... --output json`
//! and parses stdout with serde. One `AwsCli` value is the single session
//! handle injected into every component; the region travels with it so it
//! is present on every call.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::api::{AwsError, EcsApi, ElbApi};
use super::types::{
    CallerIdentity, CreateRuleRequest, CreateTargetGroupRequest, Listener,
    LoadBalancerDescription, Rule, Service, ServiceRequest, TargetGroup, TaskDefinition,
};

const DEFAULT_BINARY: &str = "aws";
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(300);

/// AWS CLI session: binary, region, optional profile, per-call timeout.
pub struct AwsCli {
    binary: String,
    region: String,
    profile: Option<String>,
    call_timeout: Duration,
}

impl AwsCli {
    /// Create a client for a region with the default binary and timeout.
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            region: region.into(),
            profile: None,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Use a named credentials profile.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Use a custom `aws` binary path.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Override the per-call timeout.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Verify the CLI is runnable and credentials resolve.
    pub async fn verify_identity(&self) -> Result<CallerIdentity, AwsError> {
        let stdout = self.invoke("sts", "get-caller-identity", &[]).await?;
        parse("sts get-caller-identity", &stdout)
    }

    /// Argument vector for one call; the region rides on every invocation.
    fn base_args(&self, service: &str, operation: &str, extra: &[&str]) -> Vec<String> {
        let mut args = vec![service.to_string(), operation.to_string()];
        args.extend(extra.iter().map(|arg| arg.to_string()));
        args.push("--region".to_string());
        args.push(self.region.clone());
        if let Some(ref profile) = self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args.push("--output".to_string());
        args.push("json".to_string());
        args
    }

    /// Run one CLI call to completion, enforcing the call timeout.
    async fn invoke(
        &self,
        service: &str,
        operation: &str,
        extra: &[&str],
    ) -> Result<Vec<u8>, AwsError> {
        let label = format!("{} {}", service, operation);
        let args = self.base_args(service, operation, extra);

        debug!(operation = %label, "aws call");

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AwsError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let output = timeout(self.call_timeout, child.wait_with_output())
            .await
            .map_err(|_| AwsError::Timeout {
                operation: label.clone(),
                timeout: self.call_timeout,
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AwsError::CommandFailed {
                operation: label,
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    /// Run a call whose request body is passed via `--cli-input-json`.
    async fn invoke_with_input<R: Serialize>(
        &self,
        service: &str,
        operation: &str,
        request: &R,
    ) -> Result<Vec<u8>, AwsError> {
        let body = serde_json::to_string(request).map_err(|source| AwsError::InvalidResponse {
            operation: format!("{} {}", service, operation),
            source,
        })?;
        self.invoke(service, operation, &["--cli-input-json", &body])
            .await
    }
}

/// Parse a JSON response body, attributing failures to the operation.
fn parse<T: DeserializeOwned>(operation: &str, stdout: &[u8]) -> Result<T, AwsError> {
    serde_json::from_slice(stdout).map_err(|source| AwsError::InvalidResponse {
        operation: operation.to_string(),
        source,
    })
}

// Response envelopes: the CLI nests each payload under an operation-
// specific key.

#[derive(Debug, Deserialize)]
struct FamiliesResponse {
    #[serde(default)]
    families: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskDefinitionArnsResponse {
    #[serde(default)]
    task_definition_arns: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskDefinitionResponse {
    task_definition: TaskDefinition,
}

#[derive(Debug, Deserialize)]
struct ServiceResponse {
    service: Service,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TargetGroupsResponse {
    #[serde(default)]
    target_groups: Vec<TargetGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RulesResponse {
    #[serde(default)]
    rules: Vec<Rule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListenersResponse {
    #[serde(default)]
    listeners: Vec<Listener>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LoadBalancersResponse {
    #[serde(default)]
    load_balancers: Vec<LoadBalancerDescription>,
}

#[async_trait]
impl EcsApi for AwsCli {
    async fn list_task_definition_families(&self) -> Result<Vec<String>, AwsError> {
        let stdout = self
            .invoke("ecs", "list-task-definition-families", &["--status", "ACTIVE"])
            .await?;
        let response: FamiliesResponse = parse("ecs list-task-definition-families", &stdout)?;
        Ok(response.families)
    }

    async fn list_task_definitions(&self, family: &str) -> Result<Vec<String>, AwsError> {
        let stdout = self
            .invoke(
                "ecs",
                "list-task-definitions",
                &["--family-prefix", family, "--sort", "ASC"],
            )
            .await?;
        let response: TaskDefinitionArnsResponse = parse("ecs list-task-definitions", &stdout)?;
        Ok(response.task_definition_arns)
    }

    async fn describe_task_definition(
        &self,
        reference: &str,
    ) -> Result<TaskDefinition, AwsError> {
        let stdout = self
            .invoke(
                "ecs",
                "describe-task-definition",
                &["--task-definition", reference],
            )
            .await?;
        let response: TaskDefinitionResponse = parse("ecs describe-task-definition", &stdout)?;
        Ok(response.task_definition)
    }

    async fn register_task_definition(
        &self,
        definition: &TaskDefinition,
    ) -> Result<TaskDefinition, AwsError> {
        let stdout = self
            .invoke_with_input("ecs", "register-task-definition", definition)
            .await?;
        let response: TaskDefinitionResponse = parse("ecs register-task-definition", &stdout)?;
        Ok(response.task_definition)
    }

    async fn create_service(&self, request: &ServiceRequest) -> Result<Service, AwsError> {
        let stdout = self
            .invoke_with_input("ecs", "create-service", request)
            .await?;
        let response: ServiceResponse = parse("ecs create-service", &stdout)?;
        Ok(response.service)
    }
}

#[async_trait]
impl ElbApi for AwsCli {
    async fn describe_target_groups(&self) -> Result<Vec<TargetGroup>, AwsError> {
        let stdout = self.invoke("elbv2", "describe-target-groups", &[]).await?;
        let response: TargetGroupsResponse = parse("elbv2 describe-target-groups", &stdout)?;
        Ok(response.target_groups)
    }

    async fn create_target_group(
        &self,
        request: &CreateTargetGroupRequest,
    ) -> Result<TargetGroup, AwsError> {
        let stdout = self
            .invoke_with_input("elbv2", "create-target-group", request)
            .await?;
        let response: TargetGroupsResponse = parse("elbv2 create-target-group", &stdout)?;
        response
            .target_groups
            .into_iter()
            .next()
            .ok_or_else(|| AwsError::NotFound(format!("created target group '{}'", request.name)))
    }

    async fn describe_rules(&self, listener_arn: &str) -> Result<Vec<Rule>, AwsError> {
        let stdout = self
            .invoke("elbv2", "describe-rules", &["--listener-arn", listener_arn])
            .await?;
        let response: RulesResponse = parse("elbv2 describe-rules", &stdout)?;
        Ok(response.rules)
    }

    async fn create_rule(&self, request: &CreateRuleRequest) -> Result<Rule, AwsError> {
        let stdout = self
            .invoke_with_input("elbv2", "create-rule", request)
            .await?;
        let response: RulesResponse = parse("elbv2 create-rule", &stdout)?;
        response
            .rules
            .into_iter()
            .next()
            .ok_or_else(|| AwsError::NotFound("created listener rule".to_string()))
    }

    async fn describe_listener(&self, listener_arn: &str) -> Result<Listener, AwsError> {
        let stdout = self
            .invoke(
                "elbv2",
                "describe-listeners",
                &["--listener-arns", listener_arn],
            )
            .await?;
        let response: ListenersResponse = parse("elbv2 describe-listeners", &stdout)?;
        response
            .listeners
            .into_iter()
            .next()
            .ok_or_else(|| AwsError::NotFound(format!("listener {}", listener_arn)))
    }

    async fn describe_load_balancer(
        &self,
        load_balancer_arn: &str,
    ) -> Result<LoadBalancerDescription, AwsError> {
        let stdout = self
            .invoke(
                "elbv2",
                "describe-load-balancers",
                &["--load-balancer-arns", load_balancer_arn],
            )
            .await?;
        let response: LoadBalancersResponse = parse("elbv2 describe-load-balancers", &stdout)?;
        response
            .load_balancers
            .into_iter()
            .next()
            .ok_or_else(|| AwsError::NotFound(format!("load balancer {}", load_balancer_arn)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_args_carry_region_and_output() {
        let client = AwsCli::new("us-east-1");
        let args = client.base_args("ecs", "list-task-definitions", &["--family-prefix", "svc"]);

        assert_eq!(
            args,
            vec![
                "ecs",
                "list-task-definitions",
                "--family-prefix",
                "svc",
                "--region",
                "us-east-1",
                "--output",
                "json",
            ]
        );
    }

    #[test]
    fn test_base_args_include_profile_when_set() {
        let client = AwsCli::new("eu-west-1").with_profile("deploys");
        let args = client.base_args("sts", "get-caller-identity", &[]);

        let profile_at = args.iter().position(|a| a == "--profile").unwrap();
        assert_eq!(args[profile_at + 1], "deploys");
    }

    #[test]
    fn test_parse_target_groups_envelope() {
        let body = br#"{
            "TargetGroups": [
                {
                    "TargetGroupName": "my-svc",
                    "TargetGroupArn": "arn:aws:elasticloadbalancing:us-east-1:1:targetgroup/my-svc/abc",
                    "VpcId": "vpc-0abc",
                    "Port": 8080,
                    "Protocol": "HTTP"
                }
            ]
        }"#;

        let response: TargetGroupsResponse = parse("elbv2 describe-target-groups", body).unwrap();
        assert_eq!(response.target_groups.len(), 1);
        assert_eq!(response.target_groups[0].target_group_name, "my-svc");
    }

    #[test]
    fn test_parse_error_names_operation() {
        let err = parse::<FamiliesResponse>("ecs list-task-definition-families", b"not json")
            .unwrap_err();
        assert!(matches!(err, AwsError::InvalidResponse { .. }));
        assert!(err
            .to_string()
            .contains("ecs list-task-definition-families"));
    }
}

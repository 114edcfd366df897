//! In-memory AWS doubles shared by the integration tests.
//!
//! `FakeAws` implements the same traits as the real CLI-backed client but
//! keeps everything in a mutex-guarded state bag, counts calls per
//! operation, and mimics AWS-side behavior the code under test depends on
//! (assigned revision numbers, prefix matching on family listings).

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gantry::aws::types::{
    CreateRuleRequest, CreateTargetGroupRequest, Listener, LoadBalancerDescription, Rule, Service,
    ServiceRequest, TargetGroup, TaskDefinition,
};
use gantry::aws::{AwsError, EcsApi, ElbApi};

pub const LISTENER_ARN: &str =
    "arn:aws:elasticloadbalancing:us-east-1:123456789012:listener/app/main/50dc6c495c0c9188/f2f7dc8efc522ab2";
pub const LB_DNS: &str = "main-1234567890.us-east-1.elb.amazonaws.com";

#[derive(Default)]
struct State {
    families: Vec<String>,
    revisions: HashMap<String, Vec<TaskDefinition>>,
    target_groups: Vec<TargetGroup>,
    rules: HashMap<String, Vec<Rule>>,
    service_requests: Vec<ServiceRequest>,
    listener: Option<Listener>,
    load_balancer: Option<LoadBalancerDescription>,
    calls: HashMap<&'static str, usize>,
    fail_create_service: bool,
}

/// Shared-state fake; clones see the same state and counters.
#[derive(Clone, Default)]
pub struct FakeAws {
    state: Arc<Mutex<State>>,
}

impl FakeAws {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a listener on port 80 plus its load balancer, enough for
    /// endpoint resolution to succeed.
    pub fn with_standard_listener(self) -> Self {
        self.seed_listener(80, "HTTP");
        self
    }

    pub fn seed_listener(&self, port: u16, protocol: &str) {
        let mut state = self.state.lock().unwrap();
        state.listener = Some(Listener {
            listener_arn: LISTENER_ARN.to_string(),
            load_balancer_arn: "arn:aws:elasticloadbalancing:us-east-1:123456789012:loadbalancer/app/main/50dc6c495c0c9188".to_string(),
            port,
            protocol: protocol.to_string(),
        });
        state.load_balancer = Some(LoadBalancerDescription {
            load_balancer_arn: state.listener.as_ref().map(|l| l.load_balancer_arn.clone()),
            dns_name: LB_DNS.to_string(),
            scheme: Some("internet-facing".to_string()),
        });
    }

    pub fn seed_target_group(&self, name: &str) -> String {
        let arn = target_group_arn(name);
        let mut state = self.state.lock().unwrap();
        state.target_groups.push(TargetGroup {
            target_group_name: name.to_string(),
            target_group_arn: arn.clone(),
            vpc_id: Some("vpc-0abc".to_string()),
            port: Some(8080),
            protocol: Some("HTTP".to_string()),
        });
        arn
    }

    pub fn seed_rule(&self, listener_arn: &str, priority: &str, paths: &[&str]) {
        use gantry::aws::types::RuleCondition;

        let mut state = self.state.lock().unwrap();
        state.rules.entry(listener_arn.to_string()).or_default().push(Rule {
            rule_arn: Some(format!("arn:rule/{}", priority)),
            priority: priority.to_string(),
            conditions: vec![RuleCondition {
                field: Some("path-pattern".to_string()),
                values: paths.iter().map(|p| p.to_string()).collect(),
                path_pattern_config: None,
            }],
            actions: Vec::new(),
            is_default: priority == "default",
        });
    }

    /// Seed a registered task definition revision. The family is marked
    /// ACTIVE and the revision number must already be set.
    pub fn seed_task_definition(&self, definition: TaskDefinition) {
        let mut state = self.state.lock().unwrap();
        if !state.families.contains(&definition.family) {
            state.families.push(definition.family.clone());
        }
        state
            .revisions
            .entry(definition.family.clone())
            .or_default()
            .push(definition);
    }

    pub fn fail_create_service(&self) {
        self.state.lock().unwrap().fail_create_service = true;
    }

    pub fn calls(&self, operation: &str) -> usize {
        *self
            .state
            .lock()
            .unwrap()
            .calls
            .get(operation)
            .unwrap_or(&0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }

    pub fn service_requests(&self) -> Vec<ServiceRequest> {
        self.state.lock().unwrap().service_requests.clone()
    }

    pub fn rules_for(&self, listener_arn: &str) -> Vec<Rule> {
        self.state
            .lock()
            .unwrap()
            .rules
            .get(listener_arn)
            .cloned()
            .unwrap_or_default()
    }

    fn count(&self, operation: &'static str) {
        *self
            .state
            .lock()
            .unwrap()
            .calls
            .entry(operation)
            .or_insert(0) += 1;
    }
}

fn target_group_arn(name: &str) -> String {
    format!(
        "arn:aws:elasticloadbalancing:us-east-1:123456789012:targetgroup/{}/73e2d6bc24d8a067",
        name
    )
}

fn revision_arn(family: &str, revision: i64) -> String {
    format!(
        "arn:aws:ecs:us-east-1:123456789012:task-definition/{}:{}",
        family, revision
    )
}

#[async_trait]
impl EcsApi for FakeAws {
    async fn list_task_definition_families(&self) -> Result<Vec<String>, AwsError> {
        self.count("list-task-definition-families");
        Ok(self.state.lock().unwrap().families.clone())
    }

    async fn list_task_definitions(&self, family: &str) -> Result<Vec<String>, AwsError> {
        self.count("list-task-definitions");
        let state = self.state.lock().unwrap();

        // The real API matches by family prefix, not equality.
        let mut arns: Vec<(i64, String)> = state
            .revisions
            .iter()
            .filter(|(known, _)| known.starts_with(family))
            .flat_map(|(known, revisions)| {
                revisions.iter().map(move |definition| {
                    let revision = definition.revision.unwrap_or(0);
                    (revision, revision_arn(known, revision))
                })
            })
            .collect();
        arns.sort();

        Ok(arns.into_iter().map(|(_, arn)| arn).collect())
    }

    async fn describe_task_definition(&self, reference: &str) -> Result<TaskDefinition, AwsError> {
        self.count("describe-task-definition");
        let state = self.state.lock().unwrap();

        let (family, revision) = reference
            .rsplit_once(':')
            .ok_or_else(|| AwsError::NotFound(format!("task definition '{reference}'")))?;
        let revision: i64 = revision
            .parse()
            .map_err(|_| AwsError::NotFound(format!("task definition '{reference}'")))?;

        state
            .revisions
            .get(family)
            .and_then(|revisions| {
                revisions
                    .iter()
                    .find(|definition| definition.revision == Some(revision))
            })
            .cloned()
            .ok_or_else(|| AwsError::NotFound(format!("task definition '{reference}'")))
    }

    async fn register_task_definition(
        &self,
        definition: &TaskDefinition,
    ) -> Result<TaskDefinition, AwsError> {
        self.count("register-task-definition");
        let mut state = self.state.lock().unwrap();

        let next = state
            .revisions
            .get(&definition.family)
            .and_then(|revisions| {
                revisions
                    .iter()
                    .filter_map(|d| d.revision)
                    .max()
            })
            .unwrap_or(0)
            + 1;

        let mut registered = definition.clone();
        registered.revision = Some(next);
        registered.task_definition_arn = Some(revision_arn(&definition.family, next));

        if !state.families.contains(&definition.family) {
            state.families.push(definition.family.clone());
        }
        state
            .revisions
            .entry(definition.family.clone())
            .or_default()
            .push(registered.clone());

        Ok(registered)
    }

    async fn create_service(&self, request: &ServiceRequest) -> Result<Service, AwsError> {
        self.count("create-service");
        let mut state = self.state.lock().unwrap();

        if state.fail_create_service {
            return Err(AwsError::CommandFailed {
                operation: "ecs create-service".to_string(),
                code: 254,
                stderr: "An error occurred (InvalidParameterException): Creation of service was not idempotent".to_string(),
            });
        }

        state.service_requests.push(request.clone());

        Ok(Service {
            service_name: request.service_name.clone(),
            service_arn: Some(format!(
                "arn:aws:ecs:us-east-1:123456789012:service/{}/{}",
                request.cluster, request.service_name
            )),
            status: Some("ACTIVE".to_string()),
            task_definition: Some(request.task_definition.clone()),
            load_balancers: request.load_balancers.clone(),
        })
    }
}

#[async_trait]
impl ElbApi for FakeAws {
    async fn describe_target_groups(&self) -> Result<Vec<TargetGroup>, AwsError> {
        self.count("describe-target-groups");
        Ok(self.state.lock().unwrap().target_groups.clone())
    }

    async fn create_target_group(
        &self,
        request: &CreateTargetGroupRequest,
    ) -> Result<TargetGroup, AwsError> {
        self.count("create-target-group");
        let group = TargetGroup {
            target_group_name: request.name.clone(),
            target_group_arn: target_group_arn(&request.name),
            vpc_id: Some(request.vpc_id.clone()),
            port: Some(request.port),
            protocol: Some(request.protocol.clone()),
        };
        self.state
            .lock()
            .unwrap()
            .target_groups
            .push(group.clone());
        Ok(group)
    }

    async fn describe_rules(&self, listener_arn: &str) -> Result<Vec<Rule>, AwsError> {
        self.count("describe-rules");
        Ok(self
            .state
            .lock()
            .unwrap()
            .rules
            .get(listener_arn)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_rule(&self, request: &CreateRuleRequest) -> Result<Rule, AwsError> {
        self.count("create-rule");
        let rule = Rule {
            rule_arn: Some(format!("arn:rule/{}", request.priority)),
            priority: request.priority.to_string(),
            conditions: request.conditions.clone(),
            actions: request.actions.clone(),
            is_default: false,
        };
        self.state
            .lock()
            .unwrap()
            .rules
            .entry(request.listener_arn.clone())
            .or_default()
            .push(rule.clone());
        Ok(rule)
    }

    async fn describe_listener(&self, listener_arn: &str) -> Result<Listener, AwsError> {
        self.count("describe-listeners");
        self.state
            .lock()
            .unwrap()
            .listener
            .clone()
            .ok_or_else(|| AwsError::NotFound(format!("listener '{listener_arn}'")))
    }

    async fn describe_load_balancer(
        &self,
        load_balancer_arn: &str,
    ) -> Result<LoadBalancerDescription, AwsError> {
        self.count("describe-load-balancers");
        self.state
            .lock()
            .unwrap()
            .load_balancer
            .clone()
            .ok_or_else(|| AwsError::NotFound(format!("load balancer '{load_balancer_arn}'")))
    }
}

//! Listener rule provisioning.
//!
//! Routes `/{service}` on the shared listener to the service's target group.
//! Priorities are assigned max+1 and never reused; freed priorities stay
//! free. Two deploys computing max+1 from the same stale read would collide
//! on the AWS side, which is why the deployer serializes deploys per
//! listener (see the deploy lock).

use tracing::{debug, info};

use crate::aws::types::{CreateRuleRequest, Rule, RuleAction, RuleCondition};
use crate::aws::{AwsError, ElbApi};

/// Ensures a path-based routing rule exists for a service.
pub struct ListenerRuleProvisioner<'a, C: ElbApi + ?Sized> {
    elb: &'a C,
}

/// Result of [`ListenerRuleProvisioner::ensure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// A rule already routes the service's path
    Exists,

    /// A new rule was created at this priority
    Created { priority: i64 },
}

impl<'a, C: ElbApi + ?Sized> ListenerRuleProvisioner<'a, C> {
    pub fn new(elb: &'a C) -> Self {
        Self { elb }
    }

    /// Create a rule forwarding `/{service_name}` to `target_group_arn`,
    /// unless some rule on the listener already matches that path.
    pub async fn ensure(
        &self,
        listener_arn: &str,
        service_name: &str,
        target_group_arn: &str,
    ) -> Result<RuleOutcome, AwsError> {
        let rules = self.elb.describe_rules(listener_arn).await?;
        let path = format!("/{service_name}");

        let routed = rules
            .iter()
            .flat_map(rule_path_values)
            .any(|value| value == path);
        if routed {
            debug!(service = service_name, %path, "listener already routes path");
            return Ok(RuleOutcome::Exists);
        }

        let priority = next_priority(&rules);
        let request = CreateRuleRequest {
            listener_arn: listener_arn.to_string(),
            priority,
            conditions: vec![RuleCondition {
                field: Some("path-pattern".to_string()),
                values: vec![path.clone()],
                path_pattern_config: None,
            }],
            actions: vec![RuleAction {
                action_type: "forward".to_string(),
                target_group_arn: Some(target_group_arn.to_string()),
            }],
        };

        self.elb.create_rule(&request).await?;
        info!(service = service_name, priority, %path, "created listener rule");

        Ok(RuleOutcome::Created { priority })
    }
}

/// All path values a rule matches, across every condition, whichever of the
/// flat `Values` list or the nested `PathPatternConfig` carries them.
fn rule_path_values(rule: &Rule) -> impl Iterator<Item = &str> {
    rule.conditions.iter().flat_map(|condition| {
        condition
            .values
            .iter()
            .chain(
                condition
                    .path_pattern_config
                    .iter()
                    .flat_map(|config| config.values.iter()),
            )
            .map(String::as_str)
    })
}

/// One above the highest numeric priority on the listener. The default
/// rule's priority is the literal string `default` and is skipped, as is
/// anything else non-numeric. An empty listener starts at 1.
fn next_priority(rules: &[Rule]) -> i64 {
    rules
        .iter()
        .filter_map(|rule| rule.priority.parse::<i64>().ok())
        .max()
        .map(|highest| highest + 1)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use crate::aws::types::PathPatternConfig;

    use super::*;

    fn rule(priority: &str, paths: &[&str]) -> Rule {
        Rule {
            rule_arn: None,
            priority: priority.to_string(),
            conditions: vec![RuleCondition {
                field: Some("path-pattern".to_string()),
                values: paths.iter().map(|p| p.to_string()).collect(),
                path_pattern_config: None,
            }],
            actions: Vec::new(),
            is_default: priority == "default",
        }
    }

    #[test]
    fn test_next_priority_is_max_plus_one() {
        let rules = vec![
            rule("10", &["/a"]),
            rule("45", &["/b"]),
            rule("20", &["/c"]),
        ];
        assert_eq!(next_priority(&rules), 46);
    }

    #[test]
    fn test_next_priority_skips_default_rule() {
        let rules = vec![rule("default", &[])];
        assert_eq!(next_priority(&rules), 1);
    }

    #[test]
    fn test_next_priority_on_empty_listener() {
        assert_eq!(next_priority(&[]), 1);
    }

    #[test]
    fn test_path_values_include_nested_config() {
        let mut nested = rule("5", &[]);
        nested.conditions[0].path_pattern_config = Some(PathPatternConfig {
            values: vec!["/hidden".to_string()],
        });

        let values: Vec<&str> = rule_path_values(&nested).collect();
        assert_eq!(values, vec!["/hidden"]);
    }
}

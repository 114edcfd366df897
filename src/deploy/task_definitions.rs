//! Task definition listing, fetching, and diff-aware registration.
//!
//! Registering on every deploy would grow a new revision per push even when
//! nothing changed. The store compares the desired definition against the
//! latest registered revision and only registers when they differ.

use serde_json::Value;
use tracing::{debug, info};

use crate::aws::types::TaskDefinition;
use crate::aws::{AwsError, EcsApi};

/// Lists, fetches, and registers ECS task definitions for one account.
pub struct TaskDefinitionStore<'a, C: EcsApi + ?Sized> {
    ecs: &'a C,
}

/// Result of [`TaskDefinitionStore::register_if_different`].
#[derive(Debug, Clone)]
pub enum RegisterOutcome {
    /// The latest registered revision already matches; nothing was registered
    Unchanged(TaskDefinition),

    /// A new revision was registered
    Registered(TaskDefinition),
}

impl RegisterOutcome {
    /// The definition to deploy, whichever way it was obtained.
    pub fn definition(&self) -> &TaskDefinition {
        match self {
            Self::Unchanged(definition) | Self::Registered(definition) => definition,
        }
    }

    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered(_))
    }
}

impl<'a, C: EcsApi + ?Sized> TaskDefinitionStore<'a, C> {
    pub fn new(ecs: &'a C) -> Self {
        Self { ecs }
    }

    /// List the ACTIVE revision ARNs for `family`.
    ///
    /// A family that is not registered at all yields an empty list, not an
    /// error. The underlying list call matches by family *prefix*, so the
    /// results are filtered back down to exact family matches ("api" must
    /// not pick up "api-worker" revisions).
    pub async fn list_active_revisions(&self, family: &str) -> Result<Vec<String>, AwsError> {
        let families = self.ecs.list_task_definition_families().await?;
        if !families.iter().any(|f| f == family) {
            debug!(family, "family has no active task definitions");
            return Ok(Vec::new());
        }

        let arns = self.ecs.list_task_definitions(family).await?;
        Ok(arns
            .into_iter()
            .filter(|arn| {
                parse_task_definition_arn(arn)
                    .map(|(arn_family, _)| arn_family == family)
                    .unwrap_or(false)
            })
            .collect())
    }

    /// Fetch the full definition behind a revision ARN.
    pub async fn fetch(&self, arn: &str) -> Result<TaskDefinition, AwsError> {
        let (family, revision) = parse_task_definition_arn(arn)?;
        self.ecs
            .describe_task_definition(&format!("{family}:{revision}"))
            .await
    }

    /// Fetch the highest-numbered ACTIVE revision for `family`, if any.
    pub async fn latest_revision(&self, family: &str) -> Result<Option<TaskDefinition>, AwsError> {
        let arns = self.list_active_revisions(family).await?;
        let latest = arns
            .iter()
            .filter_map(|arn| {
                parse_task_definition_arn(arn)
                    .ok()
                    .map(|(_, revision)| (revision, arn))
            })
            .max_by_key(|(revision, _)| *revision);

        match latest {
            Some((_, arn)) => Ok(Some(self.fetch(arn).await?)),
            None => Ok(None),
        }
    }

    /// Register `desired` unless the latest revision already matches it.
    ///
    /// Matching is a one-directional structural subset check: every field
    /// present in the desired definition must be deep-equal in the stored
    /// revision, while extra stored fields (revision numbers, AWS-side
    /// defaults) are ignored. A field *removed* from the desired definition
    /// therefore does not trigger a new revision.
    pub async fn register_if_different(
        &self,
        desired: &TaskDefinition,
    ) -> Result<RegisterOutcome, AwsError> {
        let mut payload = desired.clone();
        payload.revision = None;
        payload.task_definition_arn = None;

        if let Some(current) = self.latest_revision(&payload.family).await? {
            let desired_value = to_wire_value(&payload)?;
            let current_value = to_wire_value(&current)?;
            if is_structural_subset(&desired_value, &current_value) {
                debug!(
                    family = %payload.family,
                    revision = ?current.revision,
                    "task definition unchanged, reusing latest revision"
                );
                return Ok(RegisterOutcome::Unchanged(current));
            }
        }

        let registered = self.ecs.register_task_definition(&payload).await?;
        info!(
            family = %payload.family,
            revision = ?registered.revision,
            "registered new task definition revision"
        );
        Ok(RegisterOutcome::Registered(registered))
    }
}

fn to_wire_value(definition: &TaskDefinition) -> Result<Value, AwsError> {
    serde_json::to_value(definition).map_err(|source| AwsError::InvalidResponse {
        operation: "ecs register-task-definition".to_string(),
        source,
    })
}

/// Split `family` and `revision` out of a task definition ARN.
///
/// Accepts both full ARNs (`...:task-definition/api:7`) and bare
/// `family:revision` references.
fn parse_task_definition_arn(arn: &str) -> Result<(String, i64), AwsError> {
    let suffix = arn.rsplit('/').next().unwrap_or("");
    let parsed = suffix.rsplit_once(':').and_then(|(family, revision)| {
        let revision: i64 = revision.parse().ok()?;
        if family.is_empty() {
            return None;
        }
        Some((family.to_string(), revision))
    });

    parsed.ok_or_else(|| AwsError::NotFound(format!("task definition for '{arn}'")))
}

/// Every key in `desired` must exist and match in `candidate`; extra
/// candidate keys are ignored. Arrays must match element-wise.
fn is_structural_subset(desired: &Value, candidate: &Value) -> bool {
    match (desired, candidate) {
        (Value::Object(d), Value::Object(c)) => d.iter().all(|(key, desired_value)| {
            c.get(key)
                .map(|candidate_value| is_structural_subset(desired_value, candidate_value))
                .unwrap_or(false)
        }),
        (Value::Array(d), Value::Array(c)) => {
            d.len() == c.len()
                && d.iter()
                    .zip(c.iter())
                    .all(|(desired_value, candidate_value)| {
                        is_structural_subset(desired_value, candidate_value)
                    })
        }
        _ => desired == candidate,
    }
}

//! Ordered step plans with scoped acquisitions.

use std::collections::HashSet;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::core::types::Step;
use crate::retry::RetryPolicy;

/// A main-sequence step, optionally retryable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub step: Step,
    /// `Some` marks the step safe to repeat under this policy.
    #[serde(
        rename = "max_attempts",
        serialize_with = "serialize_max_attempts",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry: Option<RetryPolicy>,
}

fn serialize_max_attempts<S: Serializer>(
    retry: &Option<RetryPolicy>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    retry.map(|policy| policy.max_attempts()).serialize(serializer)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanEntry {
    Run(PlannedStep),
    /// `release` is owed once `acquire` has been launched and runs on every
    /// exit path of the sequence.
    Scoped { acquire: Step, release: Step },
}

impl PlanEntry {
    fn steps(&self) -> Vec<&Step> {
        match self {
            PlanEntry::Run(planned) => vec![&planned.step],
            PlanEntry::Scoped { acquire, release } => vec![acquire, release],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("duplicate step name '{0}'")]
    DuplicateStep(String),
    #[error("step '{0}' has an empty command")]
    EmptyCommand(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Step) -> &mut Self {
        self.entries.push(PlanEntry::Run(PlannedStep {
            step,
            retry: None,
        }));
        self
    }

    pub fn push_retryable(&mut self, step: Step, retry: RetryPolicy) -> &mut Self {
        self.entries.push(PlanEntry::Run(PlannedStep {
            step,
            retry: Some(retry),
        }));
        self
    }

    pub fn push_scoped(&mut self, acquire: Step, release: Step) -> &mut Self {
        self.entries.push(PlanEntry::Scoped { acquire, release });
        self
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every step name in declaration order, release steps included.
    pub fn step_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .flat_map(PlanEntry::steps)
            .map(|step| step.name.as_str())
            .collect()
    }

    /// Names of release steps, in the order they were declared.
    pub fn release_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                PlanEntry::Scoped { release, .. } => Some(release.name.as_str()),
                PlanEntry::Run(_) => None,
            })
            .collect()
    }

    /// Check that names are unique and commands non-empty.
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            for step in entry.steps() {
                if !seen.insert(step.name.as_str()) {
                    return Err(PlanError::DuplicateStep(step.name.clone()));
                }
                if step.command.is_empty() || step.command[0].trim().is_empty() {
                    return Err(PlanError::EmptyCommand(step.name.clone()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Environment;

    fn step(name: &str) -> Step {
        Step::new(name, ["true"], "/tmp", &Environment::new())
    }

    #[test]
    fn step_names_follow_declaration_order() {
        let mut plan = Plan::new();
        plan.push(step("a"))
            .push_scoped(step("start"), step("stop"))
            .push_retryable(step("fetch"), RetryPolicy::new(3).expect("policy"));
        assert_eq!(plan.step_names(), vec!["a", "start", "stop", "fetch"]);
        assert_eq!(plan.release_names(), vec!["stop"]);
        assert_eq!(plan.len(), 3);
        plan.validate().expect("valid plan");
    }

    #[test]
    fn rejects_duplicate_names_across_scopes() {
        let mut plan = Plan::new();
        plan.push(step("stop")).push_scoped(step("start"), step("stop"));
        assert_eq!(
            plan.validate(),
            Err(PlanError::DuplicateStep("stop".to_string()))
        );
    }

    #[test]
    fn rejects_empty_command() {
        let mut plan = Plan::new();
        plan.push(Step::new("empty", Vec::<String>::new(), "/tmp", &Environment::new()));
        assert_eq!(
            plan.validate(),
            Err(PlanError::EmptyCommand("empty".to_string()))
        );
    }

    #[test]
    fn retryable_steps_serialize_their_attempt_bound() {
        let mut plan = Plan::new();
        plan.push(step("a"))
            .push_retryable(step("fetch"), RetryPolicy::new(3).expect("policy"));
        let json = serde_json::to_value(&plan).expect("serialize");
        assert!(json["entries"][0].get("max_attempts").is_none());
        assert_eq!(json["entries"][1]["kind"], "run");
        assert_eq!(json["entries"][1]["max_attempts"], 3);
    }

    #[test]
    fn serializes_entries_with_kind_tag() {
        let mut plan = Plan::new();
        plan.push_scoped(step("start"), step("stop"));
        let json = serde_json::to_value(&plan).expect("serialize");
        assert_eq!(json["entries"][0]["kind"], "scoped");
        assert_eq!(json["entries"][0]["release"]["name"], "stop");
    }
}

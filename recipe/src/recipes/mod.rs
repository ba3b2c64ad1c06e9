//! Recipe definitions: the run context and the plans built from it.
//!
//! A recipe turns an immutable [`RunContext`] plus configuration into a
//! [`Plan`]. Building a plan is pure; nothing runs until the plan is handed to
//! the sequencer.

pub mod infra;
pub mod puppeteer;

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::core::classifier::{Branch, BuilderFlags};
use crate::core::plan::Plan;
use crate::core::types::Environment;
use crate::io::config::RecipeConfig;

/// Which recipe to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RecipeKind {
    /// Checkout, Go toolchain setup, build or unit tests by builder size.
    Infra,
    /// Browser screenshot tests with digest upload.
    Puppeteer,
}

/// Build properties passed by the scheduler. Informational except where a
/// recipe says otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Properties {
    pub revision: Option<String>,
    pub patch_issue: Option<String>,
    pub patch_set: Option<String>,
    pub patch_ref: Option<String>,
    pub patch_repo: Option<String>,
    pub buildbucket_build_id: Option<String>,
}

impl Properties {
    /// A tryjob carries a non-zero issue, patch set, revision, and build id.
    pub fn is_tryjob(&self) -> bool {
        [
            &self.patch_issue,
            &self.patch_set,
            &self.revision,
            &self.buildbucket_build_id,
        ]
        .iter()
        .all(|value| value.as_deref().is_some_and(|v| !v.is_empty() && v != "0"))
    }
}

/// Everything a recipe needs to know about one invocation. Built once, then read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunContext {
    builder_name: String,
    flags: BuilderFlags,
    start_dir: PathBuf,
    #[serde(skip)]
    base_environment: Environment,
    properties: Properties,
}

impl RunContext {
    pub fn new(
        builder_name: impl Into<String>,
        start_dir: impl AsRef<Path>,
        base_environment: Environment,
        properties: Properties,
    ) -> Self {
        let builder_name = builder_name.into();
        Self {
            flags: BuilderFlags::from_builder_name(&builder_name),
            builder_name,
            start_dir: normalize_start_dir(start_dir.as_ref()),
            base_environment,
            properties,
        }
    }

    pub fn builder_name(&self) -> &str {
        &self.builder_name
    }

    pub fn flags(&self) -> BuilderFlags {
        self.flags
    }

    pub fn branch(&self) -> Branch {
        self.flags.branch()
    }

    pub fn start_dir(&self) -> &Path {
        &self.start_dir
    }

    pub fn base_environment(&self) -> &Environment {
        &self.base_environment
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}

/// Drop a trailing `k` component, which the task launcher appends to the
/// real task directory.
pub fn normalize_start_dir(path: &Path) -> PathBuf {
    match (path.file_name(), path.parent()) {
        (Some(name), Some(parent)) if name == "k" => parent.to_path_buf(),
        _ => path.to_path_buf(),
    }
}

/// Build the plan for `kind`.
pub fn build_plan(kind: RecipeKind, ctx: &RunContext, config: &RecipeConfig) -> Result<Plan> {
    match kind {
        RecipeKind::Infra => infra::build_plan(ctx, config),
        RecipeKind::Puppeteer => puppeteer::build_plan(ctx),
    }
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(issue: &str, set: &str, rev: &str, build: &str) -> Properties {
        Properties {
            patch_issue: Some(issue.to_string()),
            patch_set: Some(set.to_string()),
            revision: Some(rev.to_string()),
            buildbucket_build_id: Some(build.to_string()),
            ..Properties::default()
        }
    }

    #[test]
    fn tryjob_needs_all_four_properties_non_zero() {
        assert!(props("123456", "3", "78e0b810", "8894409419339087024").is_tryjob());
        assert!(!props("0", "3", "78e0b810", "8894").is_tryjob());
        assert!(!props("123456", "3", "78e0b810", "0").is_tryjob());
        assert!(!Properties::default().is_tryjob());
        let partial = Properties {
            revision: Some("78e0b810".to_string()),
            ..Properties::default()
        };
        assert!(!partial.is_tryjob());
    }

    #[test]
    fn trailing_k_is_dropped_from_start_dir() {
        assert_eq!(
            normalize_start_dir(Path::new("/b/s/w/ir/k")),
            PathBuf::from("/b/s/w/ir")
        );
        assert_eq!(
            normalize_start_dir(Path::new("/b/s/w/ir")),
            PathBuf::from("/b/s/w/ir")
        );
        assert_eq!(
            normalize_start_dir(Path::new("/b/s/w/ir/kk")),
            PathBuf::from("/b/s/w/ir/kk")
        );
    }

    #[test]
    fn context_classifies_once() {
        let ctx = RunContext::new(
            "Infra-PerCommit-Race",
            "/b/s/w/ir/k",
            Environment::new(),
            Properties::default(),
        );
        assert_eq!(ctx.branch(), Branch::Race);
        assert!(ctx.flags().needs_emulators());
        assert_eq!(ctx.start_dir(), Path::new("/b/s/w/ir"));
    }
}

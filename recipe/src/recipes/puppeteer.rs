//! Puppeteer recipe: screenshot tests in a container, then digest upload.

use anyhow::{Result, anyhow};

use crate::core::env::EnvironmentBuilder;
use crate::core::plan::Plan;
use crate::core::types::Step;
use crate::recipes::{Properties, RunContext};

pub const RUN_TESTS: &str = "run puppeteer tests";
pub const UPLOAD_TRYJOB: &str = "upload digests (tryjob)";
pub const UPLOAD_POSTSUBMIT: &str = "upload digests (non-tryjob)";

/// Assemble the puppeteer plan. Fails when `revision` is missing.
pub fn build_plan(ctx: &RunContext) -> Result<Plan> {
    let props = ctx.properties();
    let revision = props
        .revision
        .as_deref()
        .filter(|rev| !rev.is_empty())
        .ok_or_else(|| anyhow!("missing required property `revision`"))?;

    let buildbot_dir = ctx.start_dir().join("buildbot");
    let tests_dir = buildbot_dir.join("puppeteer-tests");
    let base = ctx.base_environment();
    let docker_env = EnvironmentBuilder::new(base)
        .set("DOCKER_CONFIG", "/home/chrome-bot/.docker")
        .build();

    let mut plan = Plan::new();
    plan.push(Step::new(
        RUN_TESTS,
        ["make", "puppeteer-tests"],
        &buildbot_dir,
        &docker_env,
    ));

    let mut upload = vec![
        "python3".to_string(),
        "upload-screenshots-to-gold.py".to_string(),
        "--images_dir".to_string(),
        "./output".to_string(),
        "--path_to_goldctl".to_string(),
        "../../cipd_bin_packages/goldctl".to_string(),
        "--revision".to_string(),
        revision.to_string(),
    ];
    let name = match tryjob_args(props) {
        Some(args) => {
            upload.extend(args);
            UPLOAD_TRYJOB
        }
        None => UPLOAD_POSTSUBMIT,
    };
    plan.push(Step::new(name, upload, &tests_dir, base));
    Ok(plan)
}

fn tryjob_args(props: &Properties) -> Option<Vec<String>> {
    if !props.is_tryjob() {
        return None;
    }
    Some(vec![
        "--issue".to_string(),
        props.patch_issue.clone()?,
        "--patch_set".to_string(),
        props.patch_set.clone()?,
        "--task_id".to_string(),
        props.buildbucket_build_id.clone()?,
    ])
}

//! Infra recipe: checkout bootstrap, Go toolchain setup, then either a full
//! build or the unit tests for the builder's size class.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::classifier::Branch;
use crate::core::env::EnvironmentBuilder;
use crate::core::plan::Plan;
use crate::core::types::{Environment, Step};
use crate::io::config::RecipeConfig;
use crate::recipes::{RunContext, path_str};

pub const START_EMULATORS: &str = "start the cloud emulators";
pub const STOP_EMULATORS: &str = "stop the cloud emulators";
pub const FETCH_DEPS: &str = "go mod download";
pub const RUN_UNITTESTS: &str = "run_unittests";
pub const MAKE_ALL: &str = "make all";
pub const CHECK_GO_MOD: &str = "git diff go.mod";

/// Directory layout under the task start dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraLayout {
    pub start_dir: PathBuf,
    /// The checkout.
    pub infra_dir: PathBuf,
    pub gopath: PathBuf,
    pub go_cache: PathBuf,
    pub go_root: PathBuf,
    pub depot_tools: PathBuf,
}

impl InfraLayout {
    pub fn new(start_dir: &Path) -> Self {
        Self {
            start_dir: start_dir.to_path_buf(),
            infra_dir: start_dir.join("buildbot"),
            gopath: start_dir.join("cache").join("gopath"),
            go_cache: start_dir.join("cache").join("go_cache"),
            go_root: start_dir.join("go").join("go"),
            depot_tools: start_dir.join("recipe_bundle").join("depot_tools"),
        }
    }

    /// Tool directories placed ahead of the inherited `PATH`.
    pub fn tool_paths(&self) -> Vec<String> {
        [
            self.go_root.join("bin"),
            self.gopath.join("bin"),
            self.start_dir.join("gcloud_linux").join("bin"),
            self.start_dir.join("protoc").join("bin"),
            self.start_dir.join("node").join("node").join("bin"),
            self.start_dir.join("cockroachdb"),
        ]
        .iter()
        .map(|path| path_str(path))
        .collect()
    }
}

/// Environment for toolchain steps (dependency fetch, installs, emulators).
pub fn toolchain_environment(base: &Environment, layout: &InfraLayout) -> Environment {
    toolchain_builder(base, layout).build()
}

/// Environment for the build/test step: toolchain plus depot_tools and, for
/// large and race builders, the configured emulator endpoints.
pub fn test_environment(
    ctx: &RunContext,
    layout: &InfraLayout,
    config: &RecipeConfig,
) -> Environment {
    let depot_tools = path_str(&layout.depot_tools);
    toolchain_builder(ctx.base_environment(), layout)
        .append_path([depot_tools.as_str()])
        .set_all_if(ctx.flags().needs_emulators(), config.emulator_hosts.clone())
        .set("SKIABOT_TEST_DEPOT_TOOLS", depot_tools.as_str())
        .build()
}

fn toolchain_builder<'a>(base: &'a Environment, layout: &InfraLayout) -> EnvironmentBuilder<'a> {
    EnvironmentBuilder::new(base)
        .prepend_path(layout.tool_paths())
        .set("CHROME_HEADLESS", "1")
        .set("DOCKER_CONFIG", "/home/chrome-bot/.docker")
        .set("GOCACHE", path_str(&layout.go_cache))
        // Builds must not rewrite go.mod; the final check enforces it.
        .set("GOFLAGS", "-mod=readonly")
        .set("GOROOT", path_str(&layout.go_root))
        .set("GOPATH", path_str(&layout.gopath))
        .set("GIT_USER_AGENT", "git/1.9.1")
}

/// Unit test driver invocation for a non-build branch.
pub fn unittest_command(branch: Branch) -> Vec<String> {
    ["go", "run", "./run_unittests.go", "--alsologtostderr"]
        .iter()
        .chain(branch.test_flags())
        .map(|arg| (*arg).to_string())
        .collect()
}

/// Assemble the infra plan for `ctx`.
pub fn build_plan(ctx: &RunContext, config: &RecipeConfig) -> Result<Plan> {
    let fetch_policy = config.fetch_policy().context("fetch_attempts")?;
    let layout = InfraLayout::new(ctx.start_dir());
    let base = ctx.base_environment();
    let toolchain = toolchain_environment(base, &layout);
    let workdir = layout.infra_dir.as_path();
    let mut plan = Plan::new();

    // The checkout arrives without a .git directory.
    plan.push(Step::new("git init", ["git", "init"], workdir, base))
        .push(Step::new("git add", ["git", "add", "."], workdir, base))
        .push(Step::new(
            "git commit",
            ["git", "commit", "-m", "Snapshot of isolated checkout"],
            workdir,
            base,
        ));

    if ctx.flags().needs_emulators() {
        let script = path_str(&layout.infra_dir.join(&config.emulator_script));
        plan.push_scoped(
            Step::new(START_EMULATORS, [script.as_str(), "start"], workdir, &toolchain),
            Step::new(STOP_EMULATORS, [script.as_str(), "stop"], workdir, &toolchain),
        );
    }

    plan.push(Step::new("which go", ["which", "go"], workdir, &toolchain))
        .push_retryable(
            Step::new(FETCH_DEPS, ["go", "mod", "download"], workdir, &toolchain),
            fetch_policy,
        );
    for target in &config.install_targets {
        plan.push(Step::new(
            format!("go install {target}"),
            ["go", "install", "-v", target.as_str()],
            workdir,
            &toolchain,
        ));
    }

    let test_env = test_environment(ctx, &layout, config);
    match ctx.branch() {
        Branch::Build => plan.push(Step::new(MAKE_ALL, ["make", "all"], workdir, &test_env)),
        branch => plan.push(Step::new(
            RUN_UNITTESTS,
            unittest_command(branch),
            workdir,
            &test_env,
        )),
    };

    plan.push(Step::new(
        CHECK_GO_MOD,
        ["git", "diff", "--no-ext-diff", "--exit-code", "go.mod"],
        workdir,
        base,
    ));
    Ok(plan)
}

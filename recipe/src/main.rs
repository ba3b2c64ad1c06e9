//! CI build recipe runner.
//!
//! Classifies the builder, resolves the recipe into an ordered step plan, runs
//! it with retries and guaranteed cleanup, and exits with a status code from
//! [`recipe::exit_codes`].

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{error, warn};

use recipe::core::classifier::{Branch, BuilderFlags};
use recipe::core::plan::Plan;
use recipe::core::types::Environment;
use recipe::driver::{RecipeDriver, exit_code};
use recipe::exit_codes;
use recipe::io::config::load_config;
use recipe::io::executor::ProcessExecutor;
use recipe::io::report::{render_summary, to_json_string, write_outcome};
use recipe::logging;
use recipe::recipes::{Properties, RecipeKind, RunContext};

#[derive(Parser)]
#[command(name = "recipe", version, about = "Single-machine CI build recipe runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute the recipe and exit with its terminal status.
    Run {
        #[command(flatten)]
        target: TargetArgs,
        /// Write one log file per executed step into this directory.
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Write the full run outcome as JSON to this file.
        #[arg(long)]
        output_result_json: Option<PathBuf>,
    },
    /// Print the resolved step plan as JSON without executing anything.
    Plan {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Print the branch selected for a builder name.
    Classify {
        #[arg(long)]
        buildername: String,
    },
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// CI builder name, e.g. `Infra-PerCommit-Large`.
    #[arg(long)]
    buildername: String,
    #[arg(long, value_enum, default_value_t = RecipeKind::Infra)]
    recipe: RecipeKind,
    /// Task directory holding the checkout, caches, and toolchains.
    #[arg(long, default_value = ".")]
    start_dir: PathBuf,
    /// TOML config; defaults apply when the file is missing.
    #[arg(long, default_value = "recipe.toml")]
    config: PathBuf,
    #[arg(long)]
    revision: Option<String>,
    #[arg(long)]
    patch_issue: Option<String>,
    #[arg(long)]
    patch_set: Option<String>,
    #[arg(long)]
    patch_ref: Option<String>,
    #[arg(long)]
    patch_repo: Option<String>,
    #[arg(long)]
    buildbucket_build_id: Option<String>,
}

impl TargetArgs {
    fn context(&self) -> Result<RunContext> {
        let start_dir = std::path::absolute(&self.start_dir)
            .with_context(|| format!("resolve start dir {}", self.start_dir.display()))?;
        let properties = Properties {
            revision: self.revision.clone(),
            patch_issue: self.patch_issue.clone(),
            patch_set: self.patch_set.clone(),
            patch_ref: self.patch_ref.clone(),
            patch_repo: self.patch_repo.clone(),
            buildbucket_build_id: self.buildbucket_build_id.clone(),
        };
        Ok(RunContext::new(
            self.buildername.as_str(),
            start_dir,
            inherited_environment(),
            properties,
        ))
    }
}

#[derive(Serialize)]
struct PlanReport<'a> {
    recipe: RecipeKind,
    branch: Branch,
    context: &'a RunContext,
    plan: &'a Plan,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap's own exit code would collide with CLEANUP_FAILED.
            let _ = err.print();
            return Ok(if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            });
        }
    };
    match cli.command {
        Command::Run {
            target,
            log_dir,
            output_result_json,
        } => cmd_run(&target, log_dir, output_result_json.as_deref()),
        Command::Plan { target } => cmd_plan(&target),
        Command::Classify { buildername } => cmd_classify(&buildername),
    }
}

fn cmd_run(target: &TargetArgs, log_dir: Option<PathBuf>, result_json: Option<&Path>) -> Result<i32> {
    let config = load_config(&target.config)?;
    let ctx = target.context()?;
    let mut options = config.exec_options();
    options.log_dir = log_dir;
    let executor = ProcessExecutor::new(options);

    let outcome = RecipeDriver::new(target.recipe, &executor, &config).run(&ctx)?;
    print!("{}", render_summary(&outcome));
    if let Some(path) = result_json {
        // The exit code must still reflect the run, so a report failure is only logged.
        if let Err(err) = write_outcome(path, &outcome) {
            error!(err = %format!("{err:#}"), "failed to write result json");
            eprintln!("warning: {:#}", err);
        }
    }
    Ok(exit_code(outcome.status))
}

fn cmd_plan(target: &TargetArgs) -> Result<i32> {
    let config = load_config(&target.config)?;
    let ctx = target.context()?;
    let executor = ProcessExecutor::default();
    let plan = RecipeDriver::new(target.recipe, &executor, &config).plan(&ctx)?;
    let report = PlanReport {
        recipe: target.recipe,
        branch: ctx.branch(),
        context: &ctx,
        plan: &plan,
    };
    print!("{}", to_json_string(&report)?);
    Ok(exit_codes::OK)
}

fn cmd_classify(buildername: &str) -> Result<i32> {
    println!("{}", BuilderFlags::from_builder_name(buildername).branch());
    Ok(exit_codes::OK)
}

/// Process environment, skipping entries that are not valid UTF-8.
fn inherited_environment() -> Environment {
    utf8_environment(env::vars_os())
}

/// Children get only the composed environment, so a skipped entry is lost to
/// every step; each one is logged.
fn utf8_environment(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Environment {
    let mut environment = Environment::new();
    for (key, value) in vars {
        match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => {
                environment.insert(key, value);
            }
            (Ok(key), Err(_)) => {
                warn!(key = %key, "dropping environment variable with non-UTF-8 value");
            }
            (Err(key), _) => {
                warn!(key = ?key, "dropping environment variable with non-UTF-8 name");
            }
        }
    }
    environment
}

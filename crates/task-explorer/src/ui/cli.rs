//! Command-line entry point.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::app::explorer::TaskExplorer;
use crate::app::settings::SettingsStore;
use crate::app::solution::SolutionModel;
use crate::infra::config::Config;
use crate::infra::engine::MsBuildProcessEngine;
use crate::infra::output::ConsoleOutput;
use crate::infra::solution::SolutionHost;
use crate::infra::workspace::FsSolutionHost;
use crate::ui::render::{RenderOptions, render_tree};

const OUTPUT_TITLE: &str = "Task Explorer";

#[derive(Parser)]
#[command(
    name = "task-explorer",
    author,
    version,
    about = "Browse and run MSBuild targets across a solution",
    long_about = None
)]
pub struct Cli {
    /// Solution file, project file, or directory to open.
    #[arg(long, global = true, default_value = ".")]
    solution: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the task tree
    Tree {
        /// Case-insensitive regular expression over target names; saved for next time
        #[arg(long)]
        filter: Option<String>,
        /// List the targets of every file, not only expanded ones
        #[arg(long)]
        all: bool,
    },
    /// Build one target of a project. Ctrl-C aborts all outstanding builds
    Run { project: PathBuf, target: String },
    /// Dump every evaluated property of a project
    Props { project: PathBuf },
    /// Mark a project node expanded
    Expand { project: PathBuf },
    /// Mark a project node collapsed
    Collapse { project: PathBuf },
    /// Generate shell completions
    Completions { shell: Shell },
}

pub async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "task-explorer", &mut io::stdout());
        return Ok(());
    }

    let config = Config::load()?;
    let engine = Arc::new(MsBuildProcessEngine::from_config(&config));
    let host = Arc::new(FsSolutionHost::new(config)?);
    host.open(&cli.solution)
        .with_context(|| format!("failed to open {}", cli.solution.display()))?;
    let root = host.solution_dir().unwrap_or_else(|| cli.solution.clone());

    let solution = SolutionModel::new(host, Arc::new(ConsoleOutput::new(OUTPUT_TITLE)));
    let mut explorer = TaskExplorer::new(solution, engine, SettingsStore::new(root.clone()));
    explorer.activate().await?;

    match cli.command {
        Commands::Tree { filter, all } => {
            if let Some(filter) = filter {
                explorer.set_filter(filter).await?;
            }
            let rendered = render_tree(
                explorer.tree(),
                explorer.expanded(),
                RenderOptions {
                    root: Some(root.as_path()),
                    expand_all: all,
                },
            );
            print!("{rendered}");
        }
        Commands::Run { project, target } => {
            let project = resolve_project(&project)?;
            let listed = explorer
                .tree()
                .and_then(|tree| tree.file(&project))
                .and_then(|file| file.target(&target))
                .map(|listed| listed.name.clone());
            let target = match listed {
                Some(name) => name,
                None => {
                    tracing::warn!(
                        project = %project.display(),
                        target,
                        "target is not listed in the task tree, running it anyway"
                    );
                    target
                }
            };
            let run = explorer.run_target(&project, &target);
            tokio::pin!(run);
            let outcome = tokio::select! {
                outcome = &mut run => outcome,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupt received, aborting builds");
                    explorer.abort_all();
                    run.await
                }
            };
            match outcome {
                Some(outcome) if outcome.is_success() => {}
                Some(outcome) => bail!("build {outcome}"),
                None => bail!("no solution open"),
            }
        }
        Commands::Props { project } => {
            explorer.dump_properties(&resolve_project(&project)?);
        }
        Commands::Expand { project } => toggle(&mut explorer, &project, true)?,
        Commands::Collapse { project } => toggle(&mut explorer, &project, false)?,
        Commands::Completions { .. } => {}
    }

    explorer.deactivate()
}

fn toggle(explorer: &mut TaskExplorer, project: &Path, expanded: bool) -> Result<()> {
    let key = resolve_project(project)?.display().to_string();
    if !explorer.set_expanded(&key, expanded) {
        bail!("{} is not in the task tree", project.display());
    }
    Ok(())
}

fn resolve_project(project: &Path) -> Result<PathBuf> {
    fs::canonicalize(project)
        .with_context(|| format!("project file not found: {}", project.display()))
}

//! Task tree construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::app::filter::TargetFilter;
use crate::app::solution::SolutionModel;
use crate::domain::errors::{EvaluationError, TreeError};
use crate::domain::model::{BuildableFile, ProjectEvaluation, Target};

/// Filtered, ordered snapshot of every buildable file in the solution.
#[derive(Debug)]
pub struct TaskTree {
    pub files: Vec<BuildableFile>,
    /// Predicate applied when this tree was built.
    pub filter: Arc<TargetFilter>,
    /// Problems that removed entries without aborting the build.
    pub errors: Vec<TreeError>,
}

impl TaskTree {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.files.iter().any(|file| file.key() == key)
    }

    pub fn file(&self, path: &Path) -> Option<&BuildableFile> {
        self.files.iter().find(|file| file.path == path)
    }

    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        self.files.iter().map(BuildableFile::key)
    }
}

/// Builds [`TaskTree`]s from the open solution.
#[derive(Clone)]
pub struct TaskTreeBuilder {
    solution: SolutionModel,
}

impl TaskTreeBuilder {
    pub fn new(solution: SolutionModel) -> Self {
        Self { solution }
    }

    /// Evaluate every project and apply `filter_pattern`.
    ///
    /// Returns `None` when no solution is open. Evaluation runs on the blocking
    /// pool; per-project failures and an invalid pattern are recorded on the
    /// returned tree and written to the output channel.
    pub async fn build_tree(&self, filter_pattern: &str) -> Result<Option<TaskTree>> {
        if !self.solution.is_open() {
            tracing::debug!("no solution open, skipping tree build");
            return Ok(None);
        }

        let filter = Arc::new(TargetFilter::new(filter_pattern));
        let projects = self.solution.project_files();
        let solution = self.solution.clone();
        let evaluations = tokio::task::spawn_blocking(move || {
            projects
                .into_par_iter()
                .map(|path| {
                    let evaluation = solution.evaluate(&path);
                    (path, evaluation)
                })
                .collect::<Vec<_>>()
        })
        .await
        .context("project evaluation worker failed")?;

        let tree = assemble(evaluations, filter);
        for error in &tree.errors {
            self.solution.write_output_line(&error.to_string());
        }
        tracing::info!(
            files = tree.files.len(),
            errors = tree.errors.len(),
            filter = filter_pattern,
            "task tree built"
        );
        Ok(Some(tree))
    }
}

/// Turn raw evaluations into a tree: filter targets, drop empty files, sort by path.
pub fn assemble(
    evaluations: Vec<(PathBuf, Result<ProjectEvaluation, EvaluationError>)>,
    filter: Arc<TargetFilter>,
) -> TaskTree {
    let mut errors: Vec<TreeError> = filter.error().into_iter().collect();
    let mut files = Vec::with_capacity(evaluations.len());

    for (path, evaluation) in evaluations {
        match evaluation {
            Ok(evaluation) => {
                let targets: Vec<Target> = evaluation
                    .targets
                    .into_iter()
                    .filter(|name| filter.is_visible(name))
                    .map(Target::new)
                    .collect();
                if !targets.is_empty() {
                    files.push(BuildableFile { path, targets });
                }
            }
            Err(err) => {
                tracing::warn!(project = %path.display(), error = %err, "project evaluation failed");
                errors.push(TreeError::Evaluation(err));
            }
        }
    }

    files.sort_by(|a, b| BuildableFile::tree_order(&a.path, &b.path));
    TaskTree {
        files,
        filter,
        errors,
    }
}

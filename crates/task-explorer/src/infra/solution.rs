//! Contract between the explorer and whatever hosts the open solution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;

use crate::domain::errors::EvaluationError;
use crate::domain::model::{ProjectEvaluation, SolutionEvent};

/// Source of solution lifecycle, project files, and project evaluation.
///
/// Implementations must deliver `Opened`/`Closed` at most once per actual
/// transition. `evaluate` is called from blocking worker threads, possibly for
/// several projects at once.
pub trait SolutionHost: Send + Sync {
    fn is_open(&self) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<SolutionEvent>;

    /// All project files of the open solution; empty when nothing is open.
    fn project_files(&self) -> Vec<PathBuf>;

    /// Properties supplied to every evaluation and build request.
    fn global_properties(&self) -> BTreeMap<String, String>;

    fn evaluate(&self, project: &Path) -> Result<ProjectEvaluation, EvaluationError>;

    /// Directory holding the solution, used to locate persisted settings.
    fn solution_dir(&self) -> Option<PathBuf>;
}

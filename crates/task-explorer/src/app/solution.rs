//! Solution model: the host plus the output channel the explorer reports to.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::domain::errors::EvaluationError;
use crate::domain::model::{ProjectEvaluation, SolutionEvent};
use crate::infra::output::OutputSink;
use crate::infra::solution::SolutionHost;

#[derive(Clone)]
pub struct SolutionModel {
    host: Arc<dyn SolutionHost>,
    output: Arc<dyn OutputSink>,
}

impl SolutionModel {
    pub fn new(host: Arc<dyn SolutionHost>, output: Arc<dyn OutputSink>) -> Self {
        Self { host, output }
    }

    pub fn is_open(&self) -> bool {
        self.host.is_open()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SolutionEvent> {
        self.host.subscribe()
    }

    pub fn project_files(&self) -> Vec<PathBuf> {
        self.host.project_files()
    }

    /// Queried fresh on every call; never cached across solution changes.
    pub fn global_properties(&self) -> BTreeMap<String, String> {
        self.host.global_properties()
    }

    pub fn evaluate(&self, project: &Path) -> Result<ProjectEvaluation, EvaluationError> {
        self.host.evaluate(project)
    }

    /// Full evaluated property set, or an empty map when the project cannot be evaluated.
    pub fn all_properties(&self, project: &Path) -> BTreeMap<String, String> {
        match self.host.evaluate(project) {
            Ok(evaluation) => evaluation.properties,
            Err(err) => {
                tracing::warn!(error = %err, "failed to evaluate project properties");
                BTreeMap::new()
            }
        }
    }

    pub fn solution_dir(&self) -> Option<PathBuf> {
        self.host.solution_dir()
    }

    pub fn write_output_line(&self, text: &str) {
        self.output.write_line(text);
    }

    pub fn show_output(&self) {
        self.output.show();
    }

    pub fn output(&self) -> Arc<dyn OutputSink> {
        self.output.clone()
    }
}

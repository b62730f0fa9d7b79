//! Domain models for buildable files, targets, and build requests.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Synthetic target injected by NuGet package restore. Never shown.
pub const ENSURE_NUGET_PACKAGE_BUILD_IMPORTS: &str = "EnsureNuGetPackageBuildImports";

/// A named, invocable unit of build work declared within a project file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
}

impl Target {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A project file together with the targets that survived filtering, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildableFile {
    pub path: PathBuf,
    pub targets: Vec<Target>,
}

impl BuildableFile {
    /// Stable identifier used for navigation state.
    pub fn key(&self) -> String {
        self.path.display().to_string()
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets
            .iter()
            .find(|target| target.name.eq_ignore_ascii_case(name))
    }

    /// Tree ordering: path ascending, case-insensitive, exact string as tie-breaker.
    pub fn tree_order(a: &Path, b: &Path) -> Ordering {
        let left = a.to_string_lossy();
        let right = b.to_string_lossy();
        left.to_lowercase()
            .cmp(&right.to_lowercase())
            .then_with(|| left.cmp(&right))
    }
}

/// Everything the build engine needs for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub project_path: PathBuf,
    pub target: String,
    pub global_properties: BTreeMap<String, String>,
}

/// Terminal result of a build submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Succeeded,
    Failed { reason: String },
    Cancelled,
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Succeeded)
    }
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildOutcome::Succeeded => f.write_str("succeeded"),
            BuildOutcome::Failed { reason } => write!(f, "failed ({reason})"),
            BuildOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Lifecycle of a single run while it is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Submitted,
    Executing,
}

/// Output of evaluating one project file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectEvaluation {
    /// Declared and imported target names, in evaluation order, without duplicates.
    pub targets: Vec<String>,
    pub properties: BTreeMap<String, String>,
}

/// Host lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionEvent {
    Opened,
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_order_ignores_case_and_breaks_ties() {
        let mut paths = vec![
            PathBuf::from("/src/b.csproj"),
            PathBuf::from("/src/A.csproj"),
            PathBuf::from("/src/a.csproj"),
        ];
        paths.sort_by(|a, b| BuildableFile::tree_order(a, b));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/src/A.csproj"),
                PathBuf::from("/src/a.csproj"),
                PathBuf::from("/src/b.csproj"),
            ]
        );
    }

    #[test]
    fn outcome_display() {
        assert_eq!(BuildOutcome::Succeeded.to_string(), "succeeded");
        assert_eq!(
            BuildOutcome::Failed {
                reason: "exit code 1".into()
            }
            .to_string(),
            "failed (exit code 1)"
        );
    }

    #[test]
    fn target_lookup_ignores_case() {
        let file = BuildableFile {
            path: PathBuf::from("/src/App.csproj"),
            targets: vec![Target::new("Build"), Target::new("Compile")],
        };
        assert_eq!(file.target("compile"), Some(&Target::new("Compile")));
        assert!(file.target("Clean").is_none());
        assert_eq!(file.key(), "/src/App.csproj");
    }
}

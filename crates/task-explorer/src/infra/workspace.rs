//! Filesystem-backed solution host: `.sln` files, single projects, or plain directories.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{WalkBuilder, WalkState};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use crate::domain::errors::EvaluationError;
use crate::domain::model::{ProjectEvaluation, SolutionEvent};
use crate::infra::config::Config;
use crate::infra::msbuild::{ProjectEvaluator, normalize_separators, with_trailing_separator};
use crate::infra::solution::SolutionHost;
use crate::infra::toolset::Toolset;

/// Project type GUID Visual Studio uses for solution folders.
const SOLUTION_FOLDER_TYPE: &str = "{2150E333-8FDC-42A3-9474-1A3956D46DE8}";
const EVENT_CAPACITY: usize = 16;

/// What is currently open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSolution {
    /// The `.sln` file, project file, or directory that was opened.
    pub path: PathBuf,
    pub dir: PathBuf,
    pub name: String,
    pub kind: SolutionKind,
    pub projects: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionKind {
    SolutionFile,
    Project,
    Directory,
}

/// Solution host reading solutions and projects straight from disk.
pub struct FsSolutionHost {
    config: Config,
    evaluator: ProjectEvaluator,
    patterns: GlobSet,
    loaded: RwLock<Option<LoadedSolution>>,
    events: broadcast::Sender<SolutionEvent>,
}

impl FsSolutionHost {
    pub fn new(config: Config) -> Result<Self> {
        let patterns = build_globset(&config.projects.patterns).context("invalid project pattern")?;
        let evaluator = ProjectEvaluator::new().with_toolset(Toolset::from_config(&config));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            config,
            evaluator,
            patterns,
            loaded: RwLock::new(None),
            events,
        })
    }

    /// Open a solution file, a single project file, or a directory.
    ///
    /// A directory holding exactly one `.sln` opens that solution; otherwise the
    /// directory is searched for project files. Opening while another solution
    /// is open closes it first.
    pub fn open(&self, path: &Path) -> Result<()> {
        let path = fs::canonicalize(path)
            .with_context(|| format!("solution path not found: {}", path.display()))?;
        let solution = self.load(&path)?;
        tracing::info!(
            solution = %solution.path.display(),
            projects = solution.projects.len(),
            "solution opened"
        );

        let previous = self.loaded.write().replace(solution);
        if previous.is_some() {
            let _ = self.events.send(SolutionEvent::Closed);
        }
        let _ = self.events.send(SolutionEvent::Opened);
        Ok(())
    }

    pub fn close(&self) {
        if let Some(previous) = self.loaded.write().take() {
            tracing::info!(solution = %previous.path.display(), "solution closed");
            let _ = self.events.send(SolutionEvent::Closed);
        }
    }

    pub fn loaded(&self) -> Option<LoadedSolution> {
        self.loaded.read().clone()
    }

    fn load(&self, path: &Path) -> Result<LoadedSolution> {
        if path.is_dir() {
            let solutions = solution_files_in(path)?;
            if let [single] = solutions.as_slice() {
                return self.load_solution_file(single);
            }
            let projects = discover_projects(path, &self.config, &self.patterns)?;
            return Ok(LoadedSolution {
                path: path.to_path_buf(),
                dir: path.to_path_buf(),
                name: display_stem(path),
                kind: SolutionKind::Directory,
                projects,
            });
        }

        if has_extension(path, "sln") {
            return self.load_solution_file(path);
        }

        if self.matches_project(path) {
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            return Ok(LoadedSolution {
                path: path.to_path_buf(),
                dir,
                name: display_stem(path),
                kind: SolutionKind::Project,
                projects: vec![path.to_path_buf()],
            });
        }

        bail!(
            "{} is neither a solution, a project file, nor a directory",
            path.display()
        )
    }

    fn load_solution_file(&self, path: &Path) -> Result<LoadedSolution> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read solution {}", path.display()))?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut projects: Vec<PathBuf> = parse_solution(&contents)
            .into_iter()
            .map(|entry| dir.join(normalize_separators(&entry.relative_path)))
            .collect();
        projects.sort();
        projects.dedup();

        Ok(LoadedSolution {
            path: path.to_path_buf(),
            dir,
            name: display_stem(path),
            kind: SolutionKind::SolutionFile,
            projects,
        })
    }

    fn matches_project(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.patterns.is_match(Path::new(name)))
    }
}

impl SolutionHost for FsSolutionHost {
    fn is_open(&self) -> bool {
        self.loaded.read().is_some()
    }

    fn subscribe(&self) -> broadcast::Receiver<SolutionEvent> {
        self.events.subscribe()
    }

    fn project_files(&self) -> Vec<PathBuf> {
        self.loaded
            .read()
            .as_ref()
            .map(|solution| solution.projects.clone())
            .unwrap_or_default()
    }

    fn global_properties(&self) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        properties.insert(
            "Configuration".to_string(),
            self.config.defaults.configuration.clone(),
        );
        properties.insert("Platform".to_string(), self.config.defaults.platform.clone());

        if let Some(solution) = self.loaded.read().as_ref() {
            properties.insert("SolutionDir".into(), with_trailing_separator(&solution.dir));
            properties.insert("SolutionName".into(), solution.name.clone());
            if solution.kind == SolutionKind::SolutionFile {
                properties.insert("SolutionPath".into(), solution.path.display().to_string());
                if let Some(file_name) = solution.path.file_name() {
                    properties.insert(
                        "SolutionFileName".into(),
                        file_name.to_string_lossy().into_owned(),
                    );
                }
                properties.insert("SolutionExt".into(), ".sln".into());
            }
        }

        properties.extend(self.config.build.properties.clone());
        properties
    }

    fn evaluate(&self, project: &Path) -> Result<ProjectEvaluation, EvaluationError> {
        self.evaluator.evaluate(project, &self.global_properties())
    }

    fn solution_dir(&self) -> Option<PathBuf> {
        self.loaded.read().as_ref().map(|solution| solution.dir.clone())
    }
}

/// A `Project(...)` entry of a solution file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionEntry {
    pub type_guid: String,
    pub name: String,
    pub relative_path: String,
}

/// Parse the project entries of a `.sln` file, skipping solution folders.
pub fn parse_solution(contents: &str) -> Vec<SolutionEntry> {
    contents
        .lines()
        .filter_map(parse_project_line)
        .filter(|entry| !entry.type_guid.eq_ignore_ascii_case(SOLUTION_FOLDER_TYPE))
        .filter(|entry| Path::new(&entry.relative_path).extension().is_some())
        .collect()
}

// Project("{FAE04EC0-301F-11D3-BF4B-00C04F79EFBC}") = "App", "src\App\App.csproj", "{GUID}"
fn parse_project_line(line: &str) -> Option<SolutionEntry> {
    let rest = line.trim().strip_prefix("Project(\"")?;
    let (type_guid, rest) = rest.split_once("\")")?;
    let (_, values) = rest.split_once('=')?;
    let mut fields = values.split(',').map(|field| field.trim().trim_matches('"'));
    let name = fields.next()?.to_owned();
    let relative_path = fields.next()?.to_owned();
    Some(SolutionEntry {
        type_guid: type_guid.to_owned(),
        name,
        relative_path,
    })
}

fn solution_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut solutions = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, "sln") {
            solutions.push(path);
        }
    }
    solutions.sort();
    Ok(solutions)
}

fn discover_projects(root: &Path, config: &Config, patterns: &GlobSet) -> Result<Vec<PathBuf>> {
    let ignore = Arc::new(build_ignore_matcher(&config.projects.ignore)?);
    let mut builder = WalkBuilder::new(root);
    builder.git_ignore(true).hidden(true);

    let walk_root = root.to_path_buf();
    builder.filter_entry(move |entry| {
        if entry.depth() == 0 {
            return true;
        }
        let rel = entry.path().strip_prefix(&walk_root).unwrap_or(entry.path());
        !ignore.is_match(rel)
    });

    let found = Mutex::new(Vec::new());
    builder.build_parallel().run(|| {
        let found = &found;
        Box::new(move |result| match result {
            Ok(entry) => {
                let is_file = entry.file_type().is_some_and(|ft| ft.is_file());
                if is_file && patterns.is_match(Path::new(entry.file_name())) {
                    found.lock().push(entry.into_path());
                }
                WalkState::Continue
            }
            Err(err) => {
                tracing::warn!(error = %err, "project discovery error");
                WalkState::Continue
            }
        })
    });

    let mut projects = found.into_inner();
    projects.sort();
    Ok(projects)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob '{pattern}'"))?);
    }
    Ok(builder.build()?)
}

fn build_ignore_matcher(paths: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in paths {
        for expanded in expand_dir_pattern(pattern) {
            let glob = Glob::new(&expanded).context("invalid ignore path pattern")?;
            builder.add(glob);
        }
    }
    builder.build().context("failed to build ignore matcher")
}

fn expand_dir_pattern(raw: &str) -> Vec<String> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    vec![
        trimmed.to_owned(),
        format!("{trimmed}/**"),
        format!("**/{trimmed}"),
        format!("**/{trimmed}/**"),
    ]
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .is_some_and(|value| value.to_string_lossy().eq_ignore_ascii_case(ext))
}

fn display_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

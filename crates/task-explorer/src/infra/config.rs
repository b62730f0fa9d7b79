//! Configuration management utilities.

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::config_dir;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".task-explorer/config.toml";

/// Layered configuration loaded from defaults, user, workspace, and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub projects: Projects,
    #[serde(default)]
    pub build: Build,
}

/// Active solution configuration applied to every build request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "Defaults::default_configuration")]
    pub configuration: String,
    #[serde(default = "Defaults::default_platform")]
    pub platform: String,
}

impl Defaults {
    fn default_configuration() -> String {
        "Debug".into()
    }

    fn default_platform() -> String {
        "AnyCPU".into()
    }
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            configuration: Self::default_configuration(),
            platform: Self::default_platform(),
        }
    }
}

/// External build engine command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engine {
    #[serde(default = "Engine::default_program")]
    pub program: String,
    #[serde(default = "Engine::default_args")]
    pub args: Vec<String>,
    #[serde(default = "Engine::default_verbosity")]
    pub verbosity: String,
    /// MSBuild tools directory holding `Microsoft.Common.targets`; discovered when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolset_path: Option<PathBuf>,
    /// Directory of MSBuild project SDKs; defaults to `<toolset_path>/Sdks`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdks_path: Option<PathBuf>,
}

impl Engine {
    fn default_program() -> String {
        "dotnet".into()
    }

    fn default_args() -> Vec<String> {
        vec!["msbuild".into(), "-nologo".into()]
    }

    fn default_verbosity() -> String {
        "minimal".into()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            program: Self::default_program(),
            args: Self::default_args(),
            verbosity: Self::default_verbosity(),
            toolset_path: None,
            sdks_path: None,
        }
    }
}

/// Project discovery rules used when a directory is opened instead of a solution file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projects {
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl Default for Projects {
    fn default() -> Self {
        Self {
            patterns: vec![
                "*.csproj".into(),
                "*.vbproj".into(),
                "*.fsproj".into(),
                "*.vcxproj".into(),
                "*.proj".into(),
            ],
            ignore: vec![
                "bin/".into(),
                "obj/".into(),
                ".git/".into(),
                "node_modules/".into(),
            ],
        }
    }
}

/// Extra global properties passed to evaluation and every build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Build {
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Environment overrides for critical settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    configuration: Option<String>,
    platform: Option<String>,
    engine: Option<String>,
    sdks_path: Option<PathBuf>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            configuration: env::var("TASK_EXPLORER_CONFIGURATION").ok(),
            platform: env::var("TASK_EXPLORER_PLATFORM").ok(),
            engine: env::var("TASK_EXPLORER_ENGINE").ok(),
            sdks_path: env::var_os("MSBuildSDKsPath").map(PathBuf::from),
        }
    }

    #[cfg(test)]
    fn for_tests(configuration: &str, engine: &str) -> Self {
        Self {
            configuration: Some(configuration.to_owned()),
            platform: None,
            engine: Some(engine.to_owned()),
            sdks_path: None,
        }
    }
}

impl Config {
    /// Load configuration from defaults, user/global config, workspace config, and env overrides.
    pub fn load() -> Result<Self> {
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = workspace_config_path()?;
        Self::load_with_layers(global, workspace, env)
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG)?);

        if let Some(global_path) = global.filter(|path| path.exists()) {
            tracing::debug!(path = %global_path.display(), "loading user config");
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            tracing::debug!(path = %workspace_path.display(), "loading workspace config");
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        Ok(apply_env_overrides(merged, env_overrides))
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data)
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            defaults: merge_defaults(self.defaults, other.defaults),
            engine: merge_engine(self.engine, other.engine),
            projects: merge_projects(self.projects, other.projects),
            build: merge_build(self.build, other.build),
        }
    }
}

fn merge_defaults(base: Defaults, overlay: Defaults) -> Defaults {
    Defaults {
        configuration: choose(
            base.configuration,
            overlay.configuration,
            Defaults::default_configuration,
        ),
        platform: choose(base.platform, overlay.platform, Defaults::default_platform),
    }
}

fn merge_engine(base: Engine, overlay: Engine) -> Engine {
    Engine {
        program: choose(base.program, overlay.program, Engine::default_program),
        args: if overlay.args != Engine::default_args() {
            overlay.args
        } else {
            base.args
        },
        verbosity: choose(base.verbosity, overlay.verbosity, Engine::default_verbosity),
        toolset_path: overlay.toolset_path.or(base.toolset_path),
        sdks_path: overlay.sdks_path.or(base.sdks_path),
    }
}

fn merge_projects(base: Projects, overlay: Projects) -> Projects {
    let mut patterns: BTreeSet<String> = base.patterns.into_iter().collect();
    patterns.extend(overlay.patterns);

    let mut ignore: BTreeSet<String> = base.ignore.into_iter().collect();
    ignore.extend(overlay.ignore);

    Projects {
        patterns: patterns.into_iter().collect(),
        ignore: ignore.into_iter().collect(),
    }
}

fn merge_build(mut base: Build, overlay: Build) -> Build {
    base.properties.extend(overlay.properties);
    base
}

fn choose(base: String, overlay: String, default_fn: fn() -> String) -> String {
    if overlay != default_fn() {
        overlay
    } else {
        base
    }
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("task-explorer/config.toml"))
}

fn workspace_config_path() -> Result<Option<PathBuf>> {
    let cwd = env::current_dir()?;
    let root = find_repo_root(&cwd).unwrap_or(cwd);
    Ok(Some(root.join(DEFAULT_WORKSPACE_CONFIG_PATH)))
}

fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut current = start;
    loop {
        if current.join(".git").exists() {
            return Some(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Config {
    if let Some(configuration) = env.configuration {
        config.defaults.configuration = configuration;
    }
    if let Some(platform) = env.platform {
        config.defaults.platform = platform;
    }
    if let Some(engine) = env.engine {
        config.engine.program = engine;
    }
    if let Some(sdks_path) = env.sdks_path {
        config.engine.sdks_path = Some(sdks_path);
    }
    config
}

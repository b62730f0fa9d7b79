//! Locating the MSBuild toolset and project SDKs of an installed .NET SDK.

use std::cmp::Ordering;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::infra::config::Config;

const SDKS_DIR: &str = "Sdks";
const COMMON_TARGETS: &str = "Microsoft.Common.targets";

/// Directories that `$(MSBuildToolsPath)`, `$(MSBuildExtensionsPath)` and
/// `Sdk="…"` imports resolve against. Both are optional; unresolved imports
/// are skipped by the evaluator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toolset {
    pub tools_path: Option<PathBuf>,
    pub sdks_path: Option<PathBuf>,
}

impl Toolset {
    pub fn new(tools_path: Option<PathBuf>, sdks_path: Option<PathBuf>) -> Self {
        let sdks_path = sdks_path.or_else(|| {
            tools_path
                .as_ref()
                .map(|tools| tools.join(SDKS_DIR))
                .filter(|sdks| sdks.is_dir())
        });
        Self {
            tools_path,
            sdks_path,
        }
    }

    /// Configured paths first, then the newest SDK of the first .NET install found.
    pub fn from_config(config: &Config) -> Self {
        let tools_path = config
            .engine
            .toolset_path
            .clone()
            .or_else(|| dotnet_roots().iter().find_map(|root| newest_sdk(root)));
        let toolset = Self::new(tools_path, config.engine.sdks_path.clone());
        match &toolset.tools_path {
            Some(path) => tracing::debug!(tools = %path.display(), "using MSBuild toolset"),
            None => tracing::debug!("no MSBuild toolset found, SDK imports will be skipped"),
        }
        toolset
    }

    /// `Sdk.props`/`Sdk.targets` directory of the named SDK. A `/version` suffix is ignored.
    pub fn sdk_dir(&self, reference: &str) -> Option<PathBuf> {
        let name = reference.split('/').next()?.trim();
        if name.is_empty() {
            return None;
        }
        let dir = self.sdks_path.as_ref()?.join(name).join("Sdk");
        dir.is_dir().then_some(dir)
    }
}

fn dotnet_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(root) = env::var_os("DOTNET_ROOT") {
        roots.push(PathBuf::from(root));
    }
    let executable = if cfg!(windows) { "dotnet.exe" } else { "dotnet" };
    if let Some(path) = env::var_os("PATH") {
        for dir in env::split_paths(&path) {
            let candidate = dir.join(executable);
            if candidate.is_file()
                && let Some(parent) = fs::canonicalize(&candidate)
                    .ok()
                    .and_then(|resolved| resolved.parent().map(Path::to_path_buf))
            {
                roots.push(parent);
            }
        }
    }
    if let Some(home) = dirs_next::home_dir() {
        roots.push(home.join(".dotnet"));
    }
    if cfg!(windows) {
        roots.push(PathBuf::from(r"C:\Program Files\dotnet"));
    } else {
        roots.extend(
            ["/usr/share/dotnet", "/usr/lib/dotnet", "/usr/local/share/dotnet"]
                .into_iter()
                .map(PathBuf::from),
        );
    }
    roots
}

/// Highest-versioned `sdk/<version>` directory under `root` that carries the common targets.
pub(crate) fn newest_sdk(root: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(root.join("sdk")).ok()?;
    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.join(COMMON_TARGETS).is_file())
        .max_by(|a, b| compare_versions(&version_of(a), &version_of(b)))
}

fn version_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Numeric components compare as numbers; a release sorts after its prereleases.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let split = |v: &str| -> (Vec<u64>, bool) {
        let (core, pre) = match v.split_once('-') {
            Some((core, _)) => (core, true),
            None => (v, false),
        };
        (
            core.split('.').map(|part| part.parse().unwrap_or(0)).collect(),
            pre,
        )
    };
    let (left, left_pre) = split(a);
    let (right, right_pre) = split(b);
    left.cmp(&right).then(right_pre.cmp(&left_pre))
}

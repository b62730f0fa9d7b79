//! Plain-text rendering of the task tree.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

use crate::app::tree::TaskTree;
use crate::domain::model::BuildableFile;

const EXPANDED: &str = "▾";
const COLLAPSED: &str = "▸";
const FILTER: &str = "⌕";
const TARGET_INDENT: &str = "    ";

pub const NO_SOLUTION: &str = "No solution open";
pub const NO_MATCHES: &str = "No targets match filter";

/// How the tree should be laid out.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions<'a> {
    /// File paths are shown relative to this directory when they live under it.
    pub root: Option<&'a Path>,
    /// Show every node's targets regardless of the expanded set.
    pub expand_all: bool,
}

/// Render `tree` with expanded nodes listing their targets and collapsed nodes
/// showing a target count.
pub fn render_tree(
    tree: Option<&TaskTree>,
    expanded: &BTreeSet<String>,
    options: RenderOptions<'_>,
) -> String {
    let Some(tree) = tree else {
        return format!("{NO_SOLUTION}\n");
    };

    let mut out = String::new();
    let pattern = tree.filter.pattern();
    if !pattern.is_empty() {
        let _ = writeln!(out, "{FILTER} {pattern}");
    }
    if tree.is_empty() {
        let _ = writeln!(out, "{NO_MATCHES}");
        return out;
    }

    for file in &tree.files {
        let label = display_path(file, options.root);
        if options.expand_all || expanded.contains(&file.key()) {
            let _ = writeln!(out, "{EXPANDED} {label}");
            for target in &file.targets {
                let _ = writeln!(out, "{TARGET_INDENT}{target}");
            }
        } else {
            let count = file.targets.len();
            let noun = if count == 1 { "target" } else { "targets" };
            let _ = writeln!(out, "{COLLAPSED} {label} ({count} {noun})");
        }
    }
    out
}

fn display_path(file: &BuildableFile, root: Option<&Path>) -> String {
    root.and_then(|root| file.path.strip_prefix(root).ok())
        .map(|relative| relative.display().to_string().replace('\\', "/"))
        .unwrap_or_else(|| file.key())
}

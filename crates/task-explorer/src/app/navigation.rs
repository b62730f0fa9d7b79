//! Navigation state: which file nodes are expanded, carried through a single string.

use std::collections::BTreeSet;

use crate::app::tree::TaskTree;

/// Joins expanded paths. Chosen to be unlikely inside a file path.
pub const SEPARATOR: &str = "<`~`>";

/// Join `paths` with [`SEPARATOR`], sorted and de-duplicated.
///
/// A path containing the separator cannot be round-tripped, so it is left out
/// (and logged) rather than persisted in corrupted form.
pub fn encode<I, S>(paths: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut kept = BTreeSet::new();
    for path in paths {
        let path = path.as_ref();
        if path.contains(SEPARATOR) {
            tracing::warn!(path, "expanded path contains the navigation separator; not persisted");
            continue;
        }
        if !path.is_empty() {
            kept.insert(path.to_owned());
        }
    }
    kept.into_iter().collect::<Vec<_>>().join(SEPARATOR)
}

pub fn decode(serialized: &str) -> BTreeSet<String> {
    serialized
        .split(SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Keep only the decoded paths that still exist in `tree`.
pub fn reconcile(decoded: &BTreeSet<String>, tree: &TaskTree) -> BTreeSet<String> {
    tree.keys().filter(|key| decoded.contains(key)).collect()
}

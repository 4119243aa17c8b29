//! Path utilities for confining file system operations to a root.
//!
//! Every path the cache touches is derived from hex names, so escaping the
//! root can only happen through a bug or a tampered pointer. These checks
//! run before anything is opened or deleted.

use crate::error::{StowError, StowResult};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

/// Normalize a path by resolving . and .. components lexically
pub fn normalize_path(path: &Utf8Path) -> Utf8PathBuf {
    let mut components: Vec<Utf8Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Utf8Component::CurDir => {},
            Utf8Component::ParentDir => match components.last() {
                Some(Utf8Component::Normal(_)) => {
                    components.pop();
                },
                // `/..` is `/`
                Some(Utf8Component::RootDir) | Some(Utf8Component::Prefix(_)) => {},
                _ => components.push(component),
            },
            other => components.push(other),
        }
    }

    components.iter().map(|c| c.as_str()).collect()
}

/// Check that `path` lies inside `root` (or is `root` itself)
pub fn is_within(root: &Utf8Path, path: &Utf8Path) -> bool {
    normalize_path(path).starts_with(normalize_path(root))
}

/// Return `path` normalized, or `PathEscape` if it leaves `root`
pub fn confine(root: &Utf8Path, path: &Utf8Path) -> StowResult<Utf8PathBuf> {
    let normalized = normalize_path(path);
    if is_within(root, &normalized) {
        Ok(normalized)
    } else {
        Err(StowError::PathEscape {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        })
    }
}

/// Check that `name` is a single normal path component
pub fn is_single_component(name: &str) -> bool {
    let mut components = Utf8Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Utf8Component::Normal(c)), None) if c == name
    )
}

//! Path canonicalisation and containment.
//!
//! Every containment decision in the engine goes through [`contains`]; suite
//! refs additionally go through [`final_target`] so that symlinked (or, on
//! Windows, reparse-pointed) case directories are judged by where they
//! actually point.

use std::path::{Component, Path, PathBuf};

/// Absolute, lexically normalised form of `p`. Does not follow symlinks and
/// does not require the path to exist.
pub fn canonical(p: &Path) -> PathBuf {
    let absolute = if p.is_absolute() {
        p.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(p),
            Err(_) => p.to_path_buf(),
        }
    };
    normalize(&absolute)
}

/// Resolve `p` through symlinks to its final target. Nonexistent paths fall
/// back to their canonical form.
pub fn final_target(p: &Path) -> PathBuf {
    match std::fs::canonicalize(p) {
        Ok(resolved) => resolved,
        Err(_) => canonical(p),
    }
}

/// True iff `candidate` is `root` itself or lives underneath it, after
/// canonicalising both. Comparison is component-wise; on Windows it is
/// case-insensitive to match the filesystem.
pub fn contains(root: &Path, candidate: &Path) -> bool {
    let root = canonical(root);
    let candidate = canonical(candidate);
    starts_with(&candidate, &root)
}

fn normalize(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    let mut absolute = false;
    for component in p.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => {
                absolute = true;
                out.push(Component::RootDir.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at an absolute root is a no-op; a relative path keeps
                // it so the caller can still see the escape.
                if !out.pop() && !absolute {
                    out.push(Component::ParentDir.as_os_str());
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

#[cfg(windows)]
fn starts_with(candidate: &Path, root: &Path) -> bool {
    let candidate: Vec<String> = candidate
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
        .collect();
    let root: Vec<String> = root
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
        .collect();
    candidate.len() >= root.len() && candidate[..root.len()] == root[..]
}

#[cfg(not(windows))]
fn starts_with(candidate: &Path, root: &Path) -> bool {
    candidate.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_collapses_dots() {
        let p = canonical(Path::new("/a/b/../c/./d"));
        assert_eq!(p, PathBuf::from("/a/c/d"));
    }

    #[test]
    fn contains_requires_component_boundary() {
        assert!(contains(Path::new("/a/b"), Path::new("/a/b")));
        assert!(contains(Path::new("/a/b"), Path::new("/a/b/c")));
        assert!(!contains(Path::new("/a/b"), Path::new("/a/bc")));
        assert!(!contains(Path::new("/a/b"), Path::new("/a")));
    }

    #[test]
    fn contains_sees_through_dot_dot() {
        assert!(!contains(Path::new("/a/b"), Path::new("/a/b/../evil")));
        assert!(contains(Path::new("/a/b"), Path::new("/a/b/sub/../ok")));
    }

    #[cfg(unix)]
    #[test]
    fn final_target_resolves_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        assert_eq!(final_target(&link), std::fs::canonicalize(&real).unwrap());
    }

    #[test]
    fn final_target_of_missing_path_is_canonical() {
        let p = Path::new("/definitely/not/../here");
        assert_eq!(final_target(p), PathBuf::from("/definitely/here"));
    }
}

//! Translation of filesystem paths into ZooKeeper paths.
//!
//! The mounted filesystem shows a subtree of ZooKeeper rooted at a configured
//! alias ("chroot"). Every path the kernel hands us is relative to the mount
//! point; [`PathTranslator::resolve`] turns it into the absolute znode path.
//!
//! Two rules shape the result:
//! - `..` segments that would climb above the alias collapse to the alias
//!   itself, so nothing outside the subtree is reachable.
//! - A trailing [`ZNODE_MARKER`] segment is dropped. The marker file listed in
//!   every directory therefore addresses the directory's own znode, which is
//!   how its payload stays readable once the node is shown as a directory.

use std::path::{Path, PathBuf};
use tracing::warn;

/// Name of the synthetic file exposing a directory znode's own payload.
pub const ZNODE_MARKER: &str = "_znode";

/// Returns true if the last segment of `path` is the marker name.
pub fn is_marker_path(path: &str) -> bool {
    path.trim_end_matches('/').rsplit('/').next() == Some(ZNODE_MARKER)
}

/// Maps mount-relative paths to absolute znode paths under a root alias.
#[derive(Debug, Clone)]
pub struct PathTranslator {
    /// Normalized absolute alias, e.g. `/` or `/chroot`.
    root: String,
    /// Local mount point, stripped from paths that still carry it.
    mountpoint: PathBuf,
}

impl PathTranslator {
    /// Creates a translator for the given root alias and local mount point.
    ///
    /// The alias is normalized to an absolute path; an empty alias means `/`.
    pub fn new(root_alias: &str, mountpoint: impl Into<PathBuf>) -> Self {
        let mut segments = Vec::new();
        for segment in root_alias.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s),
            }
        }
        Self {
            root: join("/", &segments),
            mountpoint: mountpoint.into(),
        }
    }

    /// The normalized root alias.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Resolves a filesystem path into an absolute ZooKeeper path.
    ///
    /// Never fails: an empty path yields the alias, and a path escaping the
    /// alias is logged and resolved to the alias as well.
    pub fn resolve(&self, path: &str) -> String {
        let relative = self.strip_mountpoint(path);

        let mut segments: Vec<&str> = Vec::new();
        for segment in relative.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        warn!(path = %path, root = %self.root, "path escapes the root alias, using the alias");
                        return self.root.clone();
                    }
                }
                s => segments.push(s),
            }
        }

        if segments.last() == Some(&ZNODE_MARKER) {
            segments.pop();
        }

        join(&self.root, &segments)
    }

    /// Drops the local mount point prefix from absolute paths that include it.
    ///
    /// Relative input is already mount-relative and passes through, as does
    /// everything when the mount point itself is relative.
    fn strip_mountpoint<'a>(&self, path: &'a str) -> &'a str {
        if !path.starts_with('/') || !self.mountpoint.is_absolute() {
            return path;
        }
        Path::new(path)
            .strip_prefix(&self.mountpoint)
            .ok()
            .and_then(Path::to_str)
            .unwrap_or(path)
    }
}

fn join(root: &str, segments: &[&str]) -> String {
    let mut out = String::with_capacity(root.len() + segments.iter().map(|s| s.len() + 1).sum::<usize>());
    out.push_str(root);
    for segment in segments {
        if !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn translator(root: &str) -> PathTranslator {
        PathTranslator::new(root, "/mnt/fuse")
    }

    #[test]
    fn test_resolve_without_alias() {
        let t = translator("/");
        assert_eq!(t.resolve(""), "/");
        assert_eq!(t.resolve("/"), "/");
        assert_eq!(t.resolve("/test-path/"), "/test-path");
        assert_eq!(t.resolve("test-path"), "/test-path");
        assert_eq!(t.resolve("test-path/"), "/test-path");
        assert_eq!(t.resolve("test-path/sub-node"), "/test-path/sub-node");
    }

    #[test]
    fn test_resolve_with_alias() {
        let t = translator("/chroot");
        assert_eq!(t.resolve("/"), "/chroot");
        assert_eq!(t.resolve("test-path"), "/chroot/test-path");
        assert_eq!(t.resolve("test-path/sub-node"), "/chroot/test-path/sub-node");
    }

    #[test]
    fn test_marker_resolves_to_parent_node() {
        let t = translator("/chroot");
        assert_eq!(
            t.resolve(&format!("test-path/sub-node/{ZNODE_MARKER}")),
            "/chroot/test-path/sub-node"
        );
        assert_eq!(t.resolve(ZNODE_MARKER), "/chroot");
    }

    #[test]
    fn test_alias_normalization() {
        assert_eq!(PathTranslator::new("", "/mnt").root(), "/");
        assert_eq!(PathTranslator::new("chroot", "/mnt").root(), "/chroot");
        assert_eq!(PathTranslator::new("/a//b/./", "/mnt").root(), "/a/b");
        assert_eq!(PathTranslator::new("/a/../b", "/mnt").root(), "/b");
    }

    #[test]
    fn test_parent_segments_inside_root() {
        let t = translator("/chroot");
        assert_eq!(t.resolve("a/../b"), "/chroot/b");
        assert_eq!(t.resolve("a/./b/.."), "/chroot/a");
    }

    #[test]
    fn test_escape_collapses_to_alias() {
        let t = translator("/chroot");
        assert_eq!(t.resolve(".."), "/chroot");
        assert_eq!(t.resolve("a/../../etc"), "/chroot");
        assert_eq!(t.resolve("../../zookeeper/quota"), "/chroot");
    }

    #[test]
    fn test_mountpoint_prefix_is_stripped() {
        let t = translator("/data");
        assert_eq!(t.resolve("/mnt/fuse/x"), t.resolve("x"));
        assert_eq!(t.resolve("/mnt/fuse"), "/data");
        // Only whole components count as the prefix.
        assert_eq!(t.resolve("/mnt/fusex"), "/data/mnt/fusex");
    }

    #[test]
    fn test_relative_paths_keep_segment_named_like_mountpoint() {
        let t = PathTranslator::new("/", "data");
        assert_eq!(t.resolve("data/foo"), "/data/foo");
        assert_eq!(t.resolve("data"), "/data");

        let t = PathTranslator::new("/", "/mnt/fuse");
        assert_eq!(t.resolve("mnt/fuse/x"), "/mnt/fuse/x");
    }

    #[test]
    fn test_is_marker_path() {
        assert!(is_marker_path(ZNODE_MARKER));
        assert!(is_marker_path("a/b/_znode"));
        assert!(is_marker_path("a/_znode/"));
        assert!(!is_marker_path("a/b"));
        assert!(!is_marker_path("a/not_znode"));
        assert!(!is_marker_path(""));
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z0-9-]{1,8}"
    }

    proptest! {
        #[test]
        fn prop_resolve_stays_under_alias(
            alias in prop::collection::vec(segment(), 0..3),
            path in prop::collection::vec(prop_oneof![segment(), Just("..".to_string()), Just(".".to_string())], 0..6),
        ) {
            let t = PathTranslator::new(&format!("/{}", alias.join("/")), "/mnt/fuse");
            let resolved = t.resolve(&path.join("/"));
            prop_assert!(resolved.starts_with(t.root()));
            prop_assert!(resolved.starts_with('/'));
            prop_assert!(!resolved.contains("//"));
        }

        #[test]
        fn prop_trailing_slash_and_dot_are_ignored(
            path in prop::collection::vec(segment(), 1..5),
        ) {
            let t = translator("/chroot");
            let plain = path.join("/");
            prop_assert_eq!(t.resolve(&format!("{plain}/")), t.resolve(&plain));
            prop_assert_eq!(t.resolve(&format!("./{plain}/.")), t.resolve(&plain));
            prop_assert_eq!(t.resolve(&plain), format!("/chroot/{plain}"));
        }

        #[test]
        fn prop_resolve_is_idempotent_over_mount_prefix(
            path in prop::collection::vec(segment(), 0..5),
        ) {
            let t = translator("/data");
            let relative = path.join("/");
            prop_assert_eq!(t.resolve(&format!("/mnt/fuse/{relative}")), t.resolve(&relative));
        }
    }
}

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Regular files below `root` whose file name contains `pattern`, sorted.
///
/// Directories are walked recursively. Symbolic links are not followed.
pub fn discover(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut found = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() && name_matches(&entry, pattern) {
            found.push(entry.into_path());
        }
    }

    found.sort();
    tracing::debug!(root = %root.display(), pattern, files = found.len(), "discovered log files");
    Ok(found)
}

fn name_matches(entry: &walkdir::DirEntry, pattern: &str) -> bool {
    entry.file_name().to_str().is_some_and(|name| name.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_discover_recurses_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("access.log.gz"));
        touch(&root.join("access.log.1.gz"));
        touch(&root.join("error.log"));
        touch(&root.join("site/a/access.log.gz"));
        touch(&root.join("site/b.log.gz.tmp"));
        fs::create_dir_all(root.join("dir.log.gz")).unwrap();

        let found = discover(root, ".log.gz").unwrap();
        assert_eq!(
            found,
            vec![
                root.join("access.log.gz"),
                root.join("site/a/access.log.gz"),
                root.join("site/b.log.gz.tmp"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        touch(&outside.path().join("other.log.gz"));
        touch(&dir.path().join("real.log.gz"));
        std::os::unix::fs::symlink(outside.path(), dir.path().join("linked")).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("real.log.gz"),
            dir.path().join("alias.log.gz"),
        )
        .unwrap();

        let found = discover(dir.path(), ".log.gz").unwrap();
        assert_eq!(found, vec![dir.path().join("real.log.gz")]);
    }

    #[test]
    fn test_discover_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(dir.path(), ".log.gz").unwrap().is_empty());
    }

    #[test]
    fn test_discover_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(&dir.path().join("missing"), ".log.gz").is_err());
    }
}

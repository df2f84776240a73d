use std::path::{Path, PathBuf};

/// Writes `contents` to `dir/name`, creating intermediate directories, and returns the path
pub fn write_file<P: AsRef<Path>>(dir: P, name: &str, contents: &str) -> PathBuf {
    let path = dir.as_ref().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Creating parent directories failed");
    }
    std::fs::write(&path, contents).expect("Writing test file failed");
    path
}

#[must_use]
pub fn make_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Creating temp dir failed")
}

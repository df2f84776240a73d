use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

/// A log file that is rolled over before a write would make it reach `max_size` bytes.
///
/// On rollover `path` becomes `path.1`, `path.1` becomes `path.2` and so on, up to
/// `path.<backup_count>`; the oldest backup is discarded. If either `max_size` or
/// `backup_count` is zero the file grows without bound.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_size: u64,
    backup_count: usize,
    file: File,
    written: u64,
}

impl RotatingFile {
    /// Opens (or creates) the file for appending. The parent directory must already exist.
    pub fn open<P: AsRef<Path>>(path: P, max_size: u64, backup_count: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_for_append(&path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            path,
            max_size,
            backup_count,
            file,
            written,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rotation_enabled(&self) -> bool {
        self.max_size > 0 && self.backup_count > 0
    }

    fn should_rotate(&self, incoming: usize) -> bool {
        self.rotation_enabled()
            && self.written > 0
            && self.written.saturating_add(incoming as u64) >= self.max_size
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        for index in (1..self.backup_count).rev() {
            let from = self.backup_path(index);
            if from.exists() {
                std::fs::rename(&from, self.backup_path(index + 1))?;
            }
        }
        std::fs::rename(&self.path, self.backup_path(1))?;

        self.file = open_for_append(&self.path)?;
        self.written = 0;

        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.should_rotate(buf.len()) {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_for_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

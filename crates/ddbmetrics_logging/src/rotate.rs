use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Append-only log file that rolls over once it would exceed `max_bytes`.
///
/// Generations are `<name>.log` (current), `<name>.log.1` (previous), up to
/// `<name>.log.<max_files - 1>`; older ones are deleted.
pub struct SizeRotatingFile {
    dir: PathBuf,
    stem: String,
    max_files: usize,
    max_bytes: u64,
    file: File,
    written: u64,
}

impl SizeRotatingFile {
    pub fn open(dir: &Path, name: &str, max_files: usize, max_bytes: u64) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let stem = file_stem(name);
        let current = dir.join(format!("{}.log", stem));
        let file = append(&current)?;
        let written = file.metadata()?.len();
        let mut log = Self {
            dir: dir.to_path_buf(),
            stem,
            max_files: max_files.max(1),
            max_bytes: max_bytes.max(1),
            file,
            written,
        };
        if log.written > log.max_bytes {
            log.roll()?;
        }
        Ok(log)
    }

    pub fn current_path(&self) -> PathBuf {
        self.generation(0)
    }

    fn generation(&self, n: usize) -> PathBuf {
        if n == 0 {
            self.dir.join(format!("{}.log", self.stem))
        } else {
            self.dir.join(format!("{}.log.{}", self.stem, n))
        }
    }

    fn roll(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let oldest = self.max_files - 1;
        if oldest == 0 {
            self.file = File::create(self.current_path())?;
            self.written = 0;
            return Ok(());
        }

        match fs::remove_file(self.generation(oldest)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
        for n in (0..oldest).rev() {
            let from = self.generation(n);
            if from.exists() {
                fs::rename(&from, self.generation(n + 1))?;
            }
        }
        self.file = append(&self.current_path())?;
        self.written = 0;
        Ok(())
    }
}

impl Write for SizeRotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.roll()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Keep `[A-Za-z0-9_-]`, replace everything else with `_`.
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => ch,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("ddb metrics/cli"), "ddb_metrics_cli");
    }

    #[test]
    fn test_rolls_and_bounds_generations() {
        let temp = TempDir::new().unwrap();
        let mut log = SizeRotatingFile::open(temp.path(), "collector", 3, 16).unwrap();

        for _ in 0..10 {
            log.write_all(b"0123456789abcdef").unwrap();
        }
        log.flush().unwrap();

        assert!(temp.path().join("collector.log").exists());
        assert!(temp.path().join("collector.log.1").exists());
        assert!(temp.path().join("collector.log.2").exists());
        assert!(!temp.path().join("collector.log.3").exists());
        assert_eq!(fs::metadata(log.current_path()).unwrap().len(), 16);
    }

    #[test]
    fn test_reopen_appends() {
        let temp = TempDir::new().unwrap();
        {
            let mut log = SizeRotatingFile::open(temp.path(), "cli", 2, 1024).unwrap();
            log.write_all(b"first\n").unwrap();
        }
        let mut log = SizeRotatingFile::open(temp.path(), "cli", 2, 1024).unwrap();
        log.write_all(b"second\n").unwrap();
        log.flush().unwrap();

        let text = fs::read_to_string(temp.path().join("cli.log")).unwrap();
        assert_eq!(text, "first\nsecond\n");
    }
}

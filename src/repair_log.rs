use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::rasterize::RepairEvent;

/// Writes one text file of repair events per processed image.
#[derive(Debug, Clone)]
pub struct RepairLog {
    dir: PathBuf,
}

impl RepairLog {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the log for an image, e.g. `<dir>/<sop_instance_uid>_logs.txt`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}_logs.txt"))
    }

    /// Write the events for one image. Images without repairs get no log file, and a log
    /// left over from an earlier run is removed.
    pub fn write(&self, name: &str, events: &[RepairEvent]) -> std::io::Result<Option<PathBuf>> {
        let path = self.path_for(name);
        if events.is_empty() {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!("Removed stale repair log {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            return Ok(None);
        }

        fs::create_dir_all(&self.dir)?;
        let mut writer = BufWriter::new(File::create(&path)?);
        for event in events {
            writeln!(writer, "{event}")?;
        }
        writer.flush()?;
        Ok(Some(path))
    }
}

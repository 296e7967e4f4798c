//! Raw frame recorder.
//!
//! Each inbound frame is written as it arrived, one per line, so a recording
//! can be fed straight back through [`ReplayRunner`](crate::testing::ReplayRunner).

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::debug;

#[derive(Debug)]
pub struct SessionRecorder<W: Write> {
    writer: W,
    frames: usize,
}

impl SessionRecorder<BufWriter<File>> {
    /// Opens `path` for appending, creating parent directories.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!(path = %path.display(), "recording frames");
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> SessionRecorder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, frames: 0 }
    }

    /// Appends one frame and flushes.
    pub fn record(&mut self, frame: &str) -> io::Result<()> {
        let line = frame.trim().replace(['\r', '\n'], " ");
        if line.is_empty() {
            return Ok(());
        }
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

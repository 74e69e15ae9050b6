use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{error, trace};

use crate::message::LogMessage;
use crate::Result;

/// Prints each message as a line on stdout. Takes the text form.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    lines: u64,
}

impl ConsoleSink {
    pub fn new() -> Self {
        ConsoleSink::default()
    }

    pub fn print(&mut self, line: String) {
        println!("{}", line);
        self.lines += 1;
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }
}

/// Appends messages to a file, one line each.
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(FileSink {
            path,
            writer: BufWriter::new(file),
            bytes_written: 0,
        })
    }

    pub fn receive(&mut self, message: LogMessage) {
        let line = format!("{}\n", message);

        match self.writer.write_all(line.as_bytes()) {
            Ok(()) => self.bytes_written += line.len() as u64,
            Err(err) => error!(path = %self.path.display(), %err, "failed to write log line"),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Err(err) = self.writer.flush() {
            error!(path = %self.path.display(), %err, "failed to flush log file");
        }
        trace!(path = %self.path.display(), bytes = self.bytes_written, "file sink closed");
    }
}

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

pub const LOG_FILE_NAME: &str = "log.txt";

/// Appends every complete log line to `log.txt` while echoing to stdout.
#[derive(Clone)]
pub struct LogSink {
    file: Option<Arc<Mutex<File>>>,
    path: PathBuf,
    write_failed: Arc<AtomicBool>,
}

impl LogSink {
    /// Opens `<dir>/log.txt` for appending. If that fails the sink is stdout-only.
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(LOG_FILE_NAME);
        let file = fs::create_dir_all(dir)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(&path))
            .map(|file| Arc::new(Mutex::new(file)));
        match file {
            Ok(file) => Self::with_file(Some(file), path),
            Err(err) => {
                eprintln!("log file {} unavailable, logging to stdout only: {err}", path.display());
                Self::with_file(None, path)
            }
        }
    }

    fn with_file(file: Option<Arc<Mutex<File>>>, path: PathBuf) -> Self {
        Self {
            file,
            path,
            write_failed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|_| self.path.as_path())
    }

    pub fn writer(&self) -> LogWriterFactory {
        LogWriterFactory { sink: self.clone() }
    }

    fn append_line(&self, line: &[u8]) {
        let Some(file) = &self.file else {
            return;
        };
        let Ok(mut file) = file.lock() else {
            return;
        };
        if let Err(err) = file.write_all(line) {
            self.report_write_failure(&err);
        }
    }

    /// Stdout still carries the line; only the first failure is reported.
    fn report_write_failure(&self, err: &io::Error) -> bool {
        if self.write_failed.swap(true, Ordering::Relaxed) {
            return false;
        }
        eprintln!(
            "log file {} write failed, continuing on stdout only: {err}",
            self.path.display()
        );
        true
    }
}

pub struct LogWriterFactory {
    sink: LogSink,
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            sink: self.sink.clone(),
            buffer: Vec::new(),
        }
    }
}

pub struct LogWriter {
    sink: LogSink,
    buffer: Vec<u8>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if !line.iter().all(u8::is_ascii_whitespace) {
                self.sink.append_line(&line);
            }
        }

        io::stdout().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        // a trailing partial line still belongs in the file
        if !self.buffer.is_empty() {
            let mut line = std::mem::take(&mut self.buffer);
            line.push(b'\n');
            self.sink.append_line(&line);
        }
    }
}

use std::{
    env, fs,
    fs::File,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU32, Ordering},
};

use snafu::{ResultExt, Snafu};

use crate::{
    clock,
    internal_events::{FileRolled, InternalEvent},
};

/// Environment variable that overrides the log directory, taking precedence
/// over any directory the caller configured.
pub const LOG_DIR_ENV: &str = "CAELAN_LOG_DIR";

// Disambiguates files created within the same millisecond. Process-wide so
// that a restarted engine keeps rolling forward instead of reusing names.
static FILE_SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Error that occurred inside [`FileSink`].
#[derive(Debug, Snafu)]
pub enum SinkError {
    #[snafu(display("failed to create log directory '{}': {}", path.display(), source))]
    CreateDir { path: PathBuf, source: io::Error },

    #[snafu(display("failed to open log file '{}': {}", path.display(), source))]
    OpenFile { path: PathBuf, source: io::Error },

    #[snafu(display("write to log file failed: {}", source))]
    WriteFailed { source: io::Error },
}

/// Append-only file sink with size-triggered rolling.
///
/// The sink is owned by the writer thread and is never locked: buffering
/// happens one layer up in the exchanged buffers, so writes here go straight
/// to the OS.
#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
    prefix: String,
    max_file_size: u64,
    file: Option<File>,
    written: u64,
}

impl FileSink {
    /// Creates a sink writing into the resolved log directory.
    ///
    /// The directory is the first non-empty candidate of: the `CAELAN_LOG_DIR`
    /// environment variable, `requested_dir` (unless it is the trivial
    /// `./log` default), `$XDG_STATE_HOME/caelanlogger/logs`,
    /// `$HOME/.local/state/caelanlogger/logs`, and finally `./log` itself.
    /// The result is made absolute and created along with any missing
    /// parents.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::CreateDir`] if the resolved directory cannot be
    /// created.
    pub fn new<P: AsRef<Path>>(
        requested_dir: P,
        prefix: &str,
        max_file_size: u64,
    ) -> Result<Self, SinkError> {
        let dir = make_absolute(resolve_log_dir(requested_dir.as_ref()));
        fs::create_dir_all(&dir).context(CreateDirSnafu { path: dir.clone() })?;

        debug!(message = "Opened log directory.", directory = %dir.display());

        Ok(Self {
            dir,
            prefix: prefix.to_owned(),
            max_file_size,
            file: None,
            written: 0,
        })
    }

    /// Appends `data` to the current log file, opening or rolling files as
    /// needed.
    ///
    /// Interrupted writes are retried until every byte is persisted.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] if a file cannot be opened or a write fails
    /// with anything other than an interrupt.
    pub fn append(&mut self, data: &[u8]) -> Result<(), SinkError> {
        if self.file.is_none() {
            self.open_next()?;
        }
        if self.should_roll(data.len()) {
            self.roll()?;
        }

        let Some(file) = self.file.as_mut() else {
            // open_next above either succeeded or already returned its error
            return Ok(());
        };

        let mut written = 0;
        while written < data.len() {
            match file.write(&data[written..]) {
                Ok(0) => {
                    return Err(SinkError::WriteFailed {
                        source: io::Error::new(ErrorKind::WriteZero, "file refused more bytes"),
                    })
                }
                Ok(count) => {
                    written += count;
                    self.written += to_u64(count);
                }
                Err(error) if error.kind() == ErrorKind::Interrupted => {}
                Err(source) => return Err(SinkError::WriteFailed { source }),
            }
        }

        Ok(())
    }

    /// Bytes written to the current file since the last roll.
    pub fn written_bytes(&self) -> u64 {
        self.written
    }

    fn should_roll(&self, incoming: usize) -> bool {
        self.written + to_u64(incoming) > self.max_file_size
    }

    fn roll(&mut self) -> Result<(), SinkError> {
        self.file = None;
        self.open_next()?;

        FileRolled {
            written: self.written,
        }
        .emit();
        self.written = 0;

        Ok(())
    }

    fn open_next(&mut self) -> Result<(), SinkError> {
        // The directory may have been removed out from under a long-running
        // process; recreate it rather than failing the roll.
        fs::create_dir_all(&self.dir).context(CreateDirSnafu {
            path: self.dir.clone(),
        })?;

        let path = self.dir.join(self.next_file_name());
        let file = File::options()
            .append(true)
            .create(true)
            .open(&path)
            .context(OpenFileSnafu { path: path.clone() })?;

        debug!(message = "Opened log file.", path = %path.display());
        self.file = Some(file);

        Ok(())
    }

    fn next_file_name(&self) -> String {
        let sequence = (FILE_SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1) % 10_000;
        format!("{}_{}_{sequence}", clock::now_string(), self.prefix)
    }
}

fn to_u64(amount: usize) -> u64 {
    u64::try_from(amount).expect("sizes fit into u64")
}

fn resolve_log_dir(requested: &Path) -> PathBuf {
    if let Some(dir) = env_dir(LOG_DIR_ENV) {
        return dir;
    }

    let trivial = requested.as_os_str().is_empty()
        || requested == Path::new("./log")
        || requested == Path::new("log");
    if !trivial {
        return requested.to_path_buf();
    }

    if let Some(xdg) = env_dir("XDG_STATE_HOME") {
        return xdg.join("caelanlogger").join("logs");
    }
    if let Some(home) = env_dir("HOME") {
        return home.join(".local").join("state").join("caelanlogger").join("logs");
    }

    PathBuf::from("log")
}

fn env_dir(name: &str) -> Option<PathBuf> {
    env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn make_absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }

    match env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

use std::path::{Path, PathBuf};

use snafu::Snafu;

/// Buffer size used when the caller never configures one, in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 2028;

/// Capacity of the pending and free queues. Sized so that sustained bursts
/// keep exchanging buffers for minutes before the drop policy engages.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default cap on a single log file before the sink rolls to the next one.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Default middle component of generated log file names.
pub const DEFAULT_FILE_PREFIX: &str = "LOG";

/// Default requested log directory. This is a trivial default: directory
/// resolution treats it as "nothing requested" and falls through to the
/// environment and the per-user state directory.
pub const DEFAULT_DATA_DIR: &str = "./log";

/// Upper bound on a single record, from level tag through trailing newline.
///
/// A record front-end refuses to open a record in a buffer with less than
/// this much free space, which is what keeps every record inside a single
/// buffer. Payloads are expected to stay under this bound minus the record
/// prefix.
pub const MAX_RECORD_BYTES: usize = 1028;

#[derive(Debug, Snafu)]
pub enum BuildError {
    #[snafu(display("parameter '{}' was invalid: {}", param_name, reason))]
    InvalidParameter {
        param_name: &'static str,
        reason: String,
    },
}

/// Configuration for a logging engine instance.
#[derive(Clone, Debug)]
pub struct LoggerConfig {
    pub(crate) buffer_size: usize,
    pub(crate) queue_capacity: usize,
    pub(crate) data_dir: PathBuf,
    pub(crate) file_prefix: String,
    pub(crate) max_file_size: u64,
}

impl LoggerConfig {
    /// A configuration with the given buffer size and every other field at
    /// its default.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            file_prefix: DEFAULT_FILE_PREFIX.to_owned(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    pub fn builder() -> LoggerConfigBuilder {
        LoggerConfigBuilder::default()
    }

    /// Size of each exchanged buffer, in bytes.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Capacity of the pending and free queues.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// The requested log directory, before resolution against the
    /// environment.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Builder for [`LoggerConfig`].
#[derive(Clone, Debug, Default)]
pub struct LoggerConfigBuilder {
    buffer_size: Option<usize>,
    queue_capacity: Option<usize>,
    data_dir: Option<PathBuf>,
    file_prefix: Option<String>,
    max_file_size: Option<u64>,
}

impl LoggerConfigBuilder {
    /// Sets the size, in bytes, of each exchanged buffer.
    ///
    /// Buffers smaller than [`MAX_RECORD_BYTES`] still work, but force a
    /// handoff attempt on every record.
    ///
    /// Defaults to 2028 bytes.
    pub fn buffer_size(mut self, amount: usize) -> Self {
        self.buffer_size = Some(amount);
        self
    }

    /// Sets the capacity of the pending and free queues.
    ///
    /// The free queue is pre-populated with this many buffers, so the
    /// engine's resident memory is roughly `queue_capacity * buffer_size`.
    ///
    /// Defaults to 10 000.
    pub fn queue_capacity(mut self, amount: usize) -> Self {
        self.queue_capacity = Some(amount);
        self
    }

    /// Sets the requested log directory.
    ///
    /// The `CAELAN_LOG_DIR` environment variable still takes precedence at
    /// sink construction; see the sink's directory resolution rules.
    pub fn data_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.data_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Sets the middle component of generated log file names.
    ///
    /// Defaults to `LOG`, producing names like
    /// `2026-08-01 10:15:42.123_LOG_17`.
    pub fn file_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.file_prefix = Some(prefix.into());
        self
    }

    /// Sets the size, in bytes, at which the sink rolls to a new file.
    ///
    /// Defaults to 256 MiB.
    pub fn max_file_size(mut self, amount: u64) -> Self {
        self.max_file_size = Some(amount);
        self
    }

    /// Consumes this builder and constructs a [`LoggerConfig`].
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] if any parameter is out of range.
    pub fn build(self) -> Result<LoggerConfig, BuildError> {
        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let queue_capacity = self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
        let data_dir = self
            .data_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let file_prefix = self
            .file_prefix
            .unwrap_or_else(|| DEFAULT_FILE_PREFIX.to_owned());
        let max_file_size = self.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE);

        if buffer_size == 0 {
            return Err(BuildError::InvalidParameter {
                param_name: "buffer_size",
                reason: "cannot be zero".to_string(),
            });
        }

        if queue_capacity == 0 {
            return Err(BuildError::InvalidParameter {
                param_name: "queue_capacity",
                reason: "cannot be zero".to_string(),
            });
        }

        if max_file_size == 0 {
            return Err(BuildError::InvalidParameter {
                param_name: "max_file_size",
                reason: "cannot be zero".to_string(),
            });
        }

        Ok(LoggerConfig {
            buffer_size,
            queue_capacity,
            data_dir,
            file_prefix,
            max_file_size,
        })
    }
}

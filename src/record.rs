use std::{fmt, ops::DerefMut};

use crate::{encoding::Encode, producer::Producer};

/// Severity of a log record, rendered as the record's leading tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Info,
    Debug,
    Warning,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    /// The tag as it appears at the head of a record, including the
    /// separating space.
    pub(crate) fn tag(self) -> &'static str {
        match self {
            Self::Info => "INFO ",
            Self::Debug => "DEBUG ",
            Self::Warning => "WARNING ",
            Self::Error => "ERROR ",
            Self::Fatal => "FATAL ",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scoped, single-record builder.
///
/// Construction reserves room for a maximum-size record (handing the buffer
/// off if it is too full), then writes the `LEVEL timestamp ` prefix.
/// Payload values are chained through [`append`](Self::append), and dropping
/// the builder terminates the record with a newline.
///
/// The builder is generic over how it reaches the producer, so the same type
/// serves a borrowed producer and the thread-local slot behind the global
/// `log` entry point.
pub struct LineBuilder<P: DerefMut<Target = Producer>> {
    producer: P,
    active: bool,
}

impl<P: DerefMut<Target = Producer>> LineBuilder<P> {
    pub(crate) fn new(mut producer: P, level: Level) -> Self {
        let active = producer.open_record(level);
        Self { producer, active }
    }

    /// Appends a payload value in its ASCII form.
    ///
    /// A value that no longer fits is dropped; the record never triggers a
    /// buffer handoff mid-line.
    pub fn append<V: Encode>(&mut self, value: V) -> &mut Self {
        if self.active {
            self.producer.push(value);
        }
        self
    }
}

impl<P: DerefMut<Target = Producer>> Drop for LineBuilder<P> {
    fn drop(&mut self) {
        if self.active {
            self.producer.close_record();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        clock::TIMESTAMP_LEN,
        common::{LoggerConfig, MAX_RECORD_BYTES},
        writer::BackendWriter,
        Level,
    };

    fn test_writer(buffer_size: usize, queue_capacity: usize) -> BackendWriter {
        let config = LoggerConfig::builder()
            .buffer_size(buffer_size)
            .queue_capacity(queue_capacity)
            .data_dir("/nonexistent/never-started")
            .build()
            .expect("test config is valid");
        BackendWriter::new(config)
    }

    #[test]
    fn record_has_tag_timestamp_payload_and_newline() {
        let writer = test_writer(4096, 4);
        let mut producer = writer.producer();

        producer
            .record(Level::Info)
            .append("answer=")
            .append(42_i32);

        let data = producer.current().expect("producer holds a buffer").data();
        let text = std::str::from_utf8(data).expect("records are ASCII");

        let prefix_len = "INFO ".len() + TIMESTAMP_LEN + 1;
        assert!(text.starts_with("INFO "));
        assert_eq!(&text[prefix_len..], "answer=42\n");
        assert_eq!(text.as_bytes()[prefix_len - 1], b' ');
    }

    #[test]
    fn levels_render_their_own_tags() {
        let writer = test_writer(4096, 4);
        let mut producer = writer.producer();

        producer.record(Level::Warning).append("w");
        producer.record(Level::Fatal).append("f");

        let text = std::str::from_utf8(producer.current().expect("buffer").data())
            .expect("records are ASCII");
        let mut lines = text.lines();
        assert!(lines.next().expect("first record").starts_with("WARNING "));
        assert!(lines.next().expect("second record").starts_with("FATAL "));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn chained_values_encode_in_order() {
        let writer = test_writer(4096, 4);
        let mut producer = writer.producer();

        producer
            .record(Level::Debug)
            .append(1_u8)
            .append(' ')
            .append(true)
            .append(' ')
            .append(2.5_f64)
            .append(' ')
            .append(String::from("done"));

        let text = std::str::from_utf8(producer.current().expect("buffer").data())
            .expect("records are ASCII");
        assert!(text.ends_with("1 true 2.5 done\n"));
    }

    #[test]
    fn near_full_buffer_forces_a_handoff_at_open() {
        let writer = test_writer(MAX_RECORD_BYTES * 2, 4);
        let mut producer = writer.producer();

        // Fill until less than a full record's headroom remains.
        while producer.current().expect("buffer").remaining() >= MAX_RECORD_BYTES {
            producer.record(Level::Info).append([b'x'; 64].as_slice());
        }

        let before = writer.pending_len();
        producer.record(Level::Info).append("fresh buffer");
        assert_eq!(writer.pending_len(), before + 1);

        let text = std::str::from_utf8(producer.current().expect("buffer").data())
            .expect("records are ASCII");
        assert!(text.ends_with("fresh buffer\n"));
        assert!(text.starts_with("INFO "), "new buffer starts a fresh record");
    }

    #[test]
    fn oversized_payload_truncates_but_keeps_line_shape() {
        let writer = test_writer(MAX_RECORD_BYTES * 2, 4);
        let mut producer = writer.producer();

        let oversized = "y".repeat(MAX_RECORD_BYTES * 2);
        producer
            .record(Level::Info)
            .append(oversized.as_str())
            .append("tail");

        let data = producer.current().expect("buffer").data();
        // The oversized value was refused in full; later appends that do fit
        // still land, and the record still closed with its newline.
        let text = std::str::from_utf8(data).expect("records are ASCII");
        assert!(text.ends_with(" tail\n"));
        assert!(!text.contains('y'));
    }
}

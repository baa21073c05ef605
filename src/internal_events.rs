use metrics::counter;

/// An event emitted from inside the engine, surfaced as a trace event and a
/// metric update.
pub(crate) trait InternalEvent {
    fn emit(self);
}

fn as_count(amount: usize) -> u64 {
    u64::try_from(amount).expect("counts fit into u64")
}

/// A full buffer was accepted onto the pending queue.
pub(crate) struct BufferSubmitted {
    pub byte_size: usize,
}

impl InternalEvent for BufferSubmitted {
    fn emit(self) {
        counter!("logger_buffers_submitted_total").increment(1);
        counter!("logger_submitted_bytes_total").increment(as_count(self.byte_size));
    }
}

/// A submission was shed because the pending queue was at capacity; the
/// buffer's records are gone.
pub(crate) struct BufferSubmissionDiscarded {
    pub byte_size: usize,
}

impl InternalEvent for BufferSubmissionDiscarded {
    fn emit(self) {
        debug!(
            message = "Discarded buffer submission; pending queue at capacity.",
            byte_size = self.byte_size,
        );
        counter!("logger_buffers_discarded_total").increment(1);
        counter!("logger_discarded_bytes_total").increment(as_count(self.byte_size));
    }
}

/// A producer handed its buffer over but the free queue had nothing to give
/// back; the producer is inert until a later handoff recovers a buffer.
pub(crate) struct ProducerStarved;

impl InternalEvent for ProducerStarved {
    fn emit(self) {
        debug!(message = "Producer starved; free queue is empty.");
        counter!("logger_producers_starved_total").increment(1);
    }
}

/// The writer thread persisted a batch of pending buffers.
pub(crate) struct BuffersFlushed {
    pub count: usize,
    pub byte_size: u64,
}

impl InternalEvent for BuffersFlushed {
    fn emit(self) {
        trace!(
            message = "Flushed pending buffers.",
            count = self.count,
            byte_size = self.byte_size,
        );
        counter!("logger_buffers_flushed_total").increment(as_count(self.count));
        counter!("logger_flushed_bytes_total").increment(self.byte_size);
    }
}

/// The sink closed a file at the size cap and opened the next one.
pub(crate) struct FileRolled {
    pub written: u64,
}

impl InternalEvent for FileRolled {
    fn emit(self) {
        debug!(message = "Rolled log file.", written = self.written);
        counter!("logger_files_rolled_total").increment(1);
    }
}

/// The writer thread hit an unrecoverable sink error; the logging subsystem
/// is down until a restart.
pub(crate) struct WriterErrored {
    pub error: String,
}

impl InternalEvent for WriterErrored {
    fn emit(self) {
        error!(message = "Writer thread failed.", error = %self.error);
        counter!("logger_writer_errors_total").increment(1);
    }
}

use std::sync::{atomic::Ordering, Arc};

use crate::{
    buffer::Buffer,
    clock,
    common::MAX_RECORD_BYTES,
    encoding::Encode,
    record::{Level, LineBuilder},
    writer::Shared,
};

/// Per-thread producer state: the thread's current buffer and its link to
/// the backend writer.
///
/// A producer either holds a buffer (and may write) or holds none, in which
/// case records silently drop until a handoff recovers a buffer from the
/// free queue. Dropping a producer releases its buffer to the heap; the
/// writer it was attached to may already be gone, so the buffer is never
/// pushed back onto the free queue.
#[derive(Debug)]
pub struct Producer {
    backend: Arc<Shared>,
    current: Option<Box<Buffer>>,
    epoch: u64,
}

impl Producer {
    pub(crate) fn attach(backend: Arc<Shared>) -> Self {
        let epoch = backend.epoch.load(Ordering::Acquire);
        let buffer_size = backend.buffer_size.load(Ordering::Relaxed);

        Self {
            backend,
            current: Some(Box::new(Buffer::new(buffer_size))),
            epoch,
        }
    }

    /// Exchanges the current buffer with the writer: the full buffer goes
    /// onto the pending queue and a fresh one comes back from the free
    /// queue.
    ///
    /// The exchange is skipped while the writer advertises an empty free
    /// queue, so a producer never stalls behind a slow writer; it keeps
    /// filling the buffer it has. A producer holding no buffer instead
    /// tries to recover one from the free queue.
    pub fn handoff(&mut self) {
        // A buffer allocated before the last restart belongs to a previous
        // queue generation and may have the wrong size; discard it.
        let epoch = self.backend.epoch.load(Ordering::Acquire);
        if epoch != self.epoch {
            self.current = None;
            self.epoch = epoch;
        }

        if !self.backend.free_available.load(Ordering::Acquire) {
            return;
        }

        if self.current.is_some() {
            self.backend.submit_and_acquire(&mut self.current);
        } else {
            self.backend.acquire(&mut self.current);
        }
    }

    /// Opens a record at the given level, returning a builder that appends
    /// the payload and closes the record with a newline when dropped.
    pub fn record(&mut self, level: Level) -> LineBuilder<&mut Producer> {
        LineBuilder::new(self, level)
    }

    /// The buffer currently being filled, if any.
    pub fn current(&self) -> Option<&Buffer> {
        self.current.as_deref()
    }

    /// Writes the record prefix, handing the buffer off first when it cannot
    /// hold a maximum-size record. Returns `false` if no buffer could be
    /// obtained; the record is then dropped.
    pub(crate) fn open_record(&mut self, level: Level) -> bool {
        let needs_handoff = match &self.current {
            Some(buffer) => {
                buffer.remaining() < MAX_RECORD_BYTES
                    || self.epoch != self.backend.epoch.load(Ordering::Acquire)
            }
            None => true,
        };
        if needs_handoff {
            self.handoff();
        }

        let Some(buffer) = self.current.as_mut() else {
            return false;
        };

        let mut ok = buffer.append(level.tag().as_bytes());
        ok &= clock::append_timestamp(buffer);
        ok & buffer.append_byte(b' ')
    }

    pub(crate) fn push<V: Encode>(&mut self, value: V) {
        if let Some(buffer) = self.current.as_mut() {
            // A refused append leaves the buffer untouched; the remainder of
            // the record is dropped rather than handed off mid-record.
            let _ = value.encode(buffer);
        }
    }

    pub(crate) fn close_record(&mut self) {
        if let Some(buffer) = self.current.as_mut() {
            let _ = buffer.append_byte(b'\n');
        }
    }
}

//! An asynchronous multi-producer, single-consumer logging engine.
//!
//! Producer threads format records into fixed-size byte buffers at
//! near-memory speed; a single background writer thread exchanges full
//! buffers for empty ones through a pair of bounded ring queues and persists
//! them to size-rolled log files. Memory is bounded, producers never block
//! on I/O, and when the writer falls behind the engine sheds load instead of
//! stalling its callers.
//!
//! Records follow a fixed line grammar: a level tag, a millisecond
//! timestamp, the caller's payload bytes, and a terminating newline. Each
//! record lives entirely inside one buffer, so lines never interleave in the
//! output files; ordering is FIFO per producer thread, with cross-thread
//! interleaving at buffer granularity.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

#[macro_use]
extern crate tracing;

mod buffer;
mod clock;
pub mod common;
mod encoding;
mod internal_events;
mod producer;
mod record;
mod ring;
mod sink;
mod spinlock;
mod writer;

use std::{
    cell::RefCell,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicUsize, Ordering},
};

use once_cell::sync::Lazy;

pub use self::{
    buffer::Buffer,
    common::{BuildError, LoggerConfig, LoggerConfigBuilder},
    encoding::Encode,
    producer::Producer,
    record::{Level, LineBuilder},
    sink::{FileSink, SinkError, LOG_DIR_ENV},
    writer::BackendWriter,
};

static CONFIGURED_BUFFER_SIZE: AtomicUsize = AtomicUsize::new(common::DEFAULT_BUFFER_SIZE);

// The process-wide engine. First access builds the writer with the buffer
// size configured at that moment and starts its thread.
static ROOT: Lazy<BackendWriter> = Lazy::new(|| {
    let config = LoggerConfig::with_buffer_size(CONFIGURED_BUFFER_SIZE.load(Ordering::Relaxed));
    let writer = BackendWriter::new(config);
    writer.start();
    writer
});

thread_local! {
    static PRODUCER: RefCell<Option<Producer>> = const { RefCell::new(None) };
}

/// Sets the buffer size used when the process-wide engine is first touched.
///
/// Has no effect once the engine is running; use [`restart`] to change the
/// buffer size afterwards.
pub fn init(buffer_size: usize) {
    CONFIGURED_BUFFER_SIZE.store(buffer_size, Ordering::Relaxed);
}

/// Opens a record at the given level on the calling thread's producer.
///
/// The returned builder appends payload values and closes the record with a
/// newline when it goes out of scope:
///
/// ```no_run
/// use caelan_logger::Level;
///
/// caelan_logger::log(Level::Info).append("answer=").append(42);
/// ```
pub fn log(level: Level) -> LineBuilder<ThreadProducer> {
    LineBuilder::new(ThreadProducer::take(), level)
}

/// The calling thread's producer, creating it on first use.
///
/// The handle gives direct access to [`Producer`], most usefully
/// [`Producer::handoff`] to force-submit the current buffer before a
/// [`shutdown`].
pub fn producer() -> ThreadProducer {
    ThreadProducer::take()
}

/// Stops the process-wide writer, draining everything already submitted.
///
/// Buffers still held by producer threads are not submitted automatically;
/// call [`producer`]`().handoff()` on each logging thread first. A stopped
/// engine stays inert until [`restart`].
pub fn shutdown() {
    if let Some(writer) = Lazy::get(&ROOT) {
        writer.stop();
    }
}

/// Restarts the process-wide writer with a new buffer size.
///
/// Records still sitting in producer-held buffers at this point are lost;
/// restart trades them away for a clean buffer generation.
pub fn restart(buffer_size: usize) {
    init(buffer_size);
    ROOT.restart(buffer_size);
}

/// Owning handle to the calling thread's [`Producer`].
///
/// Taken out of the thread-local slot while in use and put back when
/// dropped, so a record builder can own it without borrowing from the
/// thread-local storage.
pub struct ThreadProducer {
    inner: Option<Producer>,
}

impl ThreadProducer {
    fn take() -> Self {
        let producer = PRODUCER
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| ROOT.producer());

        Self {
            inner: Some(producer),
        }
    }
}

impl Deref for ThreadProducer {
    type Target = Producer;

    fn deref(&self) -> &Producer {
        self.inner.as_ref().expect("producer is present until drop")
    }
}

impl DerefMut for ThreadProducer {
    fn deref_mut(&mut self) -> &mut Producer {
        self.inner.as_mut().expect("producer is present until drop")
    }
}

impl Drop for ThreadProducer {
    fn drop(&mut self) {
        if let Some(producer) = self.inner.take() {
            // If the thread is already tearing down its locals, let the
            // producer drop here; its buffer is released to the heap.
            let _ = PRODUCER.try_with(|slot| *slot.borrow_mut() = Some(producer));
        }
    }
}

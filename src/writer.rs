use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    buffer::Buffer,
    common::LoggerConfig,
    internal_events::{
        BufferSubmissionDiscarded, BufferSubmitted, BuffersFlushed, InternalEvent, ProducerStarved,
        WriterErrored,
    },
    producer::Producer,
    ring::Ring,
    sink::{FileSink, SinkError},
    spinlock::SpinLock,
};

// How long the writer thread sleeps when a drain pass finds nothing pending.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct Queues {
    pending: Ring<Box<Buffer>>,
    free: Ring<Box<Buffer>>,
}

/// State shared between producers and the writer thread.
///
/// Both queues live under one spinlock; the lock is only ever held for index
/// arithmetic, never across I/O. `free_available` is an advisory hint that
/// lets producers skip the lock entirely when the writer is known to be
/// behind; correctness never depends on it.
#[derive(Debug)]
pub(crate) struct Shared {
    queues: SpinLock<Queues>,
    pub(crate) free_available: AtomicBool,
    pub(crate) running: AtomicBool,
    pub(crate) epoch: AtomicU64,
    pub(crate) buffer_size: AtomicUsize,
}

impl Shared {
    /// The producer-side exchange: pushes `slot`'s full buffer onto the
    /// pending queue and pops a fresh buffer from the free queue into
    /// `slot`.
    ///
    /// When the pending queue is full the submission is shed instead: the
    /// buffer is reset and handed straight back to the producer. When the
    /// free queue is empty the producer leaves with no buffer at all and
    /// the `free_available` hint is cleared.
    pub(crate) fn submit_and_acquire(&self, slot: &mut Option<Box<Buffer>>) {
        let Some(full) = slot.take() else {
            return;
        };
        let byte_size = full.len();

        let mut discarded = false;
        let mut starved = false;
        {
            let mut queues = self.queues.lock();
            match queues.pending.push(full) {
                Ok(()) => match queues.free.pop() {
                    Some(fresh) => *slot = Some(fresh),
                    None => {
                        self.free_available.store(false, Ordering::Release);
                        starved = true;
                    }
                },
                Err(mut rejected) => {
                    // Writer cannot keep up; dropping the newest records is
                    // preferable to blocking the producer.
                    rejected.reset();
                    *slot = Some(rejected);
                    discarded = true;
                }
            }
        }

        if discarded {
            BufferSubmissionDiscarded { byte_size }.emit();
        } else {
            BufferSubmitted { byte_size }.emit();
            if starved {
                ProducerStarved.emit();
            }
        }
    }

    /// Recovery path for a producer that holds no buffer: pop one from the
    /// free queue, if there is one.
    pub(crate) fn acquire(&self, slot: &mut Option<Box<Buffer>>) {
        let mut queues = self.queues.lock();
        *slot = queues.free.pop();
        if slot.is_none() {
            self.free_available.store(false, Ordering::Release);
        }
    }

    /// One non-blocking drain pass: snapshot everything pending, persist it
    /// outside the lock, then return the reset buffers to the free queue.
    ///
    /// Returns `Ok(false)` when there was nothing to drain.
    fn drain_once(
        &self,
        sink: &mut FileSink,
        scratch: &mut Vec<Box<Buffer>>,
    ) -> Result<bool, SinkError> {
        {
            let mut queues = self.queues.lock();
            if queues.pending.is_empty() {
                return Ok(false);
            }
            queues.pending.drain_into(scratch);
        }

        let mut byte_size = 0_u64;
        for buffer in scratch.iter_mut() {
            sink.append(buffer.data())?;
            byte_size += u64::try_from(buffer.len()).expect("buffer sizes fit into u64");
            buffer.reset();
        }
        let count = scratch.len();

        {
            let mut queues = self.queues.lock();
            for buffer in scratch.drain(..) {
                // A buffer that no longer fits is surplus population (its
                // producer exited after losing a buffer to starvation) and
                // is released to the heap.
                let _ = queues.free.push(buffer);
            }
            self.free_available.store(true, Ordering::Release);
        }

        BuffersFlushed { count, byte_size }.emit();
        Ok(true)
    }

    fn pending_len(&self) -> usize {
        self.queues.lock().pending.len()
    }

    fn free_len(&self) -> usize {
        self.queues.lock().free.len()
    }
}

/// The backend writer: owner of the buffer exchange and of the single thread
/// that persists pending buffers to the file sink.
#[derive(Debug)]
pub struct BackendWriter {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    config: LoggerConfig,
}

impl BackendWriter {
    /// Creates a writer with its free queue pre-populated with
    /// `queue_capacity` buffers of `buffer_size` bytes. No thread is spawned
    /// until [`start`](Self::start).
    pub fn new(config: LoggerConfig) -> Self {
        let free = filled_ring(config.queue_capacity, config.buffer_size);

        let shared = Shared {
            queues: SpinLock::new(Queues {
                pending: Ring::with_capacity(config.queue_capacity),
                free,
            }),
            free_available: AtomicBool::new(true),
            running: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            buffer_size: AtomicUsize::new(config.buffer_size),
        };

        Self {
            shared: Arc::new(shared),
            handle: Mutex::new(None),
            config,
        }
    }

    /// Spawns the writer thread.
    ///
    /// # Panics
    ///
    /// Panics if the writer thread is already running; starting twice is a
    /// programming error, not a recoverable condition.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        assert!(
            handle.is_none(),
            "writer thread already running; stop() must come before a second start()"
        );

        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        *handle = Some(
            thread::Builder::new()
                .name("log-writer".to_owned())
                .spawn(move || run(&shared, &config))
                .expect("failed to spawn the writer thread"),
        );

        debug!(message = "Writer thread started.");
    }

    /// Stops the writer thread and waits for it to finish.
    ///
    /// Joining guarantees the final drain has completed: every buffer that
    /// was on the pending queue when `stop` was called is persisted before
    /// this returns. Stopping an already-stopped writer is a no-op.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(message = "Writer thread panicked during shutdown.");
            }
            debug!(message = "Writer thread stopped.");
        }
    }

    /// Stops the writer, rebuilds both queues with buffers of
    /// `buffer_size` bytes, and starts a fresh thread (and with it a fresh
    /// sink).
    ///
    /// Buffers still held by producers at this point belong to the previous
    /// generation; each producer discards its stale buffer at its next
    /// handoff, losing whatever records it held.
    pub fn restart(&self, buffer_size: usize) {
        self.stop();

        {
            let mut queues = self.shared.queues.lock();
            queues.pending = Ring::with_capacity(self.config.queue_capacity);
            queues.free = filled_ring(self.config.queue_capacity, buffer_size);
        }
        self.shared.buffer_size.store(buffer_size, Ordering::Relaxed);
        self.shared.free_available.store(true, Ordering::Release);
        // Publish the new generation only after the queues are rebuilt.
        self.shared.epoch.fetch_add(1, Ordering::Release);

        self.start();

        info!(message = "Writer restarted.", buffer_size);
    }

    /// Creates a producer attached to this writer. Each producer allocates
    /// its own initial buffer; the free queue is only drawn from at
    /// handoff.
    pub fn producer(&self) -> Producer {
        Producer::attach(Arc::clone(&self.shared))
    }

    /// Whether the writer thread is running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Number of buffers currently awaiting persistence. Diagnostic only.
    pub fn pending_len(&self) -> usize {
        self.shared.pending_len()
    }

    /// Number of buffers currently available to producers. Diagnostic only.
    pub fn free_len(&self) -> usize {
        self.shared.free_len()
    }
}

impl Drop for BackendWriter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn filled_ring(capacity: usize, buffer_size: usize) -> Ring<Box<Buffer>> {
    let mut ring = Ring::with_capacity(capacity);
    while ring.len() < ring.capacity() {
        let _ = ring.push(Box::new(Buffer::new(buffer_size)));
    }
    ring
}

/// The writer thread body: drain while running, then drain to empty.
fn run(shared: &Shared, config: &LoggerConfig) {
    let mut sink = match FileSink::new(&config.data_dir, &config.file_prefix, config.max_file_size)
    {
        Ok(sink) => sink,
        Err(error) => {
            WriterErrored {
                error: error.to_string(),
            }
            .emit();
            return;
        }
    };

    let mut scratch = Vec::with_capacity(config.queue_capacity);

    while shared.running.load(Ordering::Acquire) {
        match shared.drain_once(&mut sink, &mut scratch) {
            Ok(true) => {}
            Ok(false) => thread::sleep(IDLE_SLEEP),
            Err(error) => {
                WriterErrored {
                    error: error.to_string(),
                }
                .emit();
                return;
            }
        }
    }

    // Final drain: everything submitted before `stop` must reach the sink.
    loop {
        match shared.drain_once(&mut sink, &mut scratch) {
            Ok(true) => {}
            Ok(false) => break,
            Err(error) => {
                WriterErrored {
                    error: error.to_string(),
                }
                .emit();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use temp_dir::TempDir;

    use super::BackendWriter;
    use crate::{common::LoggerConfig, Level};

    fn test_writer(dir: &std::path::Path, buffer_size: usize, queue_capacity: usize) -> BackendWriter {
        let config = LoggerConfig::builder()
            .buffer_size(buffer_size)
            .queue_capacity(queue_capacity)
            .data_dir(dir)
            .build()
            .expect("test config is valid");
        BackendWriter::new(config)
    }

    fn log_dir_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(dir)
            .expect("log dir is readable")
            .map(|entry| entry.expect("dir entry is readable").path())
            .collect()
    }

    fn read_log_dir(dir: &std::path::Path) -> String {
        let mut text = String::new();
        for path in log_dir_files(dir) {
            text.push_str(&String::from_utf8(std::fs::read(&path).expect("file readable")).expect("ascii"));
        }
        text
    }

    #[test]
    fn submit_exchanges_full_buffer_for_fresh_one() {
        let dir = TempDir::new().expect("temp dir");
        let writer = test_writer(dir.path(), 4096, 4);
        let mut producer = writer.producer();

        producer.record(Level::Info).append("first");
        let filled = producer.current().expect("buffer").len();
        assert!(filled > 0);

        producer.handoff();

        assert_eq!(writer.pending_len(), 1);
        assert_eq!(writer.free_len(), 3);
        assert!(producer.current().expect("fresh buffer").is_empty());
    }

    #[test]
    fn pending_full_sheds_newest_submission() {
        let dir = TempDir::new().expect("temp dir");
        let writer = test_writer(dir.path(), 1024, 2);
        let mut producer = writer.producer();

        for _ in 0..2 {
            producer.record(Level::Info).append("kept");
            producer.handoff();
        }
        assert_eq!(writer.pending_len(), 2);

        producer.record(Level::Info).append("shed");
        producer.handoff();

        // The submission was dropped: same buffer, reset, pending unchanged.
        assert_eq!(writer.pending_len(), 2);
        assert!(producer.current().expect("buffer retained").is_empty());
    }

    #[test]
    fn free_exhaustion_starves_then_recovers() {
        let dir = TempDir::new().expect("temp dir");
        let writer = test_writer(dir.path(), 1024, 3);

        // Pull two buffers straight off the free queue, standing in for
        // producers that acquired a buffer and then exited with it.
        let mut stolen_one = None;
        let mut stolen_two = None;
        writer.shared.acquire(&mut stolen_one);
        writer.shared.acquire(&mut stolen_two);
        assert!(stolen_one.is_some() && stolen_two.is_some());
        assert_eq!(writer.free_len(), 1);

        let mut producer = writer.producer();
        producer.record(Level::Info).append("kept");
        producer.handoff();
        assert!(producer.current().is_some());

        // This submission is accepted but there is nothing to hand back.
        producer.record(Level::Info).append("also kept");
        producer.handoff();
        assert!(producer.current().is_none());
        assert_eq!(writer.pending_len(), 2);

        // While starved, records drop silently and repeat handoffs are
        // gated off by the free-available hint.
        producer.record(Level::Info).append("dropped");
        producer.handoff();
        assert!(producer.current().is_none());

        // A drain puts buffers back on the free queue; the next handoff
        // recovers one and the producer can write again.
        writer.start();
        writer.stop();
        assert_eq!(writer.pending_len(), 0);

        producer.handoff();
        assert!(producer.current().is_some());

        let text = read_log_dir(dir.path());
        assert!(text.contains("kept"));
        assert!(text.contains("also kept"));
        assert!(!text.contains("dropped"));
    }

    #[test]
    fn stop_drains_everything_pending() {
        let dir = TempDir::new().expect("temp dir");
        let writer = test_writer(dir.path(), 4096, 16);
        writer.start();

        let mut producer = writer.producer();
        for index in 0..100 {
            producer.record(Level::Info).append("line=").append(index);
        }
        producer.handoff();
        writer.stop();

        assert_eq!(writer.pending_len(), 0);
        assert!(!writer.is_running());

        let text = read_log_dir(dir.path());
        assert_eq!(text.lines().count(), 100);
        assert!(text.contains("line=99"));
    }

    #[test]
    #[should_panic(expected = "writer thread already running")]
    fn double_start_panics() {
        let dir = TempDir::new().expect("temp dir");
        let writer = test_writer(dir.path(), 1024, 2);
        writer.start();
        writer.start();
    }

    #[test]
    fn restart_swaps_buffer_generation() {
        let dir = TempDir::new().expect("temp dir");
        let writer = test_writer(dir.path(), 1024, 4);
        writer.start();

        let mut producer = writer.producer();
        producer.record(Level::Info).append("old generation");
        assert_eq!(producer.current().expect("buffer").capacity(), 1024);

        writer.restart(2048);

        // The stale buffer (and its record) is discarded at the next
        // handoff; the replacement comes from the rebuilt free queue.
        producer.handoff();
        let fresh = producer.current().expect("fresh buffer");
        assert_eq!(fresh.capacity(), 2048);
        assert!(fresh.is_empty());

        producer.record(Level::Info).append("new generation");
        producer.handoff();
        writer.stop();

        let text = read_log_dir(dir.path());
        assert!(text.contains("new generation"));
        assert!(!text.contains("old generation"));
    }

    #[test]
    fn buffer_population_is_conserved_by_the_exchange() {
        let dir = TempDir::new().expect("temp dir");
        let writer = test_writer(dir.path(), 1024, 8);
        let mut producer = writer.producer();

        for _ in 0..5 {
            producer.record(Level::Info).append("x");
            producer.handoff();
            assert_eq!(writer.pending_len() + writer.free_len(), 8);
        }
    }
}

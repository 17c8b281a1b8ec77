use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{Receiver, Sender};
use crossbeam::utils::Backoff;
use regex::Regex;

/// Counts the records terminated within one chunk.
///
/// Records are lines. The chunk is split on `\n`, and a terminated line with a
/// trailing `\r` has it stripped first, so LF and CRLF streams count the same.
/// A trailing fragment with no terminator is not counted - its terminator will
/// arrive in a later chunk. Chunks are counted independently of each other, so a
/// record whose terminator is split across a chunk boundary can be miscounted;
/// that's an accepted approximation of this design.
pub fn count_records(chunk: &[u8], filter: Option<&Regex>) -> u64 {
    let mut n = 0;
    let mut pieces = chunk.split(|&b| b == b'\n').peekable();
    while let Some(piece) = pieces.next() {
        if pieces.peek().is_none() {
            // The piece after the last terminator: empty, or an unterminated fragment
            break;
        }
        let record = match piece.last() {
            Some(&b'\r') => &piece[..piece.len() - 1],
            _ => piece,
        };
        match filter {
            Some(re) => {
                if re.is_match(&String::from_utf8_lossy(record)) {
                    n += 1;
                }
            }
            None => n += 1,
        }
    }
    n
}

/// Fans received chunks out to a small pool of counting threads, which accumulate
/// the matching-record counts of their chunks into one shared atomic counter.
///
/// The counter is the only shared mutable state in the program and is only ever
/// touched with single-word atomic operations: fetch_add from the workers, and
/// swap(0) when the clock reads and resets it. Workers may finish out of order,
/// but each increment is totally ordered by the atomic itself.
#[derive(Clone)]
pub struct CountingPool {
    chunk_sender: Sender<Vec<u8>>,
    counter: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
}

impl CountingPool {
    pub fn new(filter: Option<Regex>) -> CountingPool {
        let (chunk_sender, chunk_receiver) = crossbeam::channel::unbounded::<Vec<u8>>();
        let counter = Arc::new(AtomicU64::new(0));
        let in_flight = Arc::new(AtomicUsize::new(0));

        // Chunks are independent of each other and only the aggregate sum is
        // observable, so counting can fan out freely. A couple of threads is plenty -
        // splitting lines is much cheaper than the read that produced them.
        let num_threads = std::cmp::max(1, num_cpus::get() / 2);
        for i in 0..num_threads {
            let chunk_receiver = chunk_receiver.clone();
            let counter = counter.clone();
            let in_flight = in_flight.clone();
            let filter = filter.clone();
            thread::Builder::new()
                .name(format!("record_counter_{i}"))
                .spawn(move || counting_worker(chunk_receiver, counter, in_flight, filter))
                .expect("Failed to spawn thread");
        }

        CountingPool { chunk_sender, counter, in_flight }
    }

    /// Hands a chunk over for counting. Ownership transfers to the pool; the chunk
    /// is dropped once its count has landed.
    pub fn dispatch(&self, chunk: Vec<u8>) {
        // Increment before sending, so that in_flight == 0 always means every
        // dispatched chunk has landed in the counter.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.chunk_sender.send(chunk).expect("Chunk channel disconnected");
    }

    /// Blocks until every dispatched chunk has been counted. Called by the clock
    /// after freezing the reader, so the wait is bounded by the few chunks that can
    /// still be in the channel.
    pub fn drain(&self) {
        let backoff = Backoff::new();
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            backoff.snooze();
        }
    }

    /// Atomically reads the counter and resets it to zero.
    pub fn take_and_reset(&self) -> u64 {
        self.counter.swap(0, Ordering::SeqCst)
    }

    /// Reads the counter without resetting it.
    pub fn value(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

fn counting_worker(
    chunk_receiver: Receiver<Vec<u8>>,
    counter: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
    filter: Option<Regex>,
) {
    // The receiver disconnects when the pipeline drops its pool handles, which is
    // the only shutdown signal this thread needs.
    while let Ok(chunk) = chunk_receiver.recv() {
        let n = count_records(&chunk, filter.as_ref());
        counter.fetch_add(n, Ordering::SeqCst);
        // Decrement only once the count has landed, so drain() can never observe a
        // dispatched-but-uncounted chunk as finished.
        in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

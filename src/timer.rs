//! One-shot deadline scheduler on a dedicated thread.
//!
//! Deadlines are queued over a channel and fired in deadline order (ties in
//! scheduling order). There is no cancellation: callers re-check their own
//! state when a key fires. Dropping the [`Timer`] stops the thread; deadlines
//! still queued at that point never fire.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Handle for scheduling keys onto the timer thread.
#[derive(Debug)]
pub struct Timer<K> {
    tx: mpsc::Sender<(Instant, K)>,
}

impl<K: Send + 'static> Timer<K> {
    /// Start the timer thread. `on_fire` runs on that thread, once per key.
    pub fn spawn(name: &str, mut on_fire: impl FnMut(K) + Send + 'static) -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<(Instant, K)>();

        thread::Builder::new().name(name.to_string()).spawn(move || {
            let mut queue: BinaryHeap<Entry<K>> = BinaryHeap::new();
            let mut seq = 0u64;

            loop {
                let received = match queue.peek() {
                    Some(next) => rx.recv_timeout(next.deadline.saturating_duration_since(Instant::now())),
                    None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };

                match received {
                    Ok((deadline, key)) => {
                        queue.push(Entry { deadline, seq, key });
                        seq += 1;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                let now = Instant::now();
                while queue.peek().is_some_and(|e| e.deadline <= now) {
                    if let Some(entry) = queue.pop() {
                        on_fire(entry.key);
                    }
                }
            }
        })?;

        Ok(Self { tx })
    }

    /// Fire `key` once `delay` has elapsed.
    ///
    /// Returns false if the timer thread is gone.
    pub fn schedule(&self, delay: Duration, key: K) -> bool {
        self.tx.send((Instant::now() + delay, key)).is_ok()
    }
}

struct Entry<K> {
    deadline: Instant,
    seq: u64,
    key: K,
}

// Min-heap on (deadline, seq).
impl<K> Ord for Entry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.deadline, other.seq).cmp(&(self.deadline, self.seq))
    }
}

impl<K> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<K> Eq for Entry<K> {}

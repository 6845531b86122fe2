//! Bounded fetch admission with a FIFO overflow queue.
//!
//! The scheduler only decides *when* a task may run; it never runs anything
//! itself. `submit` hands the task straight back when a slot is free, and
//! `complete` hands back the next queued task once a slot is released. The
//! caller spawns whatever it receives.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Outcome of [`RequestScheduler::submit`].
#[derive(Debug, PartialEq, Eq)]
pub enum Submission<T> {
    /// A slot was free; run this task now.
    Run(T),
    /// All slots busy; the task waits in the queue.
    Queued,
    /// The key is already running or queued; the task was dropped.
    Duplicate,
}

/// Admits at most `max_concurrent` tasks at a time.
///
/// Keys identify a fetch for dedup purposes. The data source keys by
/// generation and block index so a stale fetch still holding a slot never
/// blocks the same block in a newer generation.
#[derive(Debug)]
pub struct RequestScheduler<K, T> {
    max_concurrent: usize,
    running: HashSet<K>,
    queue: VecDeque<(K, T)>,
}

impl<K: Copy + Eq + Hash, T> RequestScheduler<K, T> {
    /// A limit of 0 is treated as 1.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            running: HashSet::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn submit(&mut self, key: K, task: T) -> Submission<T> {
        if self.is_pending(&key) {
            return Submission::Duplicate;
        }
        if self.running.len() < self.max_concurrent {
            self.running.insert(key);
            Submission::Run(task)
        } else {
            self.queue.push_back((key, task));
            Submission::Queued
        }
    }

    /// Release the slot held by `key` and admit the oldest queued task, if a
    /// slot is free for it.
    pub fn complete(&mut self, key: &K) -> Option<(K, T)> {
        self.running.remove(key);
        if self.running.len() >= self.max_concurrent {
            return None;
        }
        let (next_key, task) = self.queue.pop_front()?;
        self.running.insert(next_key);
        Some((next_key, task))
    }

    /// Drop every queued task. Running tasks keep their slots. Returns the
    /// dropped keys in queue order.
    pub fn clear_queue(&mut self) -> Vec<K> {
        self.queue.drain(..).map(|(key, _)| key).collect()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.running.contains(key) || self.queue.iter().any(|(queued, _)| queued == key)
    }

    /// Tasks holding a slot.
    pub fn in_flight(&self) -> usize {
        self.running.len()
    }

    /// Tasks waiting for a slot.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

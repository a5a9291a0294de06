//! Default priority-bucketed [`SchedClass`] (§3: "ready queue... policy is a
//! pluggable, black-box capability").
//!
//! FIFO-within-priority, highest numeric priority first, same ordering the
//! teacher crate's run-queue buckets use for its real-time class. A side
//! table remembers which bucket each queued thread lives in so `dequeue`
//! doesn't need to scan every priority level.

use alloc::collections::{BTreeMap, VecDeque};

use crate::thread::ThreadId;
use crate::traits::SchedClass;

#[derive(Default)]
pub struct PriorityClass {
    buckets: BTreeMap<i32, VecDeque<ThreadId>>,
    location: BTreeMap<ThreadId, i32>,
}

impl PriorityClass {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedClass for PriorityClass {
    fn enqueue(&mut self, thread: ThreadId, priority: i32) {
        self.buckets.entry(priority).or_default().push_back(thread);
        self.location.insert(thread, priority);
    }

    fn dequeue(&mut self, thread: ThreadId) {
        let Some(priority) = self.location.remove(&thread) else {
            return;
        };
        if let Some(queue) = self.buckets.get_mut(&priority) {
            queue.retain(|&queued| queued != thread);
            if queue.is_empty() {
                self.buckets.remove(&priority);
            }
        }
    }

    fn pick_next(&mut self) -> Option<ThreadId> {
        let &top = self.buckets.keys().next_back()?;
        let queue = self.buckets.get_mut(&top)?;
        let thread = queue.pop_front()?;
        self.location.remove(&thread);
        if queue.is_empty() {
            self.buckets.remove(&top);
        }
        Some(thread)
    }

    fn len(&self) -> usize {
        self.location.len()
    }
}

//! Fence-keyed deferred release for multi-frame-in-flight rendering.
//!
//! A resource freed by the application may still be referenced by command
//! lists the GPU has not finished. Each release is tagged with the first
//! fence value that is guaranteed to come after every such reference, and is
//! only handed back once the fence has reached it.

use std::collections::VecDeque;

/// A resource waiting for the GPU to pass `release_at`.
struct PendingRelease<T> {
    resource: T,
    release_at: u64,
}

/// Queue of resources waiting on a fence value.
pub struct DeferredReleaseQueue<T> {
    pending: VecDeque<PendingRelease<T>>,
}

impl<T> Default for DeferredReleaseQueue<T> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }
}

impl<T> DeferredReleaseQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `resource` for release.
    ///
    /// `submitted` is the last fence value handed to the queue. The next
    /// submission may still record the resource (the frame currently being
    /// built), so it is released once the fence reaches `submitted + 1`.
    pub fn queue(&mut self, resource: T, submitted: u64) {
        let release_at = submitted + 1;
        // Values are non-decreasing so only the front can mature first.
        debug_assert!(self
            .pending
            .back()
            .map_or(true, |last| last.release_at <= release_at));
        self.pending.push_back(PendingRelease {
            resource,
            release_at,
        });
    }

    /// Take every resource whose fence value has completed.
    pub fn collect(&mut self, completed: u64) -> Vec<T> {
        let mut ready = Vec::new();
        while matches!(self.pending.front(), Some(p) if p.release_at <= completed) {
            if let Some(p) = self.pending.pop_front() {
                ready.push(p.resource);
            }
        }
        ready
    }

    /// Take everything regardless of the fence. Only valid after a flush.
    pub fn drain(&mut self) -> Vec<T> {
        self.pending.drain(..).map(|p| p.resource).collect()
    }

    /// Number of resources still waiting.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Fence value the oldest pending resource waits for.
    #[must_use]
    pub fn next_release_value(&self) -> Option<u64> {
        self.pending.front().map(|p| p.release_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_only_after_fence_passes() {
        let mut queue = DeferredReleaseQueue::new();
        queue.queue("a", 4);
        queue.queue("b", 6);

        assert!(queue.collect(4).is_empty());
        assert_eq!(queue.collect(5), vec!["a"]);
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.next_release_value(), Some(7));
        assert!(queue.collect(6).is_empty());
        assert_eq!(queue.collect(9), vec!["b"]);
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn drain_returns_everything() {
        let mut queue = DeferredReleaseQueue::new();
        queue.queue(1, 0);
        queue.queue(2, 0);
        assert_eq!(queue.drain(), vec![1, 2]);
        assert_eq!(queue.next_release_value(), None);
    }
}

//! Capture pipeline: filter, buffer, emit.
//!
//! Observed debug text flows through here from whichever host thread
//! produced it. The filter and capacity are fixed at attach; the only
//! runtime-mutable state is the ring buffer, serialized by one mutex that
//! is held for a single append-or-evict and never across a forwarded call.

use std::collections::VecDeque;
use std::sync::Mutex;

use log::info;

/// Ring capacity when the caller does not choose one.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Optional substring predicate over captured payloads.
///
/// Read-only after initialization; a disabled rule or empty pattern
/// retains everything.
#[derive(Debug, Clone)]
pub struct FilterRule {
    enabled: bool,
    pattern: String,
}

impl FilterRule {
    pub fn new(enabled: bool, pattern: impl Into<String>) -> Self {
        Self {
            enabled,
            pattern: pattern.into(),
        }
    }

    /// A rule that retains every payload.
    pub fn retain_all() -> Self {
        Self::new(false, "")
    }

    /// Whether the pipeline should keep this payload.
    pub fn retains(&self, payload: &str) -> bool {
        !self.enabled || self.pattern.is_empty() || payload.contains(&self.pattern)
    }
}

/// Size-bounded FIFO of captured lines; oldest entry evicted when full.
#[derive(Debug)]
pub struct CaptureBuffer {
    entries: VecDeque<String>,
    capacity: usize,
}

impl CaptureBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capture buffer needs a nonzero capacity");
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest entry first when at capacity.
    pub fn push(&mut self, entry: String) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<String> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// All buffered entries in arrival order.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }
}

/// Thread-safe capture path shared by both debug-output observers.
pub struct CapturePipeline {
    filter: FilterRule,
    buffer: Mutex<CaptureBuffer>,
}

impl CapturePipeline {
    pub fn new(capacity: usize, filter: FilterRule) -> Self {
        Self {
            filter,
            buffer: Mutex::new(CaptureBuffer::new(capacity)),
        }
    }

    /// Filter, buffer, and emit one payload. Returns whether it was
    /// retained. Empty payloads (e.g. a failed encoding conversion) are a
    /// no-op.
    pub fn submit(&self, payload: &str) -> bool {
        let payload = payload.trim_end_matches(['\r', '\n']);
        if payload.is_empty() || !self.filter.retains(payload) {
            return false;
        }

        {
            let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
            buffer.push(payload.to_string());
        }
        // Emission happens outside the lock; the sink is the external
        // text-emission collaborator behind the `log` facade.
        info!(target: "debug", "{}", payload);
        true
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .capacity()
    }

    pub fn recent(&self, n: usize) -> Vec<String> {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .recent(n)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn filter_retains_matching_payloads_only() {
        let rule = FilterRule::new(true, "HUD");
        assert!(rule.retains("HUD: health=100"));
        assert!(!rule.retains("physics tick"));
    }

    #[test]
    fn disabled_or_empty_filter_retains_everything() {
        assert!(FilterRule::new(false, "HUD").retains("physics tick"));
        assert!(FilterRule::new(true, "").retains("physics tick"));
        assert!(FilterRule::retain_all().retains("anything"));
    }

    #[test]
    fn buffer_evicts_oldest_beyond_capacity() {
        let mut buffer = CaptureBuffer::new(3);
        for i in 0..10 {
            buffer.push(format!("msg {}", i));
            assert!(buffer.len() <= 3);
        }
        assert_eq!(buffer.snapshot(), vec!["msg 7", "msg 8", "msg 9"]);
    }

    #[test]
    fn recent_returns_tail_in_arrival_order() {
        let mut buffer = CaptureBuffer::new(5);
        for i in 0..5 {
            buffer.push(format!("{}", i));
        }
        assert_eq!(buffer.recent(2), vec!["3", "4"]);
        assert_eq!(buffer.recent(100).len(), 5);
    }

    #[test]
    fn submit_applies_filter_and_strips_line_endings() {
        let pipeline = CapturePipeline::new(10, FilterRule::new(true, "HUD"));

        assert!(pipeline.submit("HUD: health=100\r\n"));
        assert!(!pipeline.submit("physics tick\n"));
        assert!(!pipeline.submit(""));

        assert_eq!(pipeline.snapshot(), vec!["HUD: health=100"]);
    }

    #[test]
    fn concurrent_submits_lose_nothing() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 200;

        let pipeline = Arc::new(CapturePipeline::new(
            THREADS * PER_THREAD,
            FilterRule::retain_all(),
        ));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let pipeline = Arc::clone(&pipeline);
                std::thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        pipeline.submit(&format!("thread {} msg {}", t, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entries = pipeline.snapshot();
        assert_eq!(entries.len(), THREADS * PER_THREAD);
        // No torn strings: every entry parses back into its payload form.
        for entry in &entries {
            assert!(entry.starts_with("thread "), "corrupted entry: {}", entry);
        }
        // Per-thread arrival order is preserved under the lock.
        for t in 0..THREADS {
            let prefix = format!("thread {} ", t);
            let ids: Vec<usize> = entries
                .iter()
                .filter(|e| e.starts_with(&prefix))
                .map(|e| e.rsplit(' ').next().unwrap().parse().unwrap())
                .collect();
            assert_eq!(ids.len(), PER_THREAD);
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn concurrent_submits_respect_capacity_bound() {
        let pipeline = Arc::new(CapturePipeline::new(50, FilterRule::retain_all()));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let pipeline = Arc::clone(&pipeline);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        pipeline.submit(&format!("{}-{}", t, i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pipeline.len(), 50);
    }
}

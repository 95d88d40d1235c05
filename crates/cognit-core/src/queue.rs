//! The bounded FIFO of pending invocations.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::call::Call;

/// A bounded FIFO of [`Call`] records.
///
/// `enqueue`/`dequeue`/`len` never block: the supervisor polls the queue at
/// its own cadence rather than waiting on a condition variable. Protected
/// by a [`parking_lot::Mutex`], never held across an `.await` point.
pub struct CallQueue {
    /// Maximum number of calls the queue will hold at once.
    bound: usize,
    /// The queued calls, in FIFO order.
    calls: Mutex<VecDeque<Call>>,
}

impl CallQueue {
    /// Creates an empty queue with the given bound.
    pub fn new(bound: usize) -> Self {
        Self {
            bound,
            calls: Mutex::new(VecDeque::with_capacity(bound.min(64))),
        }
    }

    /// Appends `call` to the tail of the queue.
    ///
    /// Returns `false` iff the queue is already at its bound; the caller is
    /// responsible for surfacing a [`crate::error::CapacityError`].
    pub fn enqueue(&self, call: Call) -> bool {
        let mut calls = self.calls.lock();
        if calls.len() >= self.bound {
            return false;
        }
        calls.push_back(call);
        true
    }

    /// Removes and returns the head of the queue, if any.
    pub fn dequeue(&self) -> Option<Call> {
        self.calls.lock().pop_front()
    }

    /// The number of calls currently queued.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Whether the queue currently holds no calls.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains and discards every queued call.
    ///
    /// Used by `stop()`: pending items are discarded, never delivered.
    pub fn drain(&self) -> Vec<Call> {
        self.calls.lock().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::call::Function;
    use crate::call::Language;

    fn function() -> Arc<Function> {
        Arc::new(Function {
            id: crate::call::FunctionRegistry::new().register(Language::Py, "x".into()),
            language: Language::Py,
            blob: "x".into(),
        })
    }

    #[test]
    fn enqueue_respects_bound() {
        let queue = CallQueue::new(2);
        let f = function();
        assert!(queue.enqueue(Call::sync(f.clone(), vec![], None)));
        assert!(queue.enqueue(Call::sync(f.clone(), vec![], None)));
        assert!(!queue.enqueue(Call::sync(f, vec![], None)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn dequeue_is_fifo() {
        let queue = CallQueue::new(10);
        let f = function();
        for i in 0..3 {
            queue.enqueue(Call::sync(f.clone(), vec![serde_json::json!(i)], None));
        }
        for i in 0..3 {
            let call = queue.dequeue().unwrap();
            assert_eq!(call.params[0], serde_json::json!(i));
        }
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn drain_empties_the_queue_without_delivering() {
        let queue = CallQueue::new(10);
        let f = function();
        queue.enqueue(Call::sync(f.clone(), vec![], None));
        queue.enqueue(Call::sync(f, vec![], None));
        assert_eq!(queue.drain().len(), 2);
        assert!(queue.is_empty());
    }
}

//! FIFO acquisition queue with per-waiter deadlines (design §4.C "Queue").
//!
//! A plain `Semaphore` can't express "remove this specific waiter from the
//! middle of the line when its deadline fires or it cancels" in O(1), so
//! this is a `VecDeque` of oneshot senders instead — the one place the pool
//! deliberately diverges from the semaphore-only shape common in the
//! reference pool implementations.

use crate::session::SessionId;
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tokio::time::Instant;

pub struct Waiter {
    pub session_id: SessionId,
    pub enqueued_at: Instant,
    pub deadline: Instant,
    sender: oneshot::Sender<()>,
}

#[derive(Default)]
pub struct WaitQueue {
    waiters: VecDeque<Waiter>,
}

impl WaitQueue {
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Registers a new waiter, returning the receiver the caller awaits on.
    pub fn enqueue(&mut self, session_id: SessionId, deadline: Instant) -> oneshot::Receiver<()> {
        let (sender, receiver) = oneshot::channel();
        self.waiters.push_back(Waiter {
            session_id,
            enqueued_at: Instant::now(),
            deadline,
            sender,
        });
        receiver
    }

    /// Wakes the oldest waiter whose receiver hasn't been dropped (caller
    /// canceled). Returns `true` if someone was woken.
    pub fn wake_oldest(&mut self) -> bool {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.sender.send(()).is_ok() {
                return true;
            }
        }
        false
    }

    /// Drops any waiter past its deadline, in FIFO order, without touching
    /// live waiters behind it — O(expired) amortized, not O(n) per tick.
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let before = self.waiters.len();
        self.waiters.retain(|w| w.deadline > now);
        before - self.waiters.len()
    }

    /// Removes a specific waiter by session id (explicit cancellation).
    pub fn cancel(&mut self, session_id: SessionId) -> bool {
        let before = self.waiters.len();
        self.waiters.retain(|w| w.session_id != session_id);
        self.waiters.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wakes_in_fifo_order() {
        let mut q = WaitQueue::default();
        let far = Instant::now() + std::time::Duration::from_secs(10);
        let mut r1 = q.enqueue(SessionId::new(), far);
        let mut r2 = q.enqueue(SessionId::new(), far);

        assert!(q.wake_oldest());
        assert!(r1.try_recv().is_ok());
        assert!(r2.try_recv().is_err());

        assert!(q.wake_oldest());
        assert!(r2.try_recv().is_ok());
    }

    #[test]
    fn evicts_only_expired_waiters() {
        let mut q = WaitQueue::default();
        let now = Instant::now();
        let _ = q.enqueue(SessionId::new(), now - std::time::Duration::from_millis(1));
        let _ = q.enqueue(SessionId::new(), now + std::time::Duration::from_secs(10));
        assert_eq!(q.evict_expired(now), 1);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn cancel_removes_in_o_of_matching_waiters() {
        let mut q = WaitQueue::default();
        let sid = SessionId::new();
        let far = Instant::now() + std::time::Duration::from_secs(10);
        let _ = q.enqueue(sid, far);
        assert!(q.cancel(sid));
        assert!(q.is_empty());
    }
}

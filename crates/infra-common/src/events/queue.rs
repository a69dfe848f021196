use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

struct Shared<T> {
    name: String,
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    notify: Notify,
    senders: AtomicUsize,
    receiver_alive: AtomicBool,
    dropped: AtomicU64,
}

/// Create a bounded drop-oldest queue
///
/// `name` identifies the queue in logs and in the `queue_dropped` metric.
pub fn bounded<T>(name: impl Into<String>, capacity: usize) -> (EventSender<T>, EventReceiver<T>) {
    let shared = Arc::new(Shared {
        name: name.into(),
        capacity: capacity.max(1),
        items: Mutex::new(VecDeque::new()),
        notify: Notify::new(),
        senders: AtomicUsize::new(1),
        receiver_alive: AtomicBool::new(true),
        dropped: AtomicU64::new(0),
    });
    (
        EventSender {
            shared: shared.clone(),
        },
        EventReceiver { shared },
    )
}

/// Producer half of a bounded queue
pub struct EventSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> EventSender<T> {
    /// Enqueue without waiting
    ///
    /// Returns `false` when an older entry had to be discarded to make room, or
    /// when the receiver is gone and the item itself was discarded.
    pub fn send(&self, item: T) -> bool {
        if !self.shared.receiver_alive.load(Ordering::Acquire) {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let evicted = {
            let mut items = self.shared.items.lock();
            let evicted = if items.len() >= self.shared.capacity {
                items.pop_front().is_some()
            } else {
                false
            };
            items.push_back(item);
            evicted
        };

        if evicted {
            let total = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if total.is_power_of_two() {
                tracing::warn!(
                    queue = %self.shared.name,
                    dropped = total,
                    "Queue overflow, dropping oldest entries"
                );
            }
        }

        self.shared.notify.notify_one();
        !evicted
    }

    /// Number of entries discarded so far
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Counters view that does not keep the queue open
    pub fn probe(&self) -> QueueProbe<T> {
        QueueProbe {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        self.shared.senders.fetch_add(1, Ordering::AcqRel);
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Drop for EventSender<T> {
    fn drop(&mut self) {
        if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
            // Wake the receiver so it observes the closed queue
            self.shared.notify.notify_one();
        }
    }
}

impl<T> std::fmt::Debug for EventSender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("name", &self.shared.name)
            .field("capacity", &self.shared.capacity)
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Consumer half of a bounded queue
pub struct EventReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> EventReceiver<T> {
    /// Wait for the next entry
    ///
    /// Returns `None` once every sender is dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let next = self.shared.items.lock().pop_front();
            if let Some(item) = next {
                return Some(item);
            }
            if self.shared.senders.load(Ordering::Acquire) == 0 {
                return None;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Take the next entry if one is ready
    pub fn try_recv(&mut self) -> Option<T> {
        self.shared.items.lock().pop_front()
    }

    /// Take every ready entry
    pub fn drain(&mut self) -> Vec<T> {
        self.shared.items.lock().drain(..).collect()
    }

    /// Number of entries waiting
    pub fn len(&self) -> usize {
        self.shared.items.lock().len()
    }

    /// Whether nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries discarded so far
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Queue name
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl<T> Drop for EventReceiver<T> {
    fn drop(&mut self) {
        self.shared.receiver_alive.store(false, Ordering::Release);
        self.shared.items.lock().clear();
    }
}

/// Read-only view of a queue's counters
pub struct QueueProbe<T> {
    shared: Arc<Shared<T>>,
}

/// Object-safe access to queue counters, for reporting
pub trait QueueStats: Send + Sync {
    fn name(&self) -> &str;
    fn dropped(&self) -> u64;
    fn len(&self) -> usize;
}

impl<T: Send> QueueStats for QueueProbe<T> {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    fn len(&self) -> usize {
        self.shared.items.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_oldest_on_overflow() {
        let (tx, mut rx) = bounded("test", 2);

        assert!(tx.send(1));
        assert!(tx.send(2));
        assert!(!tx.send(3));

        assert_eq!(rx.dropped(), 1);
        assert_eq!(rx.drain(), vec![2, 3]);
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = bounded::<u32>("test", 4);
        drop(rx);

        assert!(!tx.send(1));
        assert_eq!(tx.dropped(), 1);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_send() {
        let (tx, mut rx) = bounded("test", 8);

        let consumer = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;
        tx.send("sdp");

        assert_eq!(consumer.await.unwrap(), Some("sdp"));
    }

    #[tokio::test]
    async fn test_probe_does_not_hold_queue_open() {
        let (tx, mut rx) = bounded("probed", 1);
        let probe: Box<dyn QueueStats> = Box::new(tx.probe());

        tx.send(1u8);
        tx.send(2u8);
        drop(tx);

        assert_eq!(probe.name(), "probed");
        assert_eq!(probe.dropped(), 1);
        assert_eq!(probe.len(), 1);
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_recv_returns_none_when_closed() {
        let (tx, mut rx) = bounded("test", 8);
        let tx2 = tx.clone();

        tx.send(10);
        drop(tx);
        drop(tx2);

        assert_eq!(rx.recv().await, Some(10));
        assert_eq!(rx.recv().await, None);
    }
}

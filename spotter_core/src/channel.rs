//! Cross-task communication primitives.
//!
//! Two shapes cover every handoff in the rig:
//!
//! - [`bounded`]: a fixed-capacity FIFO with drop-oldest backpressure. The
//!   producer never blocks; when the consumer falls behind, the oldest
//!   unread element is discarded so the real-time producer keeps its pace.
//! - [`Mailbox`]: a single slot where `put` overwrites unconditionally and
//!   `get` returns the latest value without consuming it. Used for the
//!   boolean coordination flags where only current intent matters.

use crossbeam_channel as xch;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Create a bounded drop-oldest queue with the given capacity.
pub fn bounded<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let (tx, rx) = xch::bounded(capacity.max(1));
    (
        Producer {
            tx,
            rx: rx.clone(),
        },
        Consumer { rx },
    )
}

/// Sending half of a bounded queue. Cloneable; sends never block.
#[derive(Clone)]
pub struct Producer<T> {
    tx: xch::Sender<T>,
    // Kept so a full queue can shed its oldest element without blocking.
    rx: xch::Receiver<T>,
}

impl<T> Producer<T> {
    /// Append `value`, discarding the oldest unread element if the queue is
    /// full. Returns the number of elements dropped (0 or more; another
    /// producer may race us into a second eviction).
    pub fn send(&self, mut value: T) -> usize {
        let mut dropped = 0;
        loop {
            match self.tx.try_send(value) {
                Ok(()) => return dropped,
                Err(xch::TrySendError::Full(v)) => {
                    let _ = self.rx.try_recv();
                    dropped += 1;
                    value = v;
                }
                // Consumer gone; the element has nowhere to go.
                Err(xch::TrySendError::Disconnected(_)) => return dropped,
            }
        }
    }
}

/// Receiving half of a bounded queue.
pub struct Consumer<T> {
    rx: xch::Receiver<T>,
}

impl<T> Consumer<T> {
    /// Block until an element is available.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Block up to `timeout` for an element.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Non-blocking read.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Single-slot overwrite mailbox: `put` replaces, `get` peeks.
///
/// Writes are idempotent latches, not a queue; N writes without an
/// intervening read collapse to the last value. Clones share the slot.
#[derive(Clone)]
pub struct Mailbox<T: Copy> {
    slot: Arc<Mutex<T>>,
}

impl<T: Copy> Mailbox<T> {
    pub fn new(initial: T) -> Self {
        Self {
            slot: Arc::new(Mutex::new(initial)),
        }
    }

    /// Overwrite the slot unconditionally.
    pub fn put(&self, value: T) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = value;
        }
    }

    /// Read the latest value without consuming it.
    pub fn get(&self) -> T {
        match self.slot.lock() {
            Ok(slot) => *slot,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_within_capacity() {
        let (tx, rx) = bounded(4);
        for i in 0..4 {
            assert_eq!(tx.send(i), 0);
        }
        assert_eq!(rx.drain(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn full_queue_drops_oldest_not_newest() {
        let (tx, rx) = bounded(2);
        tx.send(1);
        tx.send(2);
        let dropped = tx.send(3);
        assert_eq!(dropped, 1);
        assert_eq!(rx.drain(), vec![2, 3]);
    }

    #[test]
    fn producer_never_blocks_while_consumer_stalls() {
        let (tx, rx) = bounded(2);
        for i in 0..1000 {
            tx.send(i);
        }
        // Only the freshest two survive.
        assert_eq!(rx.drain(), vec![998, 999]);
    }

    #[test]
    fn mailbox_overwrites_and_does_not_consume() {
        let mb = Mailbox::new(false);
        mb.put(true);
        assert!(mb.get());
        // get() does not consume
        assert!(mb.get());
        mb.put(false);
        assert!(!mb.get());
    }

    #[test]
    fn mailbox_repeated_writes_collapse_to_last() {
        let mb = Mailbox::new(0u32);
        for i in 1..=10 {
            mb.put(i);
        }
        assert_eq!(mb.get(), 10);
    }
}

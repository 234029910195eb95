//! Bounded blocking queues connecting pipeline stages.
//!
//! A producer blocks while the queue is full and a consumer while it is
//! empty. [`Fifo::peek`] and [`Fifo::try_pop`] never block; the muxer uses
//! them to inspect several queues without committing to any one.
//!
//! Closing a queue wakes every waiter: pending and later pushes fail with
//! [`Error::Closed`], pops drain what is left and then return `None`.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use transcode_core::{Buffer, BufferList, Error, Result};

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A bounded multi-producer, multi-consumer FIFO.
pub struct Fifo<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

/// The queue type carried between stages.
pub type BufferFifo = Fifo<Buffer>;

impl<T> Fifo<T> {
    /// Create a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Append an item, blocking while the queue is full.
    pub fn push(&self, item: T) -> Result<()> {
        let mut inner = self.inner.lock();
        while inner.items.len() >= self.capacity && !inner.closed {
            self.not_full.wait(&mut inner);
        }
        if inner.closed {
            return Err(Error::Closed);
        }
        inner.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Remove the oldest item if there is one.
    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        let item = inner.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Look at the oldest item without removing it.
    pub fn peek<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.lock().items.front().map(f)
    }

    /// Close the queue and wake every waiter.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

impl Fifo<Buffer> {
    /// Push every buffer of an emission batch, in order.
    pub fn push_list(&self, list: BufferList) -> Result<()> {
        for buf in list {
            self.push(buf)?;
        }
        Ok(())
    }
}

impl<T> std::fmt::Debug for Fifo<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Fifo")
            .field("len", &inner.items.len())
            .field("capacity", &self.capacity)
            .field("closed", &inner.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let fifo = Fifo::new(4);
        for i in 0..4 {
            fifo.push(i).unwrap();
        }
        assert_eq!(fifo.len(), 4);
        assert_eq!(fifo.peek(|v| *v), Some(0));
        assert_eq!(fifo.pop(), Some(0));
        assert_eq!(fifo.try_pop(), Some(1));
        assert_eq!(fifo.pop(), Some(2));
        assert_eq!(fifo.pop(), Some(3));
        assert!(fifo.try_pop().is_none());
        assert!(fifo.peek(|v| *v).is_none());
    }

    #[test]
    fn test_push_blocks_when_full() {
        let fifo = Arc::new(Fifo::new(2));
        fifo.push(1).unwrap();
        fifo.push(2).unwrap();

        let producer = {
            let fifo = Arc::clone(&fifo);
            thread::spawn(move || fifo.push(3))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(fifo.len(), 2);

        assert_eq!(fifo.pop(), Some(1));
        producer.join().unwrap().unwrap();
        assert_eq!(fifo.pop(), Some(2));
        assert_eq!(fifo.pop(), Some(3));
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let fifo = Arc::new(Fifo::new(1));
        let consumer = {
            let fifo = Arc::clone(&fifo);
            thread::spawn(move || fifo.pop())
        };
        thread::sleep(Duration::from_millis(20));
        fifo.push(7).unwrap();
        assert_eq!(consumer.join().unwrap(), Some(7));
    }

    #[test]
    fn test_close_wakes_waiters() {
        let fifo: Arc<Fifo<u32>> = Arc::new(Fifo::new(1));
        let consumer = {
            let fifo = Arc::clone(&fifo);
            thread::spawn(move || fifo.pop())
        };
        thread::sleep(Duration::from_millis(20));
        fifo.close();
        assert_eq!(consumer.join().unwrap(), None);
        assert!(matches!(fifo.push(1), Err(Error::Closed)));
    }

    #[test]
    fn test_close_drains_remaining() {
        let fifo = Fifo::new(4);
        fifo.push(1).unwrap();
        fifo.close();
        assert_eq!(fifo.pop(), Some(1));
        assert_eq!(fifo.pop(), None);
    }

    #[test]
    fn test_push_list() {
        let fifo = BufferFifo::new(4);
        let list: BufferList = (0..3)
            .map(|i| {
                let mut buf = Buffer::from_bytes(vec![1]);
                buf.start = i;
                buf
            })
            .collect();
        fifo.push_list(list).unwrap();
        assert_eq!(fifo.len(), 3);
        assert_eq!(fifo.peek(|b| b.start), Some(0));
    }
}

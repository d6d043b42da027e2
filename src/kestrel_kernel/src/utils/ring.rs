//! A bounded FIFO of fixed-size byte records.

/// Stores up to `capacity` messages of `msg_size` bytes each in one flat
/// buffer. Messages are copied in and out; nothing borrows the buffer.
#[derive(Debug)]
pub(crate) struct MessageRing {
    buf: Box<[u8]>,
    msg_size: usize,
    capacity: usize,
    /// The slot index of the oldest message.
    head: usize,
    len: usize,
}

impl MessageRing {
    pub(crate) fn new(msg_size: usize, capacity: usize) -> Self {
        Self {
            buf: vec![0; msg_size * capacity].into_boxed_slice(),
            msg_size,
            capacity,
            head: 0,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    fn slot(&mut self, i: usize) -> &mut [u8] {
        let start = (i % self.capacity) * self.msg_size;
        &mut self.buf[start..start + self.msg_size]
    }

    /// Append a message. Returns `false` without modifying the ring if it is
    /// full.
    ///
    /// # Panics
    ///
    /// Panics if `msg.len()` doesn't match the message size.
    pub(crate) fn push(&mut self, msg: &[u8]) -> bool {
        assert_eq!(msg.len(), self.msg_size);
        if self.is_full() {
            return false;
        }
        let tail = self.head + self.len;
        self.slot(tail).copy_from_slice(msg);
        self.len += 1;
        true
    }

    /// Remove the oldest message.
    pub(crate) fn pop(&mut self) -> Option<Box<[u8]>> {
        if self.is_empty() {
            return None;
        }
        let head = self.head;
        let msg = Box::<[u8]>::from(&*self.slot(head));
        self.head = (self.head + 1) % self.capacity;
        self.len -= 1;
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::collections::VecDeque;

    #[test]
    fn wraps_around() {
        let mut ring = MessageRing::new(2, 2);
        assert!(ring.push(&[1, 2]));
        assert!(ring.push(&[3, 4]));
        assert!(!ring.push(&[5, 6]));
        assert_eq!(ring.pop().as_deref(), Some(&[1, 2][..]));
        assert!(ring.push(&[5, 6]));
        assert!(ring.is_full());
        assert_eq!(ring.pop().as_deref(), Some(&[3, 4][..]));
        assert_eq!(ring.pop().as_deref(), Some(&[5, 6][..]));
        assert_eq!(ring.pop(), None);
    }

    /// Pushes and pops driven by random bytes behave like a bounded
    /// `VecDeque`.
    #[quickcheck]
    fn matches_vec_deque(capacity: u8, bytecode: Vec<u8>) {
        let capacity = capacity as usize % 8 + 1;
        let mut subject = MessageRing::new(1, capacity);
        let mut reference = VecDeque::new();

        for &b in &bytecode {
            if b % 3 == 0 {
                assert_eq!(subject.pop().map(|m| m[0]), reference.pop_front());
            } else {
                let pushed = subject.push(&[b]);
                assert_eq!(pushed, reference.len() < capacity);
                if pushed {
                    reference.push_back(b);
                }
            }
            assert_eq!(subject.len(), reference.len());
        }
    }
}

//! Bounded byte FIFO modelling a hardware TX/RX queue

use std::collections::VecDeque;

use thiserror::Error;

/// Depth of the UART transmit and receive queues
pub const FIFO_DEPTH: usize = 16;

/// A byte was pushed onto a full queue and dropped
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("fifo full ({capacity} entries), dropped 0x{byte:02X}")]
pub struct FifoOverflow {
    /// The dropped byte
    pub byte: u8,
    /// Queue capacity
    pub capacity: usize,
}

/// Fixed-capacity byte queue
#[derive(Debug, Clone)]
pub struct ByteFifo {
    entries: VecDeque<u8>,
    capacity: usize,
    dropped: u64,
}

impl ByteFifo {
    /// Create an empty queue holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Enqueue a byte; a full queue leaves its contents unchanged
    pub fn push(&mut self, byte: u8) -> Result<(), FifoOverflow> {
        if self.is_full() {
            self.dropped += 1;
            return Err(FifoOverflow {
                byte,
                capacity: self.capacity,
            });
        }
        self.entries.push_back(byte);
        Ok(())
    }

    /// Dequeue the oldest byte
    pub fn pop(&mut self) -> Option<u8> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots remaining
    pub fn available(&self) -> usize {
        self.capacity - self.entries.len()
    }

    /// Bytes dropped on overflow since creation
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for ByteFifo {
    fn default() -> Self {
        Self::new(FIFO_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut fifo = ByteFifo::default();
        fifo.push(1).unwrap();
        fifo.push(2).unwrap();
        assert_eq!(fifo.pop(), Some(1));
        assert_eq!(fifo.pop(), Some(2));
        assert_eq!(fifo.pop(), None);
    }

    #[test]
    fn test_overflow_drops_byte() {
        let mut fifo = ByteFifo::new(2);
        fifo.push(0xA).unwrap();
        fifo.push(0xB).unwrap();

        let err = fifo.push(0xC).unwrap_err();
        assert_eq!(err.byte, 0xC);
        assert_eq!(fifo.len(), 2);
        assert_eq!(fifo.dropped(), 1);

        // Original contents survive
        assert_eq!(fifo.pop(), Some(0xA));
        assert_eq!(fifo.pop(), Some(0xB));
    }

    #[test]
    fn test_available() {
        let mut fifo = ByteFifo::default();
        assert_eq!(fifo.available(), FIFO_DEPTH);
        fifo.push(0).unwrap();
        assert_eq!(fifo.available(), FIFO_DEPTH - 1);
        assert!(!fifo.is_full());
    }
}

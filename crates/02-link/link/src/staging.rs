//! Two-slot receive staging.
//!
//! The bus reader fills one slot while the dispatcher drains the other.
//! Invariant: the writer never touches the slot at `read_index` until the
//! dispatcher completes it. When the dispatcher is still busy as a new
//! transfer lands, the transfer's data is dropped (logged by the caller)
//! instead of blocking the bus thread or corrupting data in flight.
//!
//! The write slot's buffer is checked out by value for the duration of a bus
//! transfer, so the guard around this struct is held only for index flips
//! and never across the transfer itself.

/// Outcome of publishing a freshly filled write slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Publish {
    /// The slot was handed to the reader side; the writer moved on.
    Ready,
    /// The reader still owns the previous slot; this interval's data is
    /// dropped and the write slot stays where it is.
    ReaderBusy,
}

struct Slot {
    buf: Vec<u8>,
    len: usize,
}

/// Double buffer decoupling bus reads from dispatch.
pub struct DoubleBuffer {
    slots: [Slot; 2],
    write_index: usize,
    read_index: Option<usize>,
}

impl DoubleBuffer {
    /// Creates both slots with `capacity` bytes preallocated.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: [
                Slot { buf: vec![0u8; capacity], len: 0 },
                Slot { buf: vec![0u8; capacity], len: 0 },
            ],
            write_index: 0,
            read_index: None,
        }
    }

    /// Takes the write slot's buffer, grown to at least `capacity` bytes.
    ///
    /// The buffer is owned by the single bus-reader thread until it comes
    /// back through [`publish`](Self::publish).
    pub fn checkout(&mut self, capacity: usize) -> Vec<u8> {
        let buf = &mut self.slots[self.write_index].buf;
        if buf.len() < capacity {
            buf.resize(capacity, 0);
        }
        std::mem::take(buf)
    }

    /// Returns a checked-out buffer holding `len` valid bytes and publishes
    /// it to the reader side.
    pub fn publish(&mut self, buf: Vec<u8>, len: usize) -> Publish {
        self.slots[self.write_index].buf = buf;
        if self.read_index.is_some() {
            return Publish::ReaderBusy;
        }
        self.slots[self.write_index].len = len;
        self.read_index = Some(self.write_index);
        self.write_index ^= 1;
        Publish::Ready
    }

    /// Returns a checked-out buffer without publishing anything, e.g. after
    /// an aborted bus read whose contents must not reach the reader.
    pub fn restore(&mut self, buf: Vec<u8>) {
        self.slots[self.write_index].buf = buf;
    }

    /// The published slot's contents, if any.
    pub fn take(&self) -> Option<&[u8]> {
        self.read_index
            .map(|idx| &self.slots[idx].buf[..self.slots[idx].len])
    }

    /// Releases the published slot back to the writer side.
    pub fn complete(&mut self) {
        self.read_index = None;
    }

    /// True while the reader owns a slot.
    pub fn read_pending(&self) -> bool {
        self.read_index.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_and_publish(staging: &mut DoubleBuffer, bytes: &[u8]) -> Publish {
        let mut buf = staging.checkout(bytes.len());
        buf[..bytes.len()].copy_from_slice(bytes);
        staging.publish(buf, bytes.len())
    }

    #[test]
    fn publish_flips_slots() {
        let mut staging = DoubleBuffer::new(8);
        assert_eq!(fill_and_publish(&mut staging, &[1, 2, 3, 4]), Publish::Ready);
        assert_eq!(staging.take(), Some(&[1u8, 2, 3, 4][..]));

        staging.complete();
        assert_eq!(fill_and_publish(&mut staging, &[9, 9]), Publish::Ready);
        assert_eq!(staging.take(), Some(&[9u8, 9][..]));
    }

    #[test]
    fn busy_reader_slot_is_never_overwritten() {
        let mut staging = DoubleBuffer::new(8);
        assert_eq!(fill_and_publish(&mut staging, &[0xA, 0xB, 0xC]), Publish::Ready);

        // A second transfer completes while the reader is still busy.
        assert_eq!(fill_and_publish(&mut staging, &[0x1, 0x2, 0x3]), Publish::ReaderBusy);

        // The reader's slot is byte-for-byte unchanged across the skipped
        // cycle, and completing it frees the writer to publish again.
        assert_eq!(staging.take(), Some(&[0xAu8, 0xB, 0xC][..]));
        staging.complete();
        assert_eq!(fill_and_publish(&mut staging, &[0x1, 0x2, 0x3]), Publish::Ready);
        assert_eq!(staging.take(), Some(&[0x1u8, 0x2, 0x3][..]));
    }

    #[test]
    fn checkout_grows_for_streaming_transfers() {
        let mut staging = DoubleBuffer::new(4);
        let buf = staging.checkout(16);
        assert_eq!(buf.len(), 16);
        staging.publish(buf, 16);
    }

    #[test]
    fn take_is_none_until_published() {
        let staging = DoubleBuffer::new(4);
        assert!(staging.take().is_none());
        assert!(!staging.read_pending());
    }

    #[test]
    fn restore_discards_without_publishing() {
        let mut staging = DoubleBuffer::new(8);
        let mut buf = staging.checkout(4);
        buf[..4].copy_from_slice(&[1, 2, 3, 4]);
        staging.restore(buf);
        assert!(staging.take().is_none());
        // The slot cycle continues normally afterwards.
        assert_eq!(fill_and_publish(&mut staging, &[5, 6]), Publish::Ready);
        assert_eq!(staging.take(), Some(&[5u8, 6][..]));
    }
}

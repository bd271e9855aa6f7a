//! Bipartite circular byte buffer.
//!
//! [`BipBuffer`] is the staging area for all buffered descriptor I/O. It
//! keeps committed bytes in at most two contiguous regions of a fixed
//! array — region A (oldest data) and region B (data that wrapped behind
//! A) — so producers always obtain a contiguous slice to write into and
//! consumers always observe a contiguous slice of the oldest data, without
//! a memmove in the steady state.
//!
//! # Discipline
//!
//! Writing is two-phase: [`reserve`](BipBuffer::reserve) hands out a free
//! contiguous run, [`commit`](BipBuffer::commit) publishes the bytes that
//! were actually written. At most one reservation may be outstanding.
//! Reading mirrors it: [`peek`](BipBuffer::peek) exposes the oldest
//! committed slice, [`junk`](BipBuffer::junk) consumes from the front.
//!
//! # Region Layout
//!
//! ```text
//! ┌────────┬──────────────┬─────────────────┬───────┐
//! │   B    │  (reclaimed) │        A        │ tail  │
//! │ 0..b_len              │ a_pos..a_pos+a_len       │
//! └────────┴──────────────┴─────────────────┴───────┘
//! ```
//!
//! When B is active it always starts at offset 0 and ends before `a_pos`;
//! once A drains, B is promoted to be the new A.

use std::fmt;

/// A reserved, not-yet-committed span of the underlying array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reservation {
    pos: usize,
    len: usize,
}

/// Bipartite circular byte buffer with two-phase writes.
///
/// All operations are purely in-memory and never suspend. The buffer owns
/// its storage; [`resize`](Self::resize) replaces the storage atomically
/// from the owner's perspective.
pub struct BipBuffer {
    data: Box<[u8]>,
    a_pos: usize,
    a_len: usize,
    /// Length of region B. B always starts at offset 0.
    b_len: usize,
    reserved: Option<Reservation>,
}

impl fmt::Debug for BipBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BipBuffer")
            .field("capacity", &self.data.len())
            .field("a_pos", &self.a_pos)
            .field("a_len", &self.a_len)
            .field("b_len", &self.b_len)
            .field("reserved", &self.reserved)
            .finish()
    }
}

impl BipBuffer {
    /// Creates an empty buffer with the given fixed capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            a_pos: 0,
            a_len: 0,
            b_len: 0,
            reserved: None,
        }
    }

    /// Total capacity of the underlying array.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of committed bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.a_len + self.b_len
    }

    /// Returns true if no bytes are committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity minus committed bytes minus the outstanding reservation.
    #[must_use]
    pub fn available(&self) -> usize {
        self.capacity() - self.len() - self.reserved.map_or(0, |r| r.len)
    }

    /// Free space a reservation could eventually use.
    ///
    /// While B is active, the tail behind A is dead until A drains, so only
    /// the gap between B and A counts. With B empty, both the front gap and
    /// the tail count (compression joins them).
    #[must_use]
    pub fn unused_space(&self) -> usize {
        if self.b_len > 0 {
            self.a_pos - self.b_len
        } else {
            self.capacity() - self.a_len
        }
    }

    /// Bytes reclaimable at the front by [`compress`](Self::compress).
    #[must_use]
    pub fn compress_gain(&self) -> usize {
        self.a_pos
    }

    /// Returns true if [`reserve`](Self::reserve) would succeed for `len`.
    #[must_use]
    pub fn can_reserve(&self, len: usize) -> bool {
        self.reservation_pos(len).is_some()
    }

    /// Where a reservation of `len` would be placed, per the choice rule:
    /// after B when B is active, else extending A's tail, else opening B.
    fn reservation_pos(&self, len: usize) -> Option<usize> {
        if self.b_len > 0 {
            (self.a_pos - self.b_len >= len).then_some(self.b_len)
        } else if self.capacity() - (self.a_pos + self.a_len) >= len {
            Some(self.a_pos + self.a_len)
        } else if self.a_pos >= len {
            Some(0)
        } else {
            None
        }
    }

    /// Reserves a free contiguous run of `len` bytes for writing.
    ///
    /// Returns the run as a mutable slice, or `None` when no contiguous
    /// free run of `len` bytes exists. The bytes become visible to readers
    /// only after [`commit`](Self::commit). A zero-length reserve succeeds
    /// whenever the buffer has a write position at all.
    ///
    /// # Panics
    ///
    /// Panics if a reservation is already outstanding.
    pub fn reserve(&mut self, len: usize) -> Option<&mut [u8]> {
        assert!(
            self.reserved.is_none(),
            "BipBuffer::reserve: reservation already outstanding"
        );
        let pos = self.reservation_pos(len)?;
        self.reserved = Some(Reservation { pos, len });
        Some(&mut self.data[pos..pos + len])
    }

    /// The outstanding reservation, if any.
    #[must_use]
    pub fn reserved(&self) -> Option<&[u8]> {
        self.reserved.map(|r| &self.data[r.pos..r.pos + r.len])
    }

    /// The outstanding reservation as a mutable slice, if any.
    #[must_use]
    pub fn reserved_mut(&mut self) -> Option<&mut [u8]> {
        self.reserved.map(|r| &mut self.data[r.pos..r.pos + r.len])
    }

    /// Publishes `len` bytes of the outstanding reservation and clears it.
    ///
    /// `commit(0)` publishes nothing and only clears the reservation.
    ///
    /// # Panics
    ///
    /// Panics if no reservation is outstanding or `len` exceeds it.
    pub fn commit(&mut self, len: usize) {
        let r = self
            .reserved
            .take()
            .expect("BipBuffer::commit: no outstanding reservation");
        assert!(len <= r.len, "BipBuffer::commit: commit exceeds reservation");
        if len == 0 {
            // Nothing published; renormalize a fully drained buffer.
            if self.is_empty() {
                self.a_pos = 0;
            }
            return;
        }
        if r.pos == self.a_pos + self.a_len {
            self.a_len += len;
        } else {
            debug_assert_eq!(r.pos, self.b_len);
            self.b_len += len;
        }
    }

    /// The oldest committed contiguous slice: A if nonempty, else B.
    #[must_use]
    pub fn peek(&self) -> Option<&[u8]> {
        if self.a_len > 0 {
            Some(&self.data[self.a_pos..self.a_pos + self.a_len])
        } else if self.b_len > 0 {
            Some(&self.data[..self.b_len])
        } else {
            None
        }
    }

    /// Consumes `len` bytes from the front of the committed data.
    ///
    /// Junks spanning the A/B boundary first empty A, then consume from B.
    /// When A drains, B is promoted to be the new A.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the committed length.
    pub fn junk(&mut self, mut len: usize) {
        assert!(len <= self.len(), "BipBuffer::junk: junk past committed data");
        while len > 0 {
            let from_a = len.min(self.a_len);
            self.a_pos += from_a;
            self.a_len -= from_a;
            len -= from_a;
            if self.a_len == 0 {
                self.promote_b();
            }
        }
        if self.a_len == 0 {
            self.promote_b();
        }
    }

    /// A has drained: B (possibly empty) becomes the new A.
    fn promote_b(&mut self) {
        debug_assert_eq!(self.a_len, 0);
        self.a_len = self.b_len;
        self.b_len = 0;
        if self.a_len == 0 {
            // Fully drained. Restart at the reservation so an in-flight
            // commit still lands adjacent to A; otherwise at the origin.
            self.a_pos = self.reserved.map_or(0, |r| r.pos);
        } else {
            self.a_pos = 0;
        }
    }

    /// Moves all committed bytes to the front, collapsing A+B into a single
    /// region starting at 0 and reclaiming the front gap.
    ///
    /// # Panics
    ///
    /// Panics if a reservation is outstanding.
    pub fn compress(&mut self) {
        assert!(
            self.reserved.is_none(),
            "BipBuffer::compress: reservation outstanding"
        );
        if self.b_len > 0 {
            let tail = self.data[..self.b_len].to_vec();
            self.data.copy_within(self.a_pos..self.a_pos + self.a_len, 0);
            self.data[self.a_len..self.a_len + tail.len()].copy_from_slice(&tail);
            self.a_len += tail.len();
            self.b_len = 0;
        } else {
            self.data.copy_within(self.a_pos..self.a_pos + self.a_len, 0);
        }
        self.a_pos = 0;
    }

    /// Replaces the storage with one of `new_capacity` bytes, copying the
    /// committed bytes contiguously to the front.
    ///
    /// # Panics
    ///
    /// Panics if `new_capacity` is smaller than the committed length, or if
    /// a reservation is outstanding.
    pub fn resize(&mut self, new_capacity: usize) {
        assert!(
            self.reserved.is_none(),
            "BipBuffer::resize: reservation outstanding"
        );
        assert!(
            new_capacity >= self.len(),
            "BipBuffer::resize: capacity below committed length"
        );
        let mut fresh = vec![0u8; new_capacity].into_boxed_slice();
        let mut at = 0;
        if self.a_len > 0 {
            fresh[..self.a_len].copy_from_slice(&self.data[self.a_pos..self.a_pos + self.a_len]);
            at = self.a_len;
        }
        if self.b_len > 0 {
            fresh[at..at + self.b_len].copy_from_slice(&self.data[..self.b_len]);
            at += self.b_len;
        }
        self.data = fresh;
        self.a_pos = 0;
        self.a_len = at;
        self.b_len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(buf: &mut BipBuffer, bytes: &[u8]) {
        let slice = buf.reserve(bytes.len()).expect("reserve");
        slice.copy_from_slice(bytes);
        buf.commit(bytes.len());
    }

    #[test]
    fn empty_start() {
        let buf = BipBuffer::new(100);
        assert!(buf.is_empty());
        assert_eq!(buf.len(), 0);
        assert!(buf.peek().is_none());
    }

    #[test]
    fn peek_none_at_zero_capacity() {
        let buf = BipBuffer::new(0);
        assert!(buf.peek().is_none());
    }

    #[test]
    fn write_read_split() {
        let mut buf = BipBuffer::new(16);
        write(&mut buf, b"Test Foo|Bar");
        assert_eq!(buf.len(), 12);
        assert_eq!(buf.peek(), Some(&b"Test Foo|Bar"[..]));
        buf.junk(8);
        assert_eq!(buf.peek(), Some(&b"|Bar"[..]));
    }

    #[test]
    fn fill_exact() {
        let mut buf = BipBuffer::new(15);
        write(&mut buf, b"foo bar baz foo");
        assert_eq!(buf.peek(), Some(&b"foo bar baz foo"[..]));
    }

    #[test]
    fn reserve_overflow() {
        let mut buf = BipBuffer::new(16);
        assert!(buf.reserve(17).is_none());
    }

    #[test]
    fn unused_space_after_wrap() {
        let mut buf = BipBuffer::new(16);
        write(&mut buf, &[b'a'; 8]);
        assert_eq!(buf.unused_space(), 8);
        write(&mut buf, &[b'b'; 7]);
        buf.junk(8);
        assert_eq!(buf.unused_space(), 9);
    }

    #[test]
    fn reservation_opens_region_b() {
        let mut buf = BipBuffer::new(16);
        write(&mut buf, &[1u8; 12]);
        buf.junk(8);
        // Tail holds 4 free bytes, the front 8: a 6-byte run must open B.
        let slice = buf.reserve(6).expect("reserve into B");
        slice.copy_from_slice(&[2u8; 6]);
        buf.commit(6);
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.peek(), Some(&[1u8; 4][..]));
        buf.junk(4);
        assert_eq!(buf.peek(), Some(&[2u8; 6][..]));
    }

    #[test]
    fn junk_spans_regions() {
        let mut buf = BipBuffer::new(16);
        write(&mut buf, &[1u8; 12]);
        buf.junk(8);
        write(&mut buf, &[2u8; 6]);
        buf.junk(7);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.peek(), Some(&[2u8; 3][..]));
    }

    #[test]
    fn zero_length_reserve_and_commit() {
        let mut buf = BipBuffer::new(8);
        write(&mut buf, b"abc");
        let slice = buf.reserve(0).expect("zero reserve");
        assert!(slice.is_empty());
        assert_eq!(buf.peek(), Some(&b"abc"[..]));
        buf.commit(0);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn reservation_survives_peek_and_partial_commit() {
        let mut buf = BipBuffer::new(16);
        write(&mut buf, b"head");
        let slice = buf.reserve(8).expect("reserve");
        slice[..3].copy_from_slice(b"xyz");
        assert_eq!(buf.peek(), Some(&b"head"[..]));
        buf.commit(3);
        assert_eq!(buf.len(), 7);
        assert_eq!(buf.peek(), Some(&b"headxyz"[..]));
    }

    #[test]
    fn commit_lands_after_full_drain() {
        let mut buf = BipBuffer::new(16);
        write(&mut buf, b"abcd");
        let slice = buf.reserve(4).expect("reserve");
        slice.copy_from_slice(b"efgh");
        buf.junk(4);
        buf.commit(4);
        assert_eq!(buf.peek(), Some(&b"efgh"[..]));
    }

    #[test]
    fn compress_reclaims_front() {
        let mut buf = BipBuffer::new(16);
        write(&mut buf, &[1u8; 12]);
        buf.junk(8);
        write(&mut buf, &[2u8; 6]);
        assert_eq!(buf.compress_gain(), 8);
        buf.compress();
        assert_eq!(buf.compress_gain(), 0);
        assert_eq!(buf.len(), 10);
        let mut expect = vec![1u8; 4];
        expect.extend_from_slice(&[2u8; 6]);
        assert_eq!(buf.peek(), Some(&expect[..]));
        // The full free run is contiguous again.
        assert!(buf.can_reserve(6));
    }

    #[test]
    fn resize_preserves_contents() {
        let mut buf = BipBuffer::new(16);
        write(&mut buf, &[1u8; 12]);
        buf.junk(8);
        write(&mut buf, &[2u8; 6]);
        buf.resize(32);
        assert_eq!(buf.capacity(), 32);
        assert_eq!(buf.len(), 10);
        buf.junk(4);
        assert_eq!(buf.peek(), Some(&[2u8; 6][..]));
    }

    #[test]
    #[should_panic(expected = "reservation already outstanding")]
    fn double_reserve_panics() {
        let mut buf = BipBuffer::new(16);
        let _ = buf.reserve(4);
        let _ = buf.reserve(4);
    }

    #[test]
    #[should_panic(expected = "junk past committed data")]
    fn junk_past_length_panics() {
        let mut buf = BipBuffer::new(16);
        write(&mut buf, b"ab");
        buf.junk(3);
    }
}

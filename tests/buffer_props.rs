//! Property tests for the bip-buffer against a byte-queue model.

mod common;

use evloom::BipBuffer;
use proptest::prelude::*;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
enum Op {
    Write(Vec<u8>),
    Junk(usize),
    Compress,
    Grow(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        proptest::collection::vec(any::<u8>(), 0..24).prop_map(Op::Write),
        (0usize..24).prop_map(Op::Junk),
        Just(Op::Compress),
        (0usize..16).prop_map(Op::Grow),
    ]
}

fn drain(buf: &mut BipBuffer) -> Vec<u8> {
    let mut drained = Vec::new();
    loop {
        let chunk = match buf.peek() {
            None => break,
            Some(slice) => slice.to_vec(),
        };
        buf.junk(chunk.len());
        drained.extend(chunk);
    }
    drained
}

proptest! {
    /// Invariants 1, 2, 4, 5, 7: length accounting, round-trip order,
    /// unused-space bounds, junk arithmetic, compress/resize preservation.
    #[test]
    fn operations_match_a_byte_queue_model(
        initial_capacity in 0usize..64,
        ops in proptest::collection::vec(op_strategy(), 0..48),
    ) {
        let mut buf = BipBuffer::new(initial_capacity);
        let mut model: VecDeque<u8> = VecDeque::new();
        let mut capacity = initial_capacity;

        for op in ops {
            match op {
                Op::Write(bytes) => {
                    if let Some(slice) = buf.reserve(bytes.len()) {
                        slice.copy_from_slice(&bytes);
                        buf.commit(bytes.len());
                        model.extend(bytes.iter().copied());
                    }
                }
                Op::Junk(count) => {
                    let count = count.min(buf.len());
                    buf.junk(count);
                    model.drain(..count);
                }
                Op::Compress => buf.compress(),
                Op::Grow(extra) => {
                    capacity += extra;
                    buf.resize(capacity);
                }
            }

            prop_assert_eq!(buf.capacity(), capacity);
            prop_assert_eq!(buf.len(), model.len());
            prop_assert_eq!(buf.is_empty(), model.is_empty());
            prop_assert!(buf.unused_space() <= capacity - buf.len());
            prop_assert!(buf.available() <= capacity - buf.len());
            match buf.peek() {
                None => prop_assert!(model.is_empty()),
                Some(slice) => {
                    prop_assert!(!slice.is_empty());
                    prop_assert!(slice.len() <= model.len());
                    for (offset, byte) in slice.iter().enumerate() {
                        prop_assert_eq!(*byte, model[offset]);
                    }
                }
            }
        }

        let drained = drain(&mut buf);
        let expected: Vec<u8> = model.into_iter().collect();
        prop_assert_eq!(drained, expected);
    }

    /// Invariant 3: an open reservation leaves `peek` untouched, and a
    /// partial commit grows the length by exactly the committed count.
    #[test]
    fn reservation_is_invisible_until_committed(
        prefill in proptest::collection::vec(any::<u8>(), 1..24),
        reserve_len in 1usize..16,
        commit_frac in 0usize..=16,
    ) {
        let mut buf = BipBuffer::new(64);
        let slice = buf.reserve(prefill.len()).expect("prefill fits");
        slice.copy_from_slice(&prefill);
        buf.commit(prefill.len());

        let before = buf.peek().expect("prefilled").to_vec();
        let length = buf.len();

        let slice = buf.reserve(reserve_len).expect("capacity is ample");
        slice.fill(0xAB);
        prop_assert_eq!(buf.peek().expect("unchanged"), &before[..]);

        let committed = commit_frac.min(reserve_len);
        buf.commit(committed);
        prop_assert_eq!(buf.len(), length + committed);
    }

    /// Invariant 6 on the simple contiguous layout: with all committed
    /// bytes in one front-aligned region, a reservation succeeds exactly
    /// when the tail fits it.
    #[test]
    fn front_aligned_reserve_succeeds_iff_tail_fits(
        capacity in 1usize..64,
        used_frac in 0usize..=64,
        want in 0usize..80,
    ) {
        let used = used_frac.min(capacity);
        let mut buf = BipBuffer::new(capacity);
        if let Some(slice) = buf.reserve(used) {
            slice.fill(1);
            buf.commit(used);
        }
        prop_assert_eq!(buf.can_reserve(want), capacity - used >= want);
    }
}

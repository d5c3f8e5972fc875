use super::Operation;
use crate::chunk::Chunk;
use rle::SplitableSpan;

/// Transforms a `Delete(pos, len)` against a concurrent `Insert(ins_pos,
/// ins_chunk)`. When the insertion lands strictly inside the deleted range,
/// the delete can no longer be expressed as one contiguous span — it must
/// skip over the new text, so it splits into the piece before the
/// insertion and the piece after it.
pub(super) fn transform_vs_insert(
    pos: u32,
    len: u32,
    chunk: Option<&Chunk>,
    ins_pos: u32,
    ins_chunk: &Chunk,
) -> Operation {
    let ins_len = ins_chunk.len() as u32;
    let end = pos + len;

    if ins_pos >= end {
        Operation::Delete { pos, len, chunk: chunk.cloned() }
    } else if ins_pos <= pos {
        Operation::Delete { pos: pos + ins_len, len, chunk: chunk.cloned() }
    } else {
        let first_len = ins_pos - pos;
        // After the first half removes `first_len` chars ending exactly at
        // `ins_pos`, the tail (originally at `ins_pos + ins_len`) shifts left
        // by `first_len`, landing at `pos + ins_len`.
        let second_pos = pos + ins_len;
        let second_len = len - first_len;
        let (first_chunk, second_chunk) = match chunk {
            Some(c) => {
                let mut first = c.clone();
                let second = first.truncate(first_len as usize);
                (Some(first), Some(second))
            }
            None => (None, None),
        };
        Operation::Split(
            Box::new(Operation::Delete { pos, len: first_len, chunk: first_chunk }),
            Box::new(Operation::Delete { pos: second_pos, len: second_len, chunk: second_chunk }),
        )
    }
}

/// Transforms a `Delete(p1, l1)` against a concurrent `Delete(p2, l2)`.
pub(super) fn transform_vs_delete(p1: u32, l1: u32, c1: Option<&Chunk>, p2: u32, l2: u32) -> Operation {
    let self_end = p1 + l1;
    let other_end = p2 + l2;

    if self_end <= p2 {
        return Operation::Delete { pos: p1, len: l1, chunk: c1.cloned() };
    }
    if p1 >= other_end {
        return Operation::Delete { pos: p1 - l2, len: l1, chunk: c1.cloned() };
    }
    if p1 >= p2 && self_end <= other_end {
        // Fully enclosed: the other side already removed all of this range.
        return Operation::NoOp;
    }
    if p1 < p2 && self_end > other_end {
        // Self fully encloses the other: the middle was already removed,
        // leaving a surviving prefix and suffix.
        let prefix_len = p2 - p1;
        let suffix_len = self_end - other_end;
        let (prefix_chunk, suffix_chunk) = match c1 {
            Some(c) => {
                let mut prefix = c.clone();
                let mut tail = prefix.truncate(prefix_len as usize);
                let suffix = tail.truncate((other_end - p2) as usize);
                (Some(prefix), Some(suffix))
            }
            None => (None, None),
        };
        // After the prefix half removes `prefix_len` chars ending exactly at
        // `p2`, the surviving suffix (originally at `p2`, since the other
        // side already deleted the middle) shifts left by `prefix_len`,
        // landing back at `p1`.
        return Operation::Split(
            Box::new(Operation::Delete { pos: p1, len: prefix_len, chunk: prefix_chunk }),
            Box::new(Operation::Delete { pos: p1, len: suffix_len, chunk: suffix_chunk }),
        );
    }

    if p1 < p2 {
        // Self's tail overlaps the other's head; only the prefix survives.
        let surviving_len = p2 - p1;
        let chunk = c1.map(|c| {
            let mut c = c.clone();
            c.truncate(surviving_len as usize);
            c
        });
        Operation::Delete { pos: p1, len: surviving_len, chunk }
    } else {
        // Self's head overlaps the other's tail; only the suffix survives.
        let surviving_len = self_end - other_end;
        let chunk = c1.map(|c| {
            let mut c = c.clone();
            c.truncate((other_end - p1) as usize)
        });
        Operation::Delete { pos: p2, len: surviving_len, chunk }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_disjoint_before_unaffected() {
        let result = transform_vs_delete(0, 2, None, 5, 2);
        assert_eq!(result, Operation::delete_irreversible(0, 2));
    }

    #[test]
    fn delete_disjoint_after_shifts() {
        let result = transform_vs_delete(10, 2, None, 2, 3);
        assert_eq!(result, Operation::delete_irreversible(7, 2));
    }

    #[test]
    fn delete_fully_enclosed_becomes_noop() {
        let result = transform_vs_delete(2, 2, None, 0, 10);
        assert_eq!(result, Operation::NoOp);
    }

    #[test]
    fn delete_partial_overlap_keeps_prefix() {
        let chunk = Chunk::single(1, "abcdef");
        let result = transform_vs_delete(0, 6, Some(&chunk), 3, 6);
        assert_eq!(result, Operation::Delete { pos: 0, len: 3, chunk: Some(Chunk::single(1, "abc")) });
    }

    #[test]
    fn delete_partial_overlap_keeps_suffix() {
        // Other's range [0,6) lies entirely before the surviving suffix, so
        // the whole of it shifts left by len 6, landing back at p2 (0).
        let chunk = Chunk::single(1, "abcdef");
        let result = transform_vs_delete(3, 6, Some(&chunk), 0, 6);
        assert_eq!(result, Operation::Delete { pos: 0, len: 3, chunk: Some(Chunk::single(1, "def")) });
    }

    #[test]
    fn delete_enclosing_other_splits_into_prefix_and_suffix() {
        let chunk = Chunk::single(1, "abcdefgh");
        let result = transform_vs_delete(0, 8, Some(&chunk), 3, 2);
        assert_eq!(
            result,
            Operation::Split(
                Box::new(Operation::Delete { pos: 0, len: 3, chunk: Some(Chunk::single(1, "abc")) }),
                Box::new(Operation::Delete { pos: 0, len: 3, chunk: Some(Chunk::single(1, "fgh")) }),
            )
        );
    }

    #[test]
    fn delete_splits_around_concurrent_insert() {
        let chunk = Chunk::single(1, "abcdef");
        let ins = Chunk::single(2, "XY");
        let result = transform_vs_insert(0, 6, Some(&chunk), 3, &ins);
        assert_eq!(
            result,
            Operation::Split(
                Box::new(Operation::Delete { pos: 0, len: 3, chunk: Some(Chunk::single(1, "abc")) }),
                Box::new(Operation::Delete { pos: 2, len: 3, chunk: Some(Chunk::single(1, "def")) }),
            )
        );
    }
}

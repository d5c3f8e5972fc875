use super::ConcurrencyId;
use super::Operation;
use crate::chunk::Chunk;

/// Transforms an `Insert(pos, chunk)` against a concurrent `Insert(other_pos,
/// other_chunk)`.
pub(super) fn transform_vs_insert(
    pos: u32,
    chunk: &Chunk,
    other_pos: u32,
    other_chunk: &Chunk,
    concurrency_id: Option<ConcurrencyId>,
) -> Operation {
    let other_len = other_chunk.len() as u32;
    if pos < other_pos {
        Operation::Insert { pos, chunk: chunk.clone() }
    } else if pos > other_pos {
        Operation::Insert { pos: pos + other_len, chunk: chunk.clone() }
    } else {
        match concurrency_id.expect("need_concurrency_id holds for same-position inserts") {
            ConcurrencyId::After => Operation::Insert { pos: pos + other_len, chunk: chunk.clone() },
            ConcurrencyId::Before => Operation::Insert { pos, chunk: chunk.clone() },
        }
    }
}

/// Transforms an `Insert(pos, chunk)` against a concurrent
/// `Delete(del_pos, del_len)`.
///
/// When `pos` falls strictly inside the deleted range, the text that Delete
/// removed there no longer exists at the remote site; the insertion is
/// pulled to the start of the gap Delete left behind so it still appears,
/// deterministically, at every site.
pub(super) fn transform_vs_delete(pos: u32, chunk: &Chunk, del_pos: u32, del_len: u32) -> Operation {
    if pos <= del_pos {
        Operation::Insert { pos, chunk: chunk.clone() }
    } else if pos >= del_pos + del_len {
        Operation::Insert { pos: pos - del_len, chunk: chunk.clone() }
    } else {
        Operation::Insert { pos: del_pos, chunk: chunk.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_before_delete_unaffected() {
        let result = transform_vs_delete(1, &Chunk::single(1, "X"), 5, 2);
        assert_eq!(result, Operation::insert(1, Chunk::single(1, "X")));
    }

    #[test]
    fn insert_after_delete_shifts_left() {
        let result = transform_vs_delete(10, &Chunk::single(1, "X"), 2, 3);
        assert_eq!(result, Operation::insert(7, Chunk::single(1, "X")));
    }

    #[test]
    fn insert_inside_delete_clamps_to_delete_start() {
        let result = transform_vs_delete(6, &Chunk::single(1, "X"), 2, 10);
        assert_eq!(result, Operation::insert(2, Chunk::single(1, "X")));
    }
}

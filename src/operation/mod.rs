//! Operation algebra: `Insert` / `Delete` / `Split` / `NoOp`, the transform
//! table between them, and how each applies to a [`crate::buffer::Buffer`].
//!
//! A class hierarchy of `InsertOperation` / `DeleteOperation` /
//! `SplitOperation` / `NoOperation` becomes a tagged sum here: there is
//! nothing behind the variants a caller needs to downcast to, so a plain
//! `enum` replaces the hierarchy.

mod delete;
mod insert;
mod split;

pub use split::unsplit;

use crate::buffer::Buffer;
use crate::chunk::Chunk;
use crate::error::ApplyError;
use crate::user::User;

/// Tiebreak direction used only when two `Insert`s land at the same
/// position and causality alone can't order them (`need_concurrency_id`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConcurrencyId {
    /// This operation's author comes before the other in the deterministic
    /// total order; leave `self`'s position unshifted.
    Before,
    /// This operation's author comes after; shift `self` past the other's
    /// insertion.
    After,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OperationFlags {
    pub reversible: bool,
    pub affects_buffer: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Insert { pos: u32, chunk: Chunk },
    /// `chunk: None` is the irreversible form — only a length is carried,
    /// as emitted by a remote peer that didn't need to revert it locally.
    Delete { pos: u32, len: u32, chunk: Option<Chunk> },
    /// Never authored directly; only ever produced by `transform` around an
    /// enclosing region.
    Split(Box<Operation>, Box<Operation>),
    NoOp,
}

impl Operation {
    pub fn insert(pos: u32, chunk: Chunk) -> Self {
        Operation::Insert { pos, chunk }
    }

    pub fn delete_reversible(pos: u32, chunk: Chunk) -> Self {
        let len = chunk.len() as u32;
        Operation::Delete { pos, len, chunk: Some(chunk) }
    }

    pub fn delete_irreversible(pos: u32, len: u32) -> Self {
        Operation::Delete { pos, len, chunk: None }
    }

    pub fn copy(&self) -> Operation {
        self.clone()
    }

    pub fn get_flags(&self) -> OperationFlags {
        match self {
            Operation::Insert { .. } => OperationFlags { reversible: true, affects_buffer: true },
            Operation::Delete { chunk, .. } => {
                OperationFlags { reversible: chunk.is_some(), affects_buffer: true }
            }
            Operation::Split(a, b) => {
                let fa = a.get_flags();
                let fb = b.get_flags();
                OperationFlags {
                    reversible: fa.reversible && fb.reversible,
                    affects_buffer: fa.affects_buffer || fb.affects_buffer,
                }
            }
            Operation::NoOp => OperationFlags { reversible: true, affects_buffer: false },
        }
    }

    /// True only for `Insert` vs `Insert` landing at the same position — the
    /// one case causality can't order and a deterministic tiebreak
    /// (vector compare, then user id) must be supplied by the caller.
    pub fn need_concurrency_id(&self, against: &Operation) -> bool {
        matches!(
            (self, against),
            (Operation::Insert { pos: p1, .. }, Operation::Insert { pos: p2, .. }) if p1 == p2
        )
    }

    /// Produces the operation that undoes this one. Only `Insert` and a
    /// reversible `Delete` carry enough information; `NoOp` reverts to
    /// itself; `Split` reverts each half and reverses their order (undoing
    /// "first a then b" means undoing b before a).
    pub fn revert(&self) -> Result<Operation, ApplyError> {
        match self {
            Operation::Insert { pos, chunk } => {
                Ok(Operation::Delete { pos: *pos, len: chunk.len() as u32, chunk: Some(chunk.clone()) })
            }
            Operation::Delete { pos, chunk: Some(chunk), .. } => {
                Ok(Operation::Insert { pos: *pos, chunk: chunk.clone() })
            }
            Operation::Delete { chunk: None, .. } => Err(ApplyError::NotReversible),
            Operation::Split(a, b) => {
                let rev_b = b.revert()?;
                let rev_a = a.revert()?;
                Ok(Operation::Split(Box::new(rev_b), Box::new(rev_a)))
            }
            Operation::NoOp => Ok(Operation::NoOp),
        }
    }

    /// Applies this operation to `buffer` on behalf of `by`. `Split` applies
    /// its first half, then its second half whose position already
    /// accounts for the first half's effect (computed at transform time).
    pub fn apply(&self, by: &User, buffer: &mut dyn Buffer) -> Result<(), ApplyError> {
        match self {
            Operation::Insert { pos, chunk } => buffer.insert_text(by, *pos, chunk),
            Operation::Delete { pos, len, chunk } => {
                let erased = buffer.erase_text(*pos, *len)?;
                if let Some(expected) = chunk {
                    if expected.to_plain_text() != erased.to_plain_text() {
                        return Err(ApplyError::ContentMismatch);
                    }
                }
                Ok(())
            }
            Operation::Split(a, b) => {
                a.apply(by, buffer)?;
                b.apply(by, buffer)
            }
            Operation::NoOp => Ok(()),
        }
    }

    /// Transforms `self` so that it can be applied after `against` has
    /// already taken effect. `self_lcs`/`against_lcs` are the forms each
    /// operation took at the last state both sides agreed on; they matter
    /// only when recursing through a `Split` (see `split::transform_self`).
    /// `concurrency_id` must be `Some` whenever `need_concurrency_id`
    /// returns true for this pair.
    pub fn transform(
        &self,
        against: &Operation,
        self_lcs: Option<&Operation>,
        against_lcs: Option<&Operation>,
        concurrency_id: Option<ConcurrencyId>,
    ) -> Operation {
        match (self, against) {
            (Operation::NoOp, _) => Operation::NoOp,
            (_, Operation::NoOp) => self.clone(),

            (Operation::Split(a, b), _) => {
                split::transform_self(a, b, against, self_lcs, against_lcs, concurrency_id)
            }
            (_, Operation::Split(a, b)) => {
                split::transform_against(self, a, b, self_lcs, against_lcs, concurrency_id)
            }

            (Operation::Insert { pos, chunk }, Operation::Insert { pos: pos2, chunk: chunk2 }) => {
                insert::transform_vs_insert(*pos, chunk, *pos2, chunk2, concurrency_id)
            }
            (Operation::Insert { pos, chunk }, Operation::Delete { pos: dp, len: dl, .. }) => {
                insert::transform_vs_delete(*pos, chunk, *dp, *dl)
            }
            (Operation::Delete { pos, len, chunk }, Operation::Insert { pos: ip, chunk: ic }) => {
                delete::transform_vs_insert(*pos, *len, chunk.as_ref(), *ip, ic)
            }
            (
                Operation::Delete { pos: p1, len: l1, chunk: c1 },
                Operation::Delete { pos: p2, len: l2, .. },
            ) => delete::transform_vs_delete(*p1, *l1, c1.as_ref(), *p2, *l2),
        }
    }
}

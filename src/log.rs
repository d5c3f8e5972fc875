//! `RequestLog` — one user's append-only, prunable history of `Do`/`Undo`/
//! `Redo` requests, and the association chains linking them.

use crate::error::LogError;
use crate::operation::Operation;
use crate::request::{Request, RequestKind};

struct Entry {
    request: Request,
    /// The operation actually applied to the buffer when this request
    /// committed — already transformed against everything concurrent at
    /// commit time, unlike `request.operation` (the as-authored form, and
    /// `None` for `Undo`/`Redo`). This is what later requests transform
    /// against when this entry turns up as a concurrent sibling, and what
    /// an `Undo`/`Redo` targeting this entry reverts.
    applied_op: Operation,
    /// For `Undo`/`Redo` entries: the absolute index of the request they
    /// cancel. `None` for `Do`.
    associated_target: Option<u32>,
    /// The absolute index of the later `Undo`/`Redo` that cancels this
    /// entry, once one exists.
    associated_by: Option<u32>,
}

/// Ordered, per-user request history indexed by `[begin, end)`. Association
/// chains are tracked with the classic two-stack undo/redo model: `Do` and
/// `Redo` requests push onto `undo_stack` (they're undoable); an `Undo`
/// pops its target off `undo_stack` and pushes itself onto `redo_stack`
/// (it's redoable); a `Redo` pops its target off `redo_stack`.
pub struct RequestLog {
    user: u32,
    begin: u32,
    entries: Vec<Entry>,
    undo_stack: Vec<u32>,
    redo_stack: Vec<u32>,
}

impl RequestLog {
    pub fn new(user: u32) -> Self {
        Self { user, begin: 0, entries: Vec::new(), undo_stack: Vec::new(), redo_stack: Vec::new() }
    }

    pub fn user(&self) -> u32 {
        self.user
    }

    pub fn begin(&self) -> u32 {
        self.begin
    }

    pub fn end(&self) -> u32 {
        self.begin + self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn slot(&self, index: u32) -> Result<usize, LogError> {
        if index < self.begin || index >= self.end() {
            return Err(LogError::IndexOutOfRange { index, begin: self.begin, end: self.end() });
        }
        Ok((index - self.begin) as usize)
    }

    pub fn get(&self, index: u32) -> Result<&Request, LogError> {
        let slot = self.slot(index)?;
        Ok(&self.entries[slot].request)
    }

    /// The operation actually committed to the buffer for the request at
    /// `index` — see [`Entry::applied_op`].
    pub fn applied_op(&self, index: u32) -> Result<&Operation, LogError> {
        let slot = self.slot(index)?;
        Ok(&self.entries[slot].applied_op)
    }

    /// Appends `request`, recording `applied_op` as the operation that was
    /// actually committed to the buffer for it (the transformed form for a
    /// `Do`, or the reverted-and-transformed form for an `Undo`/`Redo` —
    /// both computed by the caller, `crate::algorithm::Algorithm`, before
    /// this call).
    pub fn add_request(&mut self, request: Request, applied_op: Operation) -> Result<u32, LogError> {
        if request.user != self.user {
            return Err(LogError::WrongUser { expected: self.user, got: request.user });
        }
        let expected = self.end();
        let got = request.vector.get(self.user);
        if got != expected {
            return Err(LogError::OutOfSequence { expected, got });
        }

        let index = expected;
        let (associated_target, pushes_undo, pushes_redo) = match request.kind {
            RequestKind::Do => (None, true, false),
            RequestKind::Undo => (self.undo_stack.pop(), false, true),
            RequestKind::Redo => (self.redo_stack.pop(), true, false),
        };

        if let Some(target) = associated_target {
            let target_slot = self.slot(target)?;
            self.entries[target_slot].associated_by = Some(index);
        }

        self.entries.push(Entry { request, applied_op, associated_target, associated_by: None });

        if pushes_undo {
            self.undo_stack.push(index);
        }
        if pushes_redo {
            self.redo_stack.push(index);
        }

        Ok(index)
    }

    pub fn next_associated(&self, index: u32) -> Result<Option<u32>, LogError> {
        let slot = self.slot(index)?;
        Ok(self.entries[slot].associated_by)
    }

    pub fn prev_associated(&self, index: u32) -> Result<Option<u32>, LogError> {
        let slot = self.slot(index)?;
        Ok(self.entries[slot].associated_target)
    }

    /// Follows the association chain back to the originating `Do` request.
    pub fn original_request(&self, index: u32) -> Result<u32, LogError> {
        let mut current = index;
        loop {
            match self.prev_associated(current)? {
                Some(target) => current = target,
                None => return Ok(current),
            }
        }
    }

    /// The request a hypothetical `Undo` issued right now would target.
    pub fn next_undo(&self) -> Option<u32> {
        self.undo_stack.last().copied()
    }

    /// The request a hypothetical `Redo` issued right now would target.
    pub fn next_redo(&self) -> Option<u32> {
        self.redo_stack.last().copied()
    }

    /// The smallest half-open interval `[lo, hi)` containing `index` and
    /// every request transitively linked to it by an association chain:
    /// walking `next_associated` forward to find `hi`, `prev_associated`
    /// backward to find `lo`. Pruning must never split this interval.
    pub fn upper_related(&self, index: u32) -> Result<u32, LogError> {
        let mut hi = index + 1;
        let mut current = index;
        while let Some(next) = self.next_associated(current)? {
            hi = hi.max(next + 1);
            current = next;
        }
        Ok(hi)
    }

    pub fn lower_related(&self, index: u32) -> Result<u32, LogError> {
        let mut lo = index;
        let mut current = index;
        while let Some(prev) = self.prev_associated(current)? {
            lo = lo.min(prev);
            current = prev;
        }
        Ok(lo)
    }

    /// The smallest index `b <= requested_up_to` such that dropping
    /// `[begin, b)` leaves every retained entry's association target
    /// retained too — equivalently, no retained entry's `lower_related`
    /// interval reaches back below `b`.
    fn safe_removal_bound(&self, requested_up_to: u32) -> u32 {
        let mut boundary = requested_up_to.min(self.end());
        loop {
            let violation = (boundary..self.end()).find_map(|i| {
                let slot = (i - self.begin) as usize;
                self.entries[slot].associated_target.filter(|&t| t < boundary)
            });
            match violation {
                Some(t) => boundary = boundary.min(t),
                None => break,
            }
        }
        boundary
    }

    /// Drops retained entries below `up_to`, but never past the point where
    /// doing so would orphan a surviving entry's association target. On a
    /// partial prune, the entries are still dropped up to the safe bound
    /// and the error reports how far that bound actually reached.
    pub fn remove_requests(&mut self, up_to: u32) -> Result<u32, LogError> {
        let safe = self.safe_removal_bound(up_to);
        if safe > self.begin {
            let drop_count = (safe - self.begin) as usize;
            self.entries.drain(0..drop_count);
            self.begin = safe;
        }
        if safe < up_to {
            Err(LogError::UnsafePrune { requested_up_to: up_to, safe_up_to: safe })
        } else {
            Ok(safe)
        }
    }

    /// Adopts a log whose head has already been pruned by a publisher, as
    /// part of synchronization. Only valid on an empty log.
    pub fn set_begin(&mut self, begin: u32) {
        debug_assert!(self.entries.is_empty(), "set_begin is only valid before any requests are added");
        self.begin = begin;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use crate::vector::StateVector;

    fn vector_at(user: u32, n: u32) -> StateVector {
        let mut v = StateVector::new();
        v.set(user, n);
        v
    }

    fn do_request(user: u32, n: u32) -> Request {
        Request::new_do(vector_at(user, n), user, Operation::NoOp, 0)
    }

    fn undo_request(user: u32, n: u32) -> Request {
        Request::new_undo(vector_at(user, n), user, 0)
    }

    fn redo_request(user: u32, n: u32) -> Request {
        Request::new_redo(vector_at(user, n), user, 0)
    }

    #[test]
    fn add_request_enforces_sequence() {
        let mut log = RequestLog::new(1);
        log.add_request(do_request(1, 0), Operation::NoOp).unwrap();
        let err = log.add_request(do_request(1, 5), Operation::NoOp).unwrap_err();
        assert_eq!(err, LogError::OutOfSequence { expected: 1, got: 5 });
    }

    #[test]
    fn add_request_enforces_user() {
        let mut log = RequestLog::new(1);
        let err = log.add_request(do_request(2, 0), Operation::NoOp).unwrap_err();
        assert_eq!(err, LogError::WrongUser { expected: 1, got: 2 });
    }

    #[test]
    fn undo_associates_with_nearest_do() {
        let mut log = RequestLog::new(1);
        log.add_request(do_request(1, 0), Operation::NoOp).unwrap();
        log.add_request(undo_request(1, 1), Operation::NoOp).unwrap();
        assert_eq!(log.prev_associated(1).unwrap(), Some(0));
        assert_eq!(log.next_associated(0).unwrap(), Some(1));
    }

    #[test]
    fn redo_associates_with_nearest_undo() {
        let mut log = RequestLog::new(1);
        log.add_request(do_request(1, 0), Operation::NoOp).unwrap();
        log.add_request(undo_request(1, 1), Operation::NoOp).unwrap();
        log.add_request(redo_request(1, 2), Operation::NoOp).unwrap();
        assert_eq!(log.prev_associated(2).unwrap(), Some(1));
        assert_eq!(log.next_associated(1).unwrap(), Some(2));
    }

    #[test]
    fn next_undo_and_redo_track_the_stacks() {
        let mut log = RequestLog::new(1);
        log.add_request(do_request(1, 0), Operation::NoOp).unwrap();
        assert_eq!(log.next_undo(), Some(0));
        assert_eq!(log.next_redo(), None);

        log.add_request(undo_request(1, 1), Operation::NoOp).unwrap();
        assert_eq!(log.next_undo(), None);
        assert_eq!(log.next_redo(), Some(1));

        log.add_request(redo_request(1, 2), Operation::NoOp).unwrap();
        assert_eq!(log.next_undo(), Some(2));
        assert_eq!(log.next_redo(), None);
    }

    #[test]
    fn original_request_follows_chain_to_root_do() {
        let mut log = RequestLog::new(1);
        log.add_request(do_request(1, 0), Operation::NoOp).unwrap();
        log.add_request(undo_request(1, 1), Operation::NoOp).unwrap();
        log.add_request(redo_request(1, 2), Operation::NoOp).unwrap();
        assert_eq!(log.original_request(2).unwrap(), 0);
    }

    #[test]
    fn pruning_alternating_do_undo_is_fully_safe() {
        let mut log = RequestLog::new(1);
        for i in 0..100u32 {
            if i % 2 == 0 {
                log.add_request(do_request(1, i), Operation::NoOp).unwrap();
            } else {
                log.add_request(undo_request(1, i), Operation::NoOp).unwrap();
            }
        }
        // Every Undo at 2k+1 associates with the Do at 2k, so every pair is
        // self-contained: pruning anywhere on an even boundary is safe.
        let result = log.remove_requests(50);
        assert_eq!(result, Ok(50));
        assert_eq!(log.begin(), 50);
    }

    #[test]
    fn pruning_rejects_cutting_a_live_association() {
        let mut log = RequestLog::new(1);
        log.add_request(do_request(1, 0), Operation::NoOp).unwrap();
        log.add_request(do_request(1, 1), Operation::NoOp).unwrap();
        log.add_request(undo_request(1, 2), Operation::NoOp).unwrap(); // targets index 1, not 0

        // Requesting to prune up to 2 would orphan entry 2's target (1).
        let result = log.remove_requests(2);
        assert_eq!(result, Err(LogError::UnsafePrune { requested_up_to: 2, safe_up_to: 1 }));
        assert_eq!(log.begin(), 1);
    }
}

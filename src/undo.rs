//! `UndoGrouping` — coalesces a local user's adjacent `Do` requests into one
//! atomic undo unit.

use crate::operation::Operation;

/// Advisory metadata attached to a `Do` request: whether it should join the
/// group the previous request belongs to. Serialized alongside the request
/// so a remote site could, in principle, honor the same grouping decision —
/// though this crate only ever acts on it locally.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GroupId(pub u32);

/// Tracks, for one local user, whether the next own `Do` request should be
/// grouped with the previous one, and exposes the default adjacency
/// predicate used to decide it.
pub struct UndoGrouping {
    next_group: GroupId,
    current_group: Option<GroupId>,
    /// Size of the currently open Do group, kept so `undo_size` can report
    /// how many requests a hypothetical group-undo would revert.
    group_size: u32,
    last_op: Option<Operation>,
    /// Requests undone since the last fresh (non-joining) Do group opened,
    /// less any already redone — what `redo_size` reports. Reset to zero
    /// once a genuinely new group starts, since that group's own undo/redo
    /// history is unrelated to whatever was undone before it.
    redo_size: u32,
}

impl UndoGrouping {
    pub fn new() -> Self {
        Self { next_group: GroupId(0), current_group: None, group_size: 0, last_op: None, redo_size: 0 }
    }

    /// Opens a new group, optionally allowed to join onto whatever group was
    /// previously open (`allow_join_prev`).
    pub fn start_group(&mut self, allow_join_prev: bool) -> GroupId {
        if allow_join_prev {
            if let Some(group) = self.current_group {
                return group;
            }
        }
        let group = self.next_group;
        self.next_group = GroupId(group.0 + 1);
        self.current_group = Some(group);
        self.group_size = 0;
        group
    }

    /// Closes the current group. `allow_join_next` keeps it open as the
    /// "previous" group a following `start_group(true)` may rejoin.
    pub fn end_group(&mut self, allow_join_next: bool) {
        if !allow_join_next {
            self.current_group = None;
            self.last_op = None;
        }
    }

    /// Decides whether `next` should join the group `prev` belongs to,
    /// using the default text adjacency predicate: two
    /// `Insert`s chained end-to-start, or two `Delete`s forming a
    /// contiguous backspace or delete-forward run.
    pub fn should_join(prev: &Operation, next: &Operation) -> bool {
        match (prev, next) {
            (Operation::Insert { pos: p1, chunk: c1 }, Operation::Insert { pos: p2, .. }) => {
                *p2 == *p1 + c1.len() as u32
            }
            (
                Operation::Delete { pos: p1, len: l1, .. },
                Operation::Delete { pos: p2, len: _l2, .. },
            ) => {
                // Backspace run: each new delete lands directly before the
                // previous one. Delete-forward run: each new delete lands at
                // the same position as the previous (it keeps eating what's
                // now at the cursor).
                p2 + l1 == *p1 || *p2 == *p1
            }
            _ => false,
        }
    }

    /// Records that `op` just committed as a `Do` for this user, updating
    /// the group membership and the undo-group size counter. Starting a
    /// genuinely new group (one that doesn't join the previous one) clears
    /// `redo_size`, since a fresh edit starts a new undo/redo history.
    pub fn record(&mut self, op: Operation) {
        let joins = match &self.last_op {
            Some(prev) if self.current_group.is_some() => Self::should_join(prev, &op),
            _ => false,
        };
        if !joins {
            self.start_group(false);
            self.redo_size = 0;
        }
        self.group_size += 1;
        self.last_op = Some(op);
    }

    /// Records that an `Undo` request just committed for this user.
    pub fn record_undo(&mut self) {
        self.redo_size += 1;
    }

    /// Records that a `Redo` request just committed for this user.
    pub fn record_redo(&mut self) {
        self.redo_size = self.redo_size.saturating_sub(1);
    }

    pub fn current_group(&self) -> Option<GroupId> {
        self.current_group
    }

    /// Number of requests a group-undo issued right now would revert.
    pub fn undo_size(&self) -> u32 {
        self.group_size
    }

    /// Number of requests a group-redo issued right now would re-apply:
    /// how many of the current user's own requests have been undone since
    /// their last fresh edit, minus any already redone.
    pub fn redo_size(&self) -> u32 {
        self.redo_size
    }
}

impl Default for UndoGrouping {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;

    #[test]
    fn adjacent_inserts_join() {
        let a = Operation::insert(0, Chunk::single(1, "ab"));
        let b = Operation::insert(2, Chunk::single(1, "c"));
        assert!(UndoGrouping::should_join(&a, &b));
    }

    #[test]
    fn non_adjacent_inserts_do_not_join() {
        let a = Operation::insert(0, Chunk::single(1, "ab"));
        let b = Operation::insert(5, Chunk::single(1, "c"));
        assert!(!UndoGrouping::should_join(&a, &b));
    }

    #[test]
    fn backspace_run_joins() {
        let a = Operation::delete_irreversible(5, 1);
        let b = Operation::delete_irreversible(4, 1);
        assert!(UndoGrouping::should_join(&a, &b));
    }

    #[test]
    fn delete_forward_run_joins() {
        let a = Operation::delete_irreversible(3, 1);
        let b = Operation::delete_irreversible(3, 1);
        assert!(UndoGrouping::should_join(&a, &b));
    }

    #[test]
    fn recording_joining_ops_grows_the_same_group() {
        let mut grouping = UndoGrouping::new();
        grouping.record(Operation::insert(0, Chunk::single(1, "a")));
        let first_group = grouping.current_group();
        grouping.record(Operation::insert(1, Chunk::single(1, "b")));
        assert_eq!(grouping.current_group(), first_group);
        assert_eq!(grouping.undo_size(), 2);
    }

    #[test]
    fn recording_disjoint_ops_starts_a_new_group() {
        let mut grouping = UndoGrouping::new();
        grouping.record(Operation::insert(0, Chunk::single(1, "a")));
        let first_group = grouping.current_group();
        grouping.record(Operation::insert(50, Chunk::single(1, "z")));
        assert_ne!(grouping.current_group(), first_group);
        assert_eq!(grouping.undo_size(), 1);
    }

    #[test]
    fn redo_size_grows_with_undo_and_shrinks_with_redo() {
        let mut grouping = UndoGrouping::new();
        grouping.record(Operation::insert(0, Chunk::single(1, "a")));
        assert_eq!(grouping.redo_size(), 0);

        grouping.record_undo();
        assert_eq!(grouping.redo_size(), 1);

        grouping.record_redo();
        assert_eq!(grouping.redo_size(), 0);
    }

    #[test]
    fn a_fresh_do_group_clears_redo_size() {
        let mut grouping = UndoGrouping::new();
        grouping.record(Operation::insert(0, Chunk::single(1, "a")));
        grouping.record_undo();
        assert_eq!(grouping.redo_size(), 1);

        grouping.record(Operation::insert(50, Chunk::single(1, "z")));
        assert_eq!(grouping.redo_size(), 0);
    }
}

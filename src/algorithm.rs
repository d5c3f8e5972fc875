//! `Algorithm` — the transform-and-apply engine that keeps every session
//! member's buffer converging on the same content.
//!
//! This is the one place in the crate that is allowed to know about every
//! other module at once: it owns the [`UserTable`], the [`Buffer`], the
//! current [`StateVector`], and one [`RequestLog`] per user, and it is the
//! only thing that calls [`Operation::transform`] in anger.

use std::cmp::Ordering;
use std::collections::HashMap;

use smallvec::SmallVec;
use tracing::{instrument, trace, warn};

use crate::buffer::Buffer;
use crate::config::AlgorithmConfig;
use crate::error::AlgorithmError;
use crate::log::RequestLog;
use crate::operation::{ConcurrencyId, Operation};
use crate::request::{Request, RequestKind};
use crate::undo::UndoGrouping;
use crate::user::{User, UserTable};
use crate::vector::StateVector;

/// Result of [`Algorithm::receive`]: either the request committed, or it
/// referenced a future it hasn't caught up with yet and was set aside.
/// `Deferred` is not an error — the caller should simply retry once more
/// requests have come in.
#[derive(Debug)]
pub enum ApplyOutcome {
    Applied { index: u32 },
    Deferred,
}

/// One fact an embedder may want to react to, drained the same way
/// [`crate::buffer::Buffer::take_events`] works.
#[derive(Debug, Clone, PartialEq)]
pub enum AlgorithmEvent {
    /// `user`'s request at `index` in their log was just committed.
    ApplyRequest { user: u32, index: u32 },
    CanUndoChanged { user: u32, can_undo: bool },
    CanRedoChanged { user: u32, can_redo: bool },
}

/// A concurrent entry gathered while bringing an operation up to some
/// target vector — almost always zero or one per user, hence `SmallVec`
/// rather than a bare `Vec` to keep small, usually single-element
/// frontiers off the heap.
type ConcurrentSet = SmallVec<[(u32, u32); 4]>;

/// Per-call memo for the recursive undo/redo target resolution
/// (`resolve_at`): `(user, index, target_vector) -> resolved operation`.
/// Bounded by association-chain depth for the duration of one `apply`.
type TranslateCache = HashMap<(u32, u32, StateVector), Operation>;

pub struct Algorithm {
    user_table: UserTable,
    buffer: Box<dyn Buffer>,
    current_vector: StateVector,
    logs: HashMap<u32, RequestLog>,
    groupings: HashMap<u32, UndoGrouping>,
    config: AlgorithmConfig,
    deferred: Vec<Request>,
    events: Vec<AlgorithmEvent>,
}

/// Deterministic total order used to break ties between two otherwise
/// incomparable (mutually concurrent) requests: by state-vector
/// [`StateVector::compare`], then — since two freshly-forked requests
/// compare equal there — by user id, with the *larger* id winning (staying
/// unshifted). The direction is arbitrary but must be fixed and the same at
/// every site; this one is.
fn concurrency_order(a_vector: &StateVector, a_user: u32, b_vector: &StateVector, b_user: u32) -> Ordering {
    match a_vector.compare(b_vector) {
        Ordering::Equal => b_user.cmp(&a_user),
        other => other,
    }
}

impl Algorithm {
    pub fn new(buffer: Box<dyn Buffer>, config: AlgorithmConfig) -> Self {
        Self {
            user_table: UserTable::new(),
            buffer,
            current_vector: StateVector::new(),
            logs: HashMap::new(),
            groupings: HashMap::new(),
            config,
            deferred: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn user_table(&self) -> &UserTable {
        &self.user_table
    }

    pub fn user_table_mut(&mut self) -> &mut UserTable {
        &mut self.user_table
    }

    pub fn buffer(&self) -> &dyn Buffer {
        self.buffer.as_ref()
    }

    pub fn current_vector(&self) -> &StateVector {
        &self.current_vector
    }

    /// Convenience read of the whole buffer as plain text, built only from
    /// the [`Buffer`] trait's own contract (`length` + `get_slice`) so it
    /// works the same whether the backing store is a `TextBuffer` or a
    /// `crate::chat::ChatBuffer`.
    pub fn to_plain_text(&self) -> Result<String, AlgorithmError> {
        let len = self.buffer.length();
        Ok(self.buffer.get_slice(0, len)?.to_plain_text())
    }

    pub fn take_events(&mut self) -> Vec<AlgorithmEvent> {
        std::mem::take(&mut self.events)
    }

    /// Registers `user`, giving it an empty log and undo grouping. A no-op
    /// if the user already has one (e.g. a reconnect).
    pub fn add_user(&mut self, user: User) -> Result<(), AlgorithmError> {
        let id = user.id;
        self.user_table.add_user(user)?;
        self.logs.entry(id).or_insert_with(|| RequestLog::new(id));
        self.groupings.entry(id).or_insert_with(UndoGrouping::new);
        Ok(())
    }

    fn log(&self, user: u32) -> Result<&RequestLog, AlgorithmError> {
        self.logs.get(&user).ok_or(AlgorithmError::Protocol(crate::error::ProtocolError::NoSuchUser { user }))
    }

    /// Public view of a user's retained log, for a publisher walking its
    /// own history while serving a synchronization request.
    pub fn request_log(&self, user: u32) -> Option<&RequestLog> {
        self.logs.get(&user)
    }

    /// Reconstructs an `Algorithm` from a synchronization stream: a
    /// starting buffer snapshot, the participant table, and — per user —
    /// the retained tail of their `RequestLog` (oldest first) together with
    /// the index it begins at (`RequestLog::set_begin`).
    /// `current_vector` is the vector the publisher held at the moment
    /// synchronization began.
    pub fn from_sync(
        buffer: Box<dyn Buffer>,
        config: AlgorithmConfig,
        users: Vec<User>,
        current_vector: StateVector,
        histories: HashMap<u32, (u32, Vec<Request>)>,
    ) -> Result<Self, AlgorithmError> {
        let mut algo = Self::new(buffer, config);
        for user in users {
            algo.add_user(user)?;
        }
        for (user_id, (begin, requests)) in histories {
            let log = algo
                .logs
                .get_mut(&user_id)
                .ok_or(AlgorithmError::Protocol(crate::error::ProtocolError::NoSuchUser { user: user_id }))?;
            log.set_begin(begin);
            for request in requests {
                let applied_op = request.operation.clone().unwrap_or(Operation::NoOp);
                log.add_request(request, applied_op)?;
            }
        }
        algo.current_vector = current_vector;
        Ok(algo)
    }

    pub fn can_undo(&self, user: u32) -> bool {
        self.logs.get(&user).is_some_and(|l| l.next_undo().is_some())
    }

    pub fn can_redo(&self, user: u32) -> bool {
        self.logs.get(&user).is_some_and(|l| l.next_redo().is_some())
    }

    pub fn undo_grouping(&self, user: u32) -> Option<&UndoGrouping> {
        self.groupings.get(&user)
    }

    pub fn undo_grouping_mut(&mut self, user: u32) -> Option<&mut UndoGrouping> {
        self.groupings.get_mut(&user)
    }

    /// Builds and applies a `Do` request for `user`'s own fresh edit, at the
    /// algorithm's current vector. Upgrades a
    /// caller-supplied irreversible delete to reversible by reading the
    /// content straight out of the buffer first, since a local edit always
    /// has the content still in hand.
    #[instrument(skip(self, op), level = "debug")]
    pub fn generate_local(&mut self, user: u32, op: Operation, received: i64) -> Result<Request, AlgorithmError> {
        let op = self.make_reversible_if_local(op)?;
        let vector = self.current_vector.clone();
        let request = Request::new_do(vector, user, op, received);
        self.apply_own(request)
    }

    fn make_reversible_if_local(&self, op: Operation) -> Result<Operation, AlgorithmError> {
        match op {
            Operation::Delete { pos, len, chunk: None } => {
                let chunk = self.buffer.get_slice(pos, len)?;
                Ok(Operation::delete_reversible(pos, chunk))
            }
            other => Ok(other),
        }
    }

    pub fn generate_undo(&mut self, user: u32, received: i64) -> Result<Request, AlgorithmError> {
        if !self.can_undo(user) {
            return Err(AlgorithmError::NothingToUndo);
        }
        let vector = self.current_vector.clone();
        let request = Request::new_undo(vector, user, received);
        self.apply_own(request)
    }

    pub fn generate_redo(&mut self, user: u32, received: i64) -> Result<Request, AlgorithmError> {
        if !self.can_redo(user) {
            return Err(AlgorithmError::NothingToRedo);
        }
        let vector = self.current_vector.clone();
        let request = Request::new_redo(vector, user, received);
        self.apply_own(request)
    }

    /// Shared tail of the three `generate_*` entry points: apply a request
    /// built at the algorithm's own current vector (always immediately
    /// ready — there's nothing to defer), then give `cleanup` a chance to
    /// prune, same as a successful `receive`.
    fn apply_own(&mut self, request: Request) -> Result<Request, AlgorithmError> {
        match self.apply(request.clone())? {
            ApplyOutcome::Applied { .. } => {
                self.cleanup();
                Ok(request)
            }
            ApplyOutcome::Deferred => unreachable!("a request at the current vector is always immediately ready"),
        }
    }

    /// Applies an arbitrary request, local or remote, originating at its own
    /// stated vector. If the request references requests this algorithm
    /// hasn't seen yet it is buffered and `Deferred` is returned; otherwise
    /// it is transformed, applied, committed, and `cleanup` is given a
    /// chance to prune.
    #[instrument(skip(self, request), fields(user = request.user, kind = ?request.kind), level = "debug")]
    pub fn receive(&mut self, request: Request) -> Result<ApplyOutcome, AlgorithmError> {
        let outcome = self.apply(request)?;
        if let ApplyOutcome::Applied { .. } = outcome {
            self.drain_deferred()?;
            self.cleanup();
        }
        Ok(outcome)
    }

    fn causality_satisfied(&self, r_vector: &StateVector, r_user: u32) -> bool {
        if r_vector.get(r_user) != self.current_vector.get(r_user) {
            return false;
        }
        let mut ok = true;
        r_vector.foreach(|user, value| {
            if user != r_user && value > self.current_vector.get(user) {
                ok = false;
            }
        });
        ok
    }

    fn apply(&mut self, request: Request) -> Result<ApplyOutcome, AlgorithmError> {
        if !self.causality_satisfied(&request.vector, request.user) {
            trace!(user = request.user, "deferring request, causality not yet satisfied");
            self.deferred.push(request);
            return Ok(ApplyOutcome::Deferred);
        }

        let mut cache = TranslateCache::new();
        let base_op = match request.kind {
            RequestKind::Do => {
                request.operation.clone().ok_or(AlgorithmError::Protocol(crate::error::ProtocolError::MissingOperation))?
            }
            RequestKind::Undo | RequestKind::Redo => {
                let log = self.log(request.user)?;
                let target = match request.kind {
                    RequestKind::Undo => log.next_undo(),
                    RequestKind::Redo => log.next_redo(),
                    RequestKind::Do => unreachable!(),
                }
                .ok_or(if matches!(request.kind, RequestKind::Undo) {
                    AlgorithmError::NothingToUndo
                } else {
                    AlgorithmError::NothingToRedo
                })?;
                let target_op = self.resolve_at(request.user, target, &request.vector, &mut cache)?;
                target_op.revert()?
            }
        };

        let applied_op = self.transform_forward(base_op, &request.vector, &self.current_vector.clone(), Some(request.user))?;

        let by = self.user_table.require(request.user)?.clone();
        applied_op.apply(&by, self.buffer.as_mut())?;

        let log = self.logs.get_mut(&request.user).ok_or(AlgorithmError::Protocol(crate::error::ProtocolError::NoSuchUser { user: request.user }))?;
        let index = log.add_request(request.clone(), applied_op.clone())?;
        self.current_vector.add(request.user, 1);

        if let Some(grouping) = self.groupings.get_mut(&request.user) {
            match request.kind {
                RequestKind::Do => grouping.record(applied_op),
                RequestKind::Undo => grouping.record_undo(),
                RequestKind::Redo => grouping.record_redo(),
            }
        }

        self.events.push(AlgorithmEvent::ApplyRequest { user: request.user, index });
        self.events.push(AlgorithmEvent::CanUndoChanged { user: request.user, can_undo: self.can_undo(request.user) });
        self.events.push(AlgorithmEvent::CanRedoChanged { user: request.user, can_redo: self.can_redo(request.user) });

        Ok(ApplyOutcome::Applied { index })
    }

    /// Re-attempts every deferred request once the vector has advanced;
    /// repeats until a full pass makes no progress, since one arrival can
    /// unblock a chain of several.
    fn drain_deferred(&mut self) -> Result<(), AlgorithmError> {
        loop {
            let pending = std::mem::take(&mut self.deferred);
            if pending.is_empty() {
                return Ok(());
            }
            let mut made_progress = false;
            for request in pending {
                match self.apply(request)? {
                    ApplyOutcome::Applied { .. } => made_progress = true,
                    ApplyOutcome::Deferred => {}
                }
            }
            if !made_progress {
                return Ok(());
            }
        }
    }

    /// Returns the operation entry `(user, index)` would produce if it were
    /// the thing being committed right now against `target_vector`: for a
    /// `Do` that's just its authored operation; for an `Undo`/`Redo` it's
    /// the revert of its own target, first caught up to this request's own
    /// vantage (recursing through the association chain, strictly
    /// decreasing in index so it always terminates), then carried forward
    /// from there to `target_vector` the same way any other operation is.
    fn resolve_at(&self, user: u32, index: u32, target_vector: &StateVector, cache: &mut TranslateCache) -> Result<Operation, AlgorithmError> {
        let key = (user, index, target_vector.clone());
        if let Some(op) = cache.get(&key) {
            return Ok(op.clone());
        }

        let log = self.log(user)?;
        let req = log.get(index)?.clone();
        let base = match req.kind {
            RequestKind::Do => req.operation.clone().ok_or(AlgorithmError::Protocol(crate::error::ProtocolError::MissingOperation))?,
            RequestKind::Undo | RequestKind::Redo => {
                let assoc = log.prev_associated(index)?.ok_or(AlgorithmError::NothingToUndo)?;
                let assoc_op = self.resolve_at(user, assoc, &req.vector, cache)?;
                assoc_op.revert()?
            }
        };

        let resolved = self.transform_window(base, &req.vector, target_vector, (user, index), cache)?;
        cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    /// Collects every request committed strictly between `from` and `to`
    /// (every user's axis, optionally skipping one user entirely), in the
    /// deterministic order [`concurrency_order`] imposes.
    fn gather_between(&self, from: &StateVector, to: &StateVector, skip_user: Option<u32>) -> Result<ConcurrentSet, AlgorithmError> {
        let mut entries: ConcurrentSet = SmallVec::new();
        for (&user, log) in &self.logs {
            if skip_user == Some(user) {
                continue;
            }
            let lo = from.get(user).max(log.begin());
            let hi = to.get(user).min(log.end());
            let mut i = lo;
            while i < hi {
                entries.push((user, i));
                i += 1;
            }
        }
        entries.sort_by(|&(u1, i1), &(u2, i2)| {
            let v1 = &self.logs[&u1].get(i1).expect("index within gathered range").vector;
            let v2 = &self.logs[&u2].get(i2).expect("index within gathered range").vector;
            concurrency_order(v1, u1, v2, u2)
        });
        Ok(entries)
    }

    /// Brings `op` (already expressed at `from`) forward to `to`, walking
    /// through every concurrent request gathered in between and using each
    /// one's already-committed [`RequestLog::applied_op`] directly — that
    /// value is final the moment it's written (the log entry itself is the
    /// memo), so no further recursive re-derivation is needed here.
    fn transform_forward(&self, mut op: Operation, from: &StateVector, to: &StateVector, skip_user: Option<u32>) -> Result<Operation, AlgorithmError> {
        for (user, index) in self.gather_between(from, to, skip_user)? {
            let log = &self.logs[&user];
            let against_vector = &log.get(index)?.vector;
            let against_op = log.applied_op(index)?;
            let concurrency_id = self.concurrency_id_for(&op, from, skip_user, against_op, against_vector, user);
            op = op.transform(against_op, None, None, concurrency_id);
        }
        Ok(op)
    }

    /// Like [`Self::transform_forward`], but for the window used while
    /// resolving an `Undo`/`Redo` target: the "against" side is the peer's
    /// own base operation rather than a frozen `applied_op`, recursively
    /// resolved to the *same* `to` since these peers may themselves need
    /// catching up past one another.
    fn transform_window(
        &self,
        mut op: Operation,
        from: &StateVector,
        to: &StateVector,
        exclude: (u32, u32),
        cache: &mut TranslateCache,
    ) -> Result<Operation, AlgorithmError> {
        for (user, index) in self.gather_between(from, to, None)? {
            if (user, index) == exclude {
                continue;
            }
            let against_vector = self.log(user)?.get(index)?.vector.clone();
            let against_op = self.resolve_at(user, index, to, cache)?;
            let concurrency_id = self.concurrency_id_for(&op, from, Some(exclude.0), &against_op, &against_vector, user);
            op = op.transform(&against_op, None, None, concurrency_id);
        }
        Ok(op)
    }

    fn concurrency_id_for(
        &self,
        op: &Operation,
        self_vector: &StateVector,
        self_user: Option<u32>,
        against_op: &Operation,
        against_vector: &StateVector,
        against_user: u32,
    ) -> Option<ConcurrencyId> {
        if !op.need_concurrency_id(against_op) {
            return None;
        }
        let self_user = self_user.unwrap_or(0);
        let order = concurrency_order(self_vector, self_user, against_vector, against_user);
        Some(if order == Ordering::Less { ConcurrencyId::Before } else { ConcurrencyId::After })
    }

    /// Prunes every user's log down toward `config.max_total_log_size`,
    /// splitting the budget evenly and letting [`RequestLog::remove_requests`]
    /// clamp each cut to whatever is actually safe.
    fn cleanup(&mut self) {
        let total: u32 = self.logs.values().map(|l| l.end() - l.begin()).sum();
        if total <= self.config.max_total_log_size {
            return;
        }
        let n = self.logs.len().max(1) as u32;
        let per_user_budget = (self.config.max_total_log_size / n).max(1);
        for log in self.logs.values_mut() {
            let desired = log.end().saturating_sub(per_user_budget);
            if desired > log.begin() {
                if let Err(err) = log.remove_requests(desired) {
                    warn!(user = log.user(), ?err, "partial prune, an association chain is still live");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::TextBuffer;
    use crate::chunk::Chunk;

    fn algo() -> Algorithm {
        let mut algo = Algorithm::new(Box::new(TextBuffer::new()), AlgorithmConfig::default());
        algo.add_user(User::local(1, "alice")).unwrap();
        algo.add_user(User::local(2, "bob")).unwrap();
        algo
    }

    fn text(algo: &Algorithm) -> String {
        algo.to_plain_text().unwrap()
    }

    #[test]
    fn local_inserts_apply_directly() {
        let mut algo = algo();
        algo.generate_local(1, Operation::insert(0, Chunk::single(1, "abc")), 0).unwrap();
        assert_eq!(text(&algo), "abc");
        assert_eq!(algo.current_vector().get(1), 1);
    }

    #[test]
    fn concurrent_inserts_at_different_positions_converge() {
        // Two users insert into the same base text
        // at different positions, each unaware of the other.
        let mut u1 = algo_with_text("abc");
        let r1 = u1.generate_local(1, Operation::insert(1, Chunk::single(1, "X")), 0).unwrap();

        let mut u2 = algo_with_text("abc");
        let r2 = u2.generate_local(2, Operation::insert(2, Chunk::single(2, "Y")), 0).unwrap();

        u1.receive(r2).unwrap();
        u2.receive(r1).unwrap();

        assert_eq!(text(&u1), "aXbYc");
        assert_eq!(text(&u1), text(&u2));
    }

    fn algo_with_text(text: &str) -> Algorithm {
        let mut algo = Algorithm::new(Box::new(TextBuffer::from_chunk(Chunk::single(0, text))), AlgorithmConfig::default());
        algo.add_user(User::local(1, "alice")).unwrap();
        algo.add_user(User::local(2, "bob")).unwrap();
        algo
    }

    #[test]
    fn insert_inside_concurrent_delete_clamps_to_delete_start() {
        // Both sites start from the same "abcdef",
        // established outside either user's own history, then U1 deletes
        // "bcde" while U2 concurrently inserts "X" at position 3 (inside
        // the deleted range).
        let mut u1 = algo_with_text("abcdef");
        u1.generate_local(1, Operation::delete_irreversible(1, 4), 0).unwrap();

        let mut u2 = algo_with_text("abcdef");
        let r2 = u2.generate_local(2, Operation::insert(3, Chunk::single(2, "X")), 0).unwrap();

        u1.receive(r2).unwrap();
        assert_eq!(text(&u1), "aXf");
    }

    #[test]
    fn concurrent_delete_splits_around_a_surviving_insert() {
        // Same scenario from the other side: U2's insert must survive when
        // it transforms U1's enclosing delete into a Split around it.
        let mut u1 = algo_with_text("abcdef");
        let r1 = u1.generate_local(1, Operation::delete_irreversible(1, 4), 0).unwrap();

        let mut u2 = algo_with_text("abcdef");
        u2.generate_local(2, Operation::insert(3, Chunk::single(2, "X")), 0).unwrap();

        u2.receive(r1).unwrap();
        assert_eq!(text(&u2), "aXf");
    }

    #[test]
    fn undo_across_a_concurrent_insert_removes_only_its_own_text() {
        // U1 inserts "hello", U2 concurrently
        // inserts "HI" at the start; U1 then undoes its own insert and
        // should end up with exactly U2's text, not a garbled buffer.
        let mut u1 = algo();
        let r1 = u1.generate_local(1, Operation::insert(0, Chunk::single(1, "hello")), 0).unwrap();

        let mut u2 = algo();
        let r2 = u2.generate_local(2, Operation::insert(0, Chunk::single(2, "HI")), 0).unwrap();

        u1.receive(r2).unwrap();
        assert_eq!(text(&u1), "HIhello");

        u2.receive(r1).unwrap();
        assert_eq!(text(&u2), "HIhello");

        u1.generate_undo(1, 0).unwrap();
        assert_eq!(text(&u1), "HI");
    }

    #[test]
    fn out_of_order_remote_request_is_deferred_then_applied() {
        let mut u1 = algo();
        let mut u2 = algo();
        let r_first = u1.generate_local(1, Operation::insert(0, Chunk::single(1, "a")), 0).unwrap();
        let r_second = u1.generate_local(1, Operation::insert(1, Chunk::single(1, "b")), 0).unwrap();

        // r_second references vector {1:1}, which u2 hasn't reached yet — deferred.
        match u2.receive(r_second).unwrap() {
            ApplyOutcome::Deferred => {}
            ApplyOutcome::Applied { .. } => panic!("expected deferral"),
        }
        assert_eq!(u2.current_vector().get(1), 0);

        u2.receive(r_first).unwrap();
        // Catching up to {1:1} should have drained the deferred {1:1} request too.
        assert_eq!(u2.current_vector().get(1), 2);
        assert_eq!(text(&u2), "ab");
    }

    #[test]
    fn undo_and_redo_round_trip_on_an_uncontended_log() {
        let mut algo = algo();
        algo.generate_local(1, Operation::insert(0, Chunk::single(1, "abc")), 0).unwrap();
        assert!(algo.can_undo(1));
        algo.generate_undo(1, 0).unwrap();
        assert_eq!(text(&algo), "");
        assert!(algo.can_redo(1));
        algo.generate_redo(1, 0).unwrap();
        assert_eq!(text(&algo), "abc");
    }

    #[test]
    fn undo_grouping_tracks_redo_size_through_an_undo_redo_cycle() {
        let mut algo = algo();
        algo.generate_local(1, Operation::insert(0, Chunk::single(1, "abc")), 0).unwrap();
        assert_eq!(algo.undo_grouping(1).unwrap().redo_size(), 0);

        algo.generate_undo(1, 0).unwrap();
        assert_eq!(algo.undo_grouping(1).unwrap().redo_size(), 1);

        algo.generate_redo(1, 0).unwrap();
        assert_eq!(algo.undo_grouping(1).unwrap().redo_size(), 0);
    }

    #[test]
    fn undo_with_nothing_to_undo_errors() {
        let mut algo = algo();
        assert_eq!(algo.generate_undo(1, 0).unwrap_err(), AlgorithmError::NothingToUndo);
    }

    #[test]
    fn from_sync_reconstructs_a_usable_algorithm() {
        let mut origin = algo();
        origin.generate_local(1, Operation::insert(0, Chunk::single(1, "abc")), 0).unwrap();
        origin.generate_local(2, Operation::insert(3, Chunk::single(2, "d")), 0).unwrap();

        let mut histories = HashMap::new();
        let log1 = origin.request_log(1).unwrap();
        histories.insert(1, (log1.begin(), (log1.begin()..log1.end()).map(|i| log1.get(i).unwrap().clone()).collect()));
        let log2 = origin.request_log(2).unwrap();
        histories.insert(2, (log2.begin(), (log2.begin()..log2.end()).map(|i| log2.get(i).unwrap().clone()).collect()));

        let users = vec![
            origin.user_table().get(1).cloned().unwrap(),
            origin.user_table().get(2).cloned().unwrap(),
        ];
        let buffer = TextBuffer::from_chunk(origin.buffer().get_slice(0, origin.buffer().length()).unwrap());

        let joined = Algorithm::from_sync(
            Box::new(buffer),
            AlgorithmConfig::default(),
            users,
            origin.current_vector().clone(),
            histories,
        )
        .unwrap();

        assert_eq!(joined.to_plain_text().unwrap(), text(&origin));
        assert_eq!(joined.current_vector(), origin.current_vector());
        assert!(joined.can_undo(1));
    }

    #[test]
    fn cleanup_prunes_down_toward_the_configured_budget() {
        let mut config = AlgorithmConfig::default();
        config.max_total_log_size = 4;
        let mut algo = Algorithm::new(Box::new(TextBuffer::new()), config);
        algo.add_user(User::local(1, "alice")).unwrap();
        for i in 0..20u32 {
            algo.generate_local(1, Operation::insert(i, Chunk::single(1, "x")), 0).unwrap();
        }
        let log = algo.logs.get(&1).unwrap();
        assert!(log.end() - log.begin() <= 4);
    }
}

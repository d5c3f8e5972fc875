//! `Request` — the immutable unit of causality the algorithm transforms and
//! applies.

use crate::operation::Operation;
use crate::vector::StateVector;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestKind {
    Do,
    Undo,
    Redo,
}

/// `{ vector, user, time, kind, operation }`, plus the receive/execute
/// timestamps `inf_adopted_request_get_receive_time` /
/// `..._get_execute_time` carry — kept for replay tooling even though the
/// core algorithm only ever reads `vector`/`user`/`kind`/`operation`.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub vector: StateVector,
    pub user: u32,
    pub kind: RequestKind,
    /// `None` for `Undo`/`Redo`: their effective operation is derived by
    /// looking up the target in the user's log.
    pub operation: Option<Operation>,
    pub received: i64,
    pub execute_time: Option<i64>,
}

impl Request {
    pub fn new_do(vector: StateVector, user: u32, operation: Operation, received: i64) -> Self {
        Self { vector, user, kind: RequestKind::Do, operation: Some(operation), received, execute_time: None }
    }

    pub fn new_undo(vector: StateVector, user: u32, received: i64) -> Self {
        Self { vector, user, kind: RequestKind::Undo, operation: None, received, execute_time: None }
    }

    pub fn new_redo(vector: StateVector, user: u32, received: i64) -> Self {
        Self { vector, user, kind: RequestKind::Redo, operation: None, received, execute_time: None }
    }

    pub fn set_execute_time(&mut self, time: i64) {
        self.execute_time = Some(time);
    }
}

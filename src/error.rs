//! Typed errors for every fallible boundary in the crate.
//!
//! Each enum here is hand-rolled rather than built on `thiserror`: every
//! operation that can fail returns its own typed result, the way
//! `libinfinity` hangs a `GError` domain off of each failing call and the
//! way this crate's own `rle` support crate expects callers to match on
//! concrete variants instead of a boxed `dyn Error`.

use std::fmt;

/// Failure parsing a [`crate::vector::StateVector`] from its wire/string form.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[non_exhaustive]
pub enum VectorParseError {
    /// A component was missing the `:` separator.
    MissingSeparator,
    /// A user id or counter failed to parse as an integer.
    NotANumber,
    /// Components were not listed in strictly ascending user-id order.
    Unsorted,
    /// A component appeared more than once.
    DuplicateUser,
    /// A diff component, applied to its origin, would drive that user's
    /// component negative.
    Underflow { user: u32 },
}

impl fmt::Display for VectorParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorParseError::MissingSeparator => f.write_str("missing ':' in state vector component"),
            VectorParseError::NotANumber => f.write_str("non-numeric state vector component"),
            VectorParseError::Unsorted => f.write_str("state vector components are not in ascending order"),
            VectorParseError::DuplicateUser => f.write_str("state vector contains a duplicate user id"),
            VectorParseError::Underflow { user } => {
                write!(f, "diff for user {user} would drive its component negative")
            }
        }
    }
}

impl std::error::Error for VectorParseError {}

/// An [`crate::operation::Operation`] could not be applied to a [`crate::buffer::Buffer`].
///
/// This is always a fatal, session-ending condition: it indicates the
/// transform pipeline produced an operation inconsistent with the buffer
/// it is being applied to, which should never happen if the algorithm is
/// correct.
#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum ApplyError {
    /// `pos` (or `pos + len`) fell outside the buffer's current length.
    OutOfBounds { pos: u32, len: u32, buffer_len: u32 },
    /// A `Delete` expected to remove content matching its carried chunk,
    /// but the buffer held something else at that position.
    ContentMismatch,
    /// `revert()` was called on a non-reversible operation.
    NotReversible,
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyError::OutOfBounds { pos, len, buffer_len } => write!(
                f,
                "operation at pos {pos} len {len} is out of bounds for a buffer of length {buffer_len}"
            ),
            ApplyError::ContentMismatch => {
                f.write_str("deleted content did not match the buffer's content")
            }
            ApplyError::NotReversible => f.write_str("operation is not reversible"),
        }
    }
}

impl std::error::Error for ApplyError {}

/// Failure appending to or pruning a [`crate::log::RequestLog`].
#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum LogError {
    /// `add_request` was called with a request whose vector component for
    /// this log's user did not equal the log's current `end`.
    OutOfSequence { expected: u32, got: u32 },
    /// The request belongs to a different user than this log.
    WrongUser { expected: u32, got: u32 },
    /// The requested index is outside `[begin, end)`.
    IndexOutOfRange { index: u32, begin: u32, end: u32 },
    /// `remove_requests` was asked to drop a range that would sever an
    /// association chain (an Undo/Redo whose target survives, or vice
    /// versa).
    UnsafePrune { requested_up_to: u32, safe_up_to: u32 },
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogError::OutOfSequence { expected, got } => {
                write!(f, "request out of sequence: expected index {expected}, got {got}")
            }
            LogError::WrongUser { expected, got } => {
                write!(f, "request user {got} does not match log user {expected}")
            }
            LogError::IndexOutOfRange { index, begin, end } => {
                write!(f, "index {index} outside retained range [{begin}, {end})")
            }
            LogError::UnsafePrune { requested_up_to, safe_up_to } => write!(
                f,
                "cannot prune up to {requested_up_to}: would orphan an association, safe bound is {safe_up_to}"
            ),
        }
    }
}

impl std::error::Error for LogError {}

/// A request received from the network (or local UI) violates the
/// session-level protocol. Maps 1:1 onto `INF_ADOPTED_SESSION_ERROR_*` in
/// `libinfinity/adopted/inf-adopted-session.h`.
#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum ProtocolError {
    NoSuchUser { user: u32 },
    MissingOperation,
    InvalidRequest,
    MissingStateVector,
    NotAuthorized { user: u32 },
    TypeMismatch,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::NoSuchUser { user } => write!(f, "no such user: {user}"),
            ProtocolError::MissingOperation => f.write_str("request is missing its operation"),
            ProtocolError::InvalidRequest => f.write_str("request is invalid"),
            ProtocolError::MissingStateVector => f.write_str("request is missing its state vector"),
            ProtocolError::NotAuthorized { user } => write!(f, "user {user} is not authorized"),
            ProtocolError::TypeMismatch => f.write_str("request type does not match its payload"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Failure during the synchronization handshake.
#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum SyncError {
    BadFormat,
    UnexpectedEof,
    BadSessionType,
    CountMismatch { expected: u32, got: u32 },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::BadFormat => f.write_str("malformed synchronization message"),
            SyncError::UnexpectedEof => f.write_str("synchronization stream ended unexpectedly"),
            SyncError::BadSessionType => f.write_str("synchronization session type mismatch"),
            SyncError::CountMismatch { expected, got } => {
                write!(f, "synchronization expected {expected} messages, received {got}")
            }
        }
    }
}

impl std::error::Error for SyncError {}

/// Composition of every error an [`crate::algorithm::Algorithm`] can surface
/// while applying a request, beyond the "not yet causally ready, try again
/// later" case (which is not an error — see
/// [`crate::algorithm::ApplyOutcome::Deferred`]).
#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum AlgorithmError {
    Protocol(ProtocolError),
    Apply(ApplyError),
    Log(LogError),
    /// `generate_undo` was called with nothing left on the user's undo stack.
    NothingToUndo,
    /// `generate_redo` was called with nothing left on the user's redo stack.
    NothingToRedo,
}

impl fmt::Display for AlgorithmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmError::Protocol(e) => write!(f, "{e}"),
            AlgorithmError::Apply(e) => write!(f, "{e}"),
            AlgorithmError::Log(e) => write!(f, "{e}"),
            AlgorithmError::NothingToUndo => f.write_str("nothing to undo"),
            AlgorithmError::NothingToRedo => f.write_str("nothing to redo"),
        }
    }
}

impl std::error::Error for AlgorithmError {}

impl From<ProtocolError> for AlgorithmError {
    fn from(e: ProtocolError) -> Self {
        AlgorithmError::Protocol(e)
    }
}

impl From<ApplyError> for AlgorithmError {
    fn from(e: ApplyError) -> Self {
        AlgorithmError::Apply(e)
    }
}

impl From<LogError> for AlgorithmError {
    fn from(e: LogError) -> Self {
        AlgorithmError::Log(e)
    }
}

/// Composition of every error a [`crate::session::Session`] call can
/// surface, layering the session/handshake-level failures over whatever an
/// [`Algorithm`](crate::algorithm::Algorithm) or the wire codec already
/// reports.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SessionError {
    Sync(SyncError),
    Algorithm(AlgorithmError),
    /// A `<request>`/passthrough message arrived from a connection that is
    /// neither this site's own publisher role nor the trusted publisher.
    NotAuthorized,
    /// An operation only the group's publisher may perform (e.g.
    /// `handle_subscribe`) was attempted by a non-publisher.
    NotPublisher,
    /// The call does not make sense in the session's current
    /// [`crate::session::SessionStatus`].
    WrongStatus,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Sync(e) => write!(f, "{e}"),
            SessionError::Algorithm(e) => write!(f, "{e}"),
            SessionError::NotAuthorized => f.write_str("message did not come from a trusted source"),
            SessionError::NotPublisher => f.write_str("operation requires the publisher role"),
            SessionError::WrongStatus => f.write_str("operation is not valid in the session's current status"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<SyncError> for SessionError {
    fn from(e: SyncError) -> Self {
        SessionError::Sync(e)
    }
}

impl From<AlgorithmError> for SessionError {
    fn from(e: AlgorithmError) -> Self {
        SessionError::Algorithm(e)
    }
}

impl From<ProtocolError> for SessionError {
    fn from(e: ProtocolError) -> Self {
        SessionError::Algorithm(AlgorithmError::Protocol(e))
    }
}

/// Failure reading an on-disk snapshot or replay record. Maps
/// onto the single `REPLAY_BAD_DOCUMENT` wire error code — unlike the
/// network protocol, a corrupt file on disk has no further-distinguishable
/// recovery path for a caller to act on.
#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum PersistError {
    BadFormat,
    UnexpectedEof,
    /// The document's root element was not the expected snapshot/replay
    /// element, or an encoded request inside it failed to parse.
    BadDocument,
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::BadFormat => f.write_str("malformed on-disk document"),
            PersistError::UnexpectedEof => f.write_str("on-disk document ended unexpectedly"),
            PersistError::BadDocument => f.write_str("on-disk document is not a valid session record"),
        }
    }
}

impl std::error::Error for PersistError {}

impl From<ProtocolError> for PersistError {
    fn from(_: ProtocolError) -> Self {
        PersistError::BadDocument
    }
}

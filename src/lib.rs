//! Operational-transformation core for real-time collaborative text and
//! chat sessions, modeled on `libinfinity`'s `adopted` module.
//!
//! The crate has three layers:
//!
//! - [`vector`], [`operation`], [`chunk`], [`request`] — the pure data model
//!   and transform algebra, with no notion of a session or the network.
//! - [`buffer`], [`chat`], [`log`], [`undo`], [`user`] — the mutable state
//!   one participant's [`algorithm::Algorithm`] owns and mutates.
//! - [`wire`], [`session`], [`persist`] — turning that state into bytes: the
//!   XML request/synchronization protocol, the session state machine built
//!   on top of it, and the on-disk snapshot/replay formats.
//!
//! [`config::AlgorithmConfig`] and [`error`] are ambient: every layer reads
//! the former and returns the latter's typed errors rather than panicking
//! or stringifying failures.
//!
//! This crate does not open sockets, spawn threads, or provide a CLI —
//! wiring a [`session::Session`] to an actual transport is left to an
//! embedder, the same way `libinfinity` separates `InfAdoptedSession` from
//! `InfXmlConnection`.

pub mod algorithm;
pub mod buffer;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod error;
pub mod log;
pub mod operation;
pub mod persist;
pub mod request;
pub mod session;
pub mod undo;
pub mod user;
pub mod vector;
pub mod wire;

pub use algorithm::{Algorithm, AlgorithmEvent, ApplyOutcome};
pub use buffer::{Buffer, BufferEvent, TextBuffer};
pub use chunk::{Chunk, Run};
pub use config::AlgorithmConfig;
pub use operation::Operation;
pub use request::{Request, RequestKind};
pub use session::{Session, SessionEvent, SessionStatus};
pub use user::{User, UserTable};
pub use vector::StateVector;

//! `Session` — the synchronization handshake and central-method message
//! routing wrapped around an [`Algorithm`].
//!
//! This crate does not own a transport: a `Session` never opens a socket or
//! schedules I/O itself. Every inbound byte arrives through
//! [`Session::receive_xml`] as one complete top-level XML element, and every
//! outbound effect is a [`SessionEvent`] the caller drains with
//! [`Session::take_events`] and hands to whatever transport it owns.

use std::collections::HashMap;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use tracing::{instrument, trace, warn};

use crate::algorithm::Algorithm;
use crate::chunk::{Chunk, Run};
use crate::config::AlgorithmConfig;
use crate::error::{AlgorithmError, ProtocolError, SessionError, SyncError};
use crate::operation::Operation;
use crate::request::Request;
use crate::user::{User, UserStatus};
use crate::vector::StateVector;
use crate::wire;

/// A session's status machine: `PreSync -> Synchronizing -> Running ->
/// Closed`, with a `Synchronizing -> Closed` edge on `sync-error`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionStatus {
    PreSync,
    Synchronizing,
    Running,
    Closed,
}

/// Effects a `Session` call can produce, drained the same way
/// [`crate::algorithm::Algorithm::take_events`] works.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// XML to hand only to the connection that triggered this call (a
    /// reply to `<subscribe/>`, or this site's own `<request>`/`<sync-ack>`
    /// when it is not the publisher).
    Send(String),
    /// XML a publisher must rebroadcast to every other member verbatim.
    Broadcast(String),
    StatusChanged(SessionStatus),
    SyncFailed(SyncError),
}

/// State accumulated while `Synchronizing`, consumed at `<sync-end/>` to
/// build the final [`Algorithm`] via [`Algorithm::from_sync`].
struct SyncState {
    expected: u32,
    received: u32,
    config: AlgorithmConfig,
    users: Vec<User>,
    histories: HashMap<u32, (u32, Vec<Request>)>,
    buffer_chunk: Chunk,
}

impl SyncState {
    fn new(expected: u32, config: AlgorithmConfig) -> Self {
        Self { expected, received: 0, config, users: Vec::new(), histories: HashMap::new(), buffer_chunk: Chunk::new() }
    }

    fn record_one(&mut self) -> Result<(), SyncError> {
        self.received += 1;
        if self.received > self.expected {
            return Err(SyncError::CountMismatch { expected: self.expected, got: self.received });
        }
        Ok(())
    }
}

pub struct Session {
    algorithm: Option<Algorithm>,
    status: SessionStatus,
    is_publisher: bool,
    sync: Option<SyncState>,
    events: Vec<SessionEvent>,
}

impl Session {
    /// Hosts a document this site originates: immediately `Running` and the
    /// group's publisher.
    pub fn host(algorithm: Algorithm) -> Self {
        Self { algorithm: Some(algorithm), status: SessionStatus::Running, is_publisher: true, sync: None, events: Vec::new() }
    }

    /// Starts a session for a site that is about to join an existing group:
    /// `PreSync`, not the publisher, with no `Algorithm` yet — one is built
    /// once synchronization completes (`Self::on_sync_end`).
    pub fn join() -> Self {
        Self { algorithm: None, status: SessionStatus::PreSync, is_publisher: false, sync: None, events: Vec::new() }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_publisher(&self) -> bool {
        self.is_publisher
    }

    pub fn algorithm(&self) -> Option<&Algorithm> {
        self.algorithm.as_ref()
    }

    pub fn algorithm_mut(&mut self) -> Option<&mut Algorithm> {
        self.algorithm.as_mut()
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.events.push(SessionEvent::StatusChanged(status));
    }

    fn fail_sync(&mut self, err: SyncError) -> SessionError {
        warn!(?err, "synchronization failed, closing session");
        self.sync = None;
        self.set_status(SessionStatus::Closed);
        self.events.push(SessionEvent::SyncFailed(err.clone()));
        if let Ok(xml) = write_sync_error(&err) {
            self.events.push(SessionEvent::Send(xml));
        }
        SessionError::Sync(err)
    }

    pub fn close(&mut self) {
        self.algorithm = None;
        self.sync = None;
        self.set_status(SessionStatus::Closed);
    }

    /// Registers a new participant with the underlying algorithm. Only
    /// meaningful once `Running` (a session still synchronizing receives
    /// its members as part of the handshake instead).
    pub fn add_user(&mut self, user: User) -> Result<(), SessionError> {
        let algo = self.algorithm.as_mut().ok_or(SessionError::WrongStatus)?;
        algo.add_user(user).map_err(SessionError::from)
    }

    /// A joining site's first outbound message.
    pub fn send_subscribe(&mut self) -> Result<(), SessionError> {
        if self.status != SessionStatus::PreSync {
            return Err(SessionError::WrongStatus);
        }
        self.events.push(SessionEvent::Send("<subscribe/>".to_string()));
        Ok(())
    }

    /// Builds and applies a fresh local edit, and queues it for the wire:
    /// broadcast directly if this site is the publisher, otherwise sent
    /// only to the publisher for forwarding. The vector travels as an
    /// absolute value (diffed against the empty vector, the same convention
    /// `write_sync_request` uses) rather than against this site's own
    /// current vector: a receiver has no way to know what that vector was
    /// at send time, and reconstructing against its own current vector
    /// instead would silently fold away exactly the concurrency the
    /// transform step needs to see.
    #[instrument(skip(self, op), level = "debug")]
    pub fn generate_request(&mut self, user: u32, op: Operation, received: i64) -> Result<(), SessionError> {
        if self.status != SessionStatus::Running {
            return Err(SessionError::WrongStatus);
        }
        let algo = self.algorithm.as_mut().ok_or(SessionError::WrongStatus)?;
        let request = algo.generate_local(user, op, received)?;
        trace!(user, is_publisher = self.is_publisher, "queuing locally generated request");
        let xml = wire::write_request(&request, &StateVector::new()).map_err(SessionError::from)?;
        self.events.push(if self.is_publisher { SessionEvent::Broadcast(xml) } else { SessionEvent::Send(xml) });
        Ok(())
    }

    pub fn generate_undo(&mut self, user: u32, received: i64) -> Result<(), SessionError> {
        if self.status != SessionStatus::Running {
            return Err(SessionError::WrongStatus);
        }
        let algo = self.algorithm.as_mut().ok_or(SessionError::WrongStatus)?;
        let request = algo.generate_undo(user, received)?;
        let xml = wire::write_request(&request, &StateVector::new()).map_err(SessionError::from)?;
        self.events.push(if self.is_publisher { SessionEvent::Broadcast(xml) } else { SessionEvent::Send(xml) });
        Ok(())
    }

    pub fn generate_redo(&mut self, user: u32, received: i64) -> Result<(), SessionError> {
        if self.status != SessionStatus::Running {
            return Err(SessionError::WrongStatus);
        }
        let algo = self.algorithm.as_mut().ok_or(SessionError::WrongStatus)?;
        let request = algo.generate_redo(user, received)?;
        let xml = wire::write_request(&request, &StateVector::new()).map_err(SessionError::from)?;
        self.events.push(if self.is_publisher { SessionEvent::Broadcast(xml) } else { SessionEvent::Send(xml) });
        Ok(())
    }

    /// Publisher side of the synchronization handshake: emits the full
    /// synchronization stream for a newly subscribed member as a sequence
    /// of `Send` events the caller delivers, in order, to that member only.
    pub fn handle_subscribe(&mut self) -> Result<(), SessionError> {
        if !self.is_publisher || self.status != SessionStatus::Running {
            return Err(SessionError::NotPublisher);
        }
        let algo = self.algorithm.as_ref().ok_or(SessionError::WrongStatus)?;

        let users: Vec<&User> = algo.user_table().iter().collect();
        let chunk = algo.buffer().get_slice(0, algo.buffer().length()).map_err(AlgorithmError::from)?;
        let mut requests = Vec::new();
        for user in &users {
            if let Some(log) = algo.request_log(user.id) {
                for i in log.begin()..log.end() {
                    requests.push(log.get(i).expect("index within [begin, end)").clone());
                }
            }
        }

        let total = users.len() as u32 + requests.len() as u32 + chunk.runs().len() as u32;
        self.events.push(SessionEvent::Send(write_sync_begin(total)));
        for user in &users {
            self.events.push(SessionEvent::Send(write_sync_user(user, algo.request_log(user.id).map(|l| l.begin()).unwrap_or(0))));
        }
        for request in &requests {
            let xml = wire::write_sync_request(request).map_err(AlgorithmError::from)?;
            self.events.push(SessionEvent::Send(xml));
        }
        for run in chunk.runs() {
            self.events.push(SessionEvent::Send(write_sync_segment(run)?));
        }
        self.events.push(SessionEvent::Send("<sync-end/>".to_string()));
        Ok(())
    }

    /// Entry point for every inbound message, local or remote. `from_publisher`
    /// tells a non-publisher member whether this message actually came from
    /// the group's publisher — required by the central-method forwarding
    /// rule, since a non-publisher trusts only the publisher.
    #[instrument(skip(self, xml), level = "debug")]
    pub fn receive_xml(&mut self, xml: &str, from_publisher: bool) -> Result<(), SessionError> {
        let tag = peek_tag(xml).map_err(|e| self.fail_sync(e))?;
        match (self.status, tag.as_str()) {
            (SessionStatus::PreSync, "sync-begin") => self.on_sync_begin(xml),
            (SessionStatus::Synchronizing, "sync-user") => self.on_sync_user(xml),
            (SessionStatus::Synchronizing, "sync-request") => self.on_sync_request(xml),
            (SessionStatus::Synchronizing, "sync-segment") => self.on_sync_segment(xml),
            (SessionStatus::Synchronizing, "sync-end") => self.on_sync_end(xml),
            (_, "sync-error") => {
                self.sync = None;
                self.set_status(SessionStatus::Closed);
                Err(SessionError::Sync(SyncError::BadFormat))
            }
            (SessionStatus::Running, "request") => self.on_request(xml, from_publisher),
            (SessionStatus::Running, "user-status" | "user-color-change") => self.on_passthrough(xml, from_publisher),
            (SessionStatus::Closed, _) => Err(SessionError::WrongStatus),
            _ => Err(self.fail_sync(SyncError::BadFormat)),
        }
    }

    fn on_sync_begin(&mut self, xml: &str) -> Result<(), SessionError> {
        let expected = read_sync_begin(xml).map_err(|e| self.fail_sync(e))?;
        self.sync = Some(SyncState::new(expected, AlgorithmConfig::default()));
        self.set_status(SessionStatus::Synchronizing);
        Ok(())
    }

    fn on_sync_user(&mut self, xml: &str) -> Result<(), SessionError> {
        let (user, log_begin) = read_sync_user(xml).map_err(|e| self.fail_sync(e))?;
        let sync = self.sync.as_mut().ok_or(SessionError::WrongStatus)?;
        sync.users.push(user.clone());
        sync.histories.entry(user.id).or_insert_with(|| (log_begin, Vec::new()));
        if let Err(e) = self.sync.as_mut().unwrap().record_one() {
            return Err(self.fail_sync(e));
        }
        Ok(())
    }

    fn on_sync_request(&mut self, xml: &str) -> Result<(), SessionError> {
        let request = wire::read_sync_request(xml).map_err(|_| SyncError::BadFormat).map_err(|e| self.fail_sync(e))?;
        let sync = self.sync.as_mut().ok_or(SessionError::WrongStatus)?;
        let entry = sync.histories.entry(request.user).or_insert_with(|| (request.vector.get(request.user), Vec::new()));
        entry.1.push(request);
        if let Err(e) = self.sync.as_mut().unwrap().record_one() {
            return Err(self.fail_sync(e));
        }
        Ok(())
    }

    fn on_sync_segment(&mut self, xml: &str) -> Result<(), SessionError> {
        let run = parse_sync_segment(xml).map_err(|e| self.fail_sync(e))?;
        let sync = self.sync.as_mut().ok_or(SessionError::WrongStatus)?;
        sync.buffer_chunk.push_run(run);
        if let Err(e) = self.sync.as_mut().unwrap().record_one() {
            return Err(self.fail_sync(e));
        }
        Ok(())
    }

    fn on_sync_end(&mut self, _xml: &str) -> Result<(), SessionError> {
        let sync = self.sync.take().ok_or(SessionError::WrongStatus)?;
        if sync.received != sync.expected {
            return Err(self.fail_sync(SyncError::CountMismatch { expected: sync.expected, got: sync.received }));
        }

        let mut current_vector = StateVector::new();
        for (&user, (begin, requests)) in &sync.histories {
            current_vector.set(user, begin + requests.len() as u32);
        }

        let buffer = crate::buffer::TextBuffer::from_chunk(sync.buffer_chunk);
        match Algorithm::from_sync(Box::new(buffer), sync.config, sync.users, current_vector, sync.histories) {
            Ok(algo) => {
                self.algorithm = Some(algo);
                self.set_status(SessionStatus::Running);
                self.events.push(SessionEvent::Send("<sync-ack/>".to_string()));
                Ok(())
            }
            Err(_) => Err(self.fail_sync(SyncError::BadFormat)),
        }
    }

    fn on_request(&mut self, xml: &str, from_publisher: bool) -> Result<(), SessionError> {
        if !self.is_publisher && !from_publisher {
            return Err(SessionError::NotAuthorized);
        }
        let algo = self.algorithm.as_mut().ok_or(SessionError::WrongStatus)?;
        // Mirrors the sender's encoding: the vector travels absolute (diffed
        // against empty), not against this site's own current vector, so a
        // request authored concurrently with something this site hasn't
        // seen yet is not silently folded onto it.
        let request = wire::read_request(xml, &StateVector::new()).map_err(SessionError::from)?;
        algo.receive(request).map_err(SessionError::from)?;
        if self.is_publisher {
            self.events.push(SessionEvent::Broadcast(xml.to_string()));
        }
        Ok(())
    }

    /// `user-status`/`user-color-change` carry no algorithm-relevant
    /// payload this crate models; the publisher still owes every other
    /// member a forward under the same trust rule as `<request>`.
    fn on_passthrough(&mut self, xml: &str, from_publisher: bool) -> Result<(), SessionError> {
        if !self.is_publisher && !from_publisher {
            return Err(SessionError::NotAuthorized);
        }
        if self.is_publisher {
            self.events.push(SessionEvent::Broadcast(xml.to_string()));
        }
        Ok(())
    }
}

fn peek_tag(xml: &str) -> Result<String, SyncError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(|_| SyncError::BadFormat)? {
            Event::Start(e) | Event::Empty(e) => {
                return String::from_utf8(e.name().as_ref().to_vec()).map_err(|_| SyncError::BadFormat);
            }
            Event::Eof => return Err(SyncError::UnexpectedEof),
            _ => {}
        }
    }
}

fn attr(start: &BytesStart, name: &str) -> Result<String, SyncError> {
    start
        .try_get_attribute(name)
        .map_err(|_| SyncError::BadFormat)?
        .ok_or(SyncError::BadFormat)
        .and_then(|a| String::from_utf8(a.value.into_owned()).map_err(|_| SyncError::BadFormat))
}

fn write_sync_begin(num_messages: u32) -> String {
    format!("<sync-begin num-messages=\"{num_messages}\"/>")
}

fn read_sync_begin(xml: &str) -> Result<u32, SyncError> {
    let start = top_level_start(xml)?;
    attr(&start, "num-messages")?.parse().map_err(|_| SyncError::BadFormat)
}

fn write_sync_user(user: &User, log_begin: u32) -> String {
    let status = match user.status {
        UserStatus::Active => "active",
        UserStatus::Inactive => "inactive",
        UserStatus::Unavailable => "unavailable",
    };
    format!(
        "<sync-user id=\"{}\" name=\"{}\" status=\"{status}\" caret=\"{}\" selection=\"{}\" hue=\"{}\" log-begin=\"{log_begin}\"/>",
        user.id, user.name, user.cursor.caret, user.cursor.selection, user.cursor.hue
    )
}

fn read_sync_user(xml: &str) -> Result<(User, u32), SyncError> {
    let start = top_level_start(xml)?;
    let id: u32 = attr(&start, "id")?.parse().map_err(|_| SyncError::BadFormat)?;
    let name = attr(&start, "name")?;
    let status = match attr(&start, "status")?.as_str() {
        "active" => UserStatus::Active,
        "inactive" => UserStatus::Inactive,
        "unavailable" => UserStatus::Unavailable,
        _ => return Err(SyncError::BadFormat),
    };
    let caret: u32 = attr(&start, "caret")?.parse().map_err(|_| SyncError::BadFormat)?;
    let selection: i32 = attr(&start, "selection")?.parse().map_err(|_| SyncError::BadFormat)?;
    let hue: f64 = attr(&start, "hue")?.parse().map_err(|_| SyncError::BadFormat)?;
    let log_begin: u32 = attr(&start, "log-begin")?.parse().map_err(|_| SyncError::BadFormat)?;

    let mut user = User::new(id, name);
    user.status = status;
    user.cursor.caret = caret;
    user.cursor.selection = selection;
    user.cursor.hue = hue;
    Ok((user, log_begin))
}

/// `<sync-segment>` carries plain UTF-8 text, unlike `<operation>`'s base64
/// runs — there is no reason to obscure a full-document
/// snapshot the way a wire-diff payload benefits from being opaque.
fn write_sync_segment(run: &Run) -> Result<String, SessionError> {
    let mut writer = Writer::new(Vec::new());
    let mut start = BytesStart::new("sync-segment");
    start.push_attribute(("author", run.author.to_string().as_str()));
    writer.write_event(Event::Start(start)).map_err(|_| SessionError::from(ProtocolError::InvalidRequest))?;
    writer
        .write_event(Event::Text(BytesText::new(&run.text)))
        .map_err(|_| SessionError::from(ProtocolError::InvalidRequest))?;
    writer
        .write_event(Event::End(BytesEnd::new("sync-segment")))
        .map_err(|_| SessionError::from(ProtocolError::InvalidRequest))?;
    String::from_utf8(writer.into_inner()).map_err(|_| SessionError::from(ProtocolError::InvalidRequest))
}

fn parse_sync_segment(xml: &str) -> Result<Run, SyncError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut author = None;
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(|_| SyncError::BadFormat)? {
            Event::Start(e) if e.name().as_ref() == b"sync-segment" => {
                author = Some(attr(&e, "author")?.parse::<u32>().map_err(|_| SyncError::BadFormat)?);
            }
            Event::Text(t) => {
                text.push_str(&t.unescape().map_err(|_| SyncError::BadFormat)?);
            }
            Event::End(e) if e.name().as_ref() == b"sync-segment" => break,
            Event::Eof => return Err(SyncError::UnexpectedEof),
            _ => {}
        }
    }
    Ok(Run::new(author.ok_or(SyncError::BadFormat)?, text))
}

fn sync_error_code(err: &SyncError) -> &'static str {
    match err {
        SyncError::BadFormat | SyncError::CountMismatch { .. } => "SYNC_BAD_FORMAT",
        SyncError::UnexpectedEof => "SYNC_UNEXPECTED_EOF",
        SyncError::BadSessionType => "SYNC_BAD_SESSION_TYPE",
    }
}

fn write_sync_error(err: &SyncError) -> Result<String, ProtocolError> {
    let mut writer = Writer::new(Vec::new());
    let mut start = BytesStart::new("sync-error");
    start.push_attribute(("domain", "adopted"));
    start.push_attribute(("code", sync_error_code(err)));
    start.push_attribute(("message", err.to_string().as_str()));
    writer.write_event(Event::Empty(start)).map_err(|_| ProtocolError::InvalidRequest)?;
    String::from_utf8(writer.into_inner()).map_err(|_| ProtocolError::InvalidRequest)
}

/// Parses just the attributes of a single self-closed or opening top-level
/// element — used by the small fixed-attribute sync messages that, unlike
/// `<request>`, never need to distinguish `Empty` from `Start` for parsing
/// purposes (callers needing children use their own dedicated reader loop).
fn top_level_start(xml: &str) -> Result<BytesStart<'static>, SyncError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(|_| SyncError::BadFormat)? {
            Event::Start(e) | Event::Empty(e) => return Ok(e.into_owned()),
            Event::Eof => return Err(SyncError::UnexpectedEof),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::TextBuffer;
    use crate::config::AlgorithmConfig;

    fn publisher_with(text: &str) -> Session {
        let algo = Algorithm::new(Box::new(TextBuffer::from_chunk(Chunk::single(0, text))), AlgorithmConfig::default());
        let mut session = Session::host(algo);
        session.add_user(User::local(1, "alice")).unwrap();
        session.take_events();
        session
    }

    #[test]
    fn generate_request_as_publisher_broadcasts() {
        let mut session = publisher_with("abc");
        session.generate_request(1, Operation::insert(0, Chunk::single(1, "X")), 0).unwrap();
        let events = session.take_events();
        assert!(matches!(events.as_slice(), [SessionEvent::Broadcast(xml)] if xml.contains("type=\"insert\"")));
        assert_eq!(session.algorithm().unwrap().to_plain_text().unwrap(), "Xabc");
    }

    #[test]
    fn non_publisher_rejects_a_request_not_from_the_publisher() {
        let algo = Algorithm::new(Box::new(TextBuffer::new()), AlgorithmConfig::default());
        let mut member = Session::host(algo);
        member.is_publisher = false;
        member.add_user(User::new(9, "mallory")).unwrap();
        member.take_events();

        let mut vector = StateVector::new();
        vector.set(9, 0);
        let forged = Request::new_do(vector, 9, Operation::insert(0, Chunk::single(9, "evil")), 0);
        let xml = wire::write_request(&forged, &StateVector::new()).unwrap();

        let result = member.receive_xml(&xml, false);
        assert_eq!(result, Err(SessionError::NotAuthorized));
    }

    #[test]
    fn full_sync_handshake_reaches_running_with_matching_content() {
        let mut publisher = publisher_with("hello");
        publisher.generate_request(1, Operation::insert(5, Chunk::single(1, " world")), 0).unwrap();
        publisher.take_events();

        publisher.handle_subscribe().unwrap();
        let messages: Vec<String> = publisher
            .take_events()
            .into_iter()
            .map(|e| match e {
                SessionEvent::Send(xml) => xml,
                other => panic!("unexpected event during sync: {other:?}"),
            })
            .collect();

        let mut joiner = Session::join();
        joiner.send_subscribe().unwrap();
        joiner.take_events();

        for message in &messages {
            joiner.receive_xml(message, true).unwrap();
        }

        assert_eq!(joiner.status(), SessionStatus::Running);
        assert_eq!(joiner.algorithm().unwrap().to_plain_text().unwrap(), "hello world");
        assert_eq!(joiner.algorithm().unwrap().current_vector(), publisher.algorithm().unwrap().current_vector());

        let events = joiner.take_events();
        assert!(matches!(events.as_slice(), [SessionEvent::Send(xml)] if xml == "<sync-ack/>"));
    }

    #[test]
    fn sync_end_with_wrong_count_fails_and_closes() {
        let mut joiner = Session::join();
        joiner.receive_xml("<sync-begin num-messages=\"2\"/>", true).unwrap();
        joiner.take_events();

        let result = joiner.receive_xml("<sync-end/>", true);
        assert!(result.is_err());
        assert_eq!(joiner.status(), SessionStatus::Closed);
    }
}

//! On-disk snapshot and replay-record formats.
//!
//! Neither format is owned by [`crate::session::Session`] — both are pure
//! serialization functions an embedder calls directly, the way `libinfinity`
//! leaves loading/saving a buffer to `InfTextSession`'s own I/O helpers
//! rather than folding it into the session state machine. A replay record
//! additionally doubles as the fixture format for Scenario F-style
//! regression tests: record a live session's traffic once, replay it
//! deterministically forever after.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::chunk::{Chunk, Run};
use crate::error::PersistError;
use crate::request::Request;
use crate::wire;

/// Writes `<inf-text-session><buffer><segment author="u">…</segment>…</buffer></inf-text-session>`
/// for `chunk`, one `<segment>` per run.
pub fn write_snapshot(chunk: &Chunk) -> Result<String, PersistError> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Start(BytesStart::new("inf-text-session")))
        .map_err(|_| PersistError::BadFormat)?;
    write_buffer(&mut writer, chunk)?;
    writer
        .write_event(Event::End(BytesEnd::new("inf-text-session")))
        .map_err(|_| PersistError::BadFormat)?;
    String::from_utf8(writer.into_inner()).map_err(|_| PersistError::BadFormat)
}

fn write_buffer(writer: &mut Writer<Vec<u8>>, chunk: &Chunk) -> Result<(), PersistError> {
    writer.write_event(Event::Start(BytesStart::new("buffer"))).map_err(|_| PersistError::BadFormat)?;
    for run in chunk.runs() {
        write_segment(writer, run)?;
    }
    writer.write_event(Event::End(BytesEnd::new("buffer"))).map_err(|_| PersistError::BadFormat)?;
    Ok(())
}

fn write_segment(writer: &mut Writer<Vec<u8>>, run: &Run) -> Result<(), PersistError> {
    let mut start = BytesStart::new("segment");
    start.push_attribute(("author", run.author.to_string().as_str()));
    writer.write_event(Event::Start(start)).map_err(|_| PersistError::BadFormat)?;
    writer.write_event(Event::Text(BytesText::new(&run.text))).map_err(|_| PersistError::BadFormat)?;
    writer.write_event(Event::End(BytesEnd::new("segment"))).map_err(|_| PersistError::BadFormat)?;
    Ok(())
}

/// Parses a document previously produced by [`write_snapshot`] back into a
/// [`Chunk`] an embedder hands to [`crate::buffer::TextBuffer::from_chunk`].
pub fn read_snapshot(xml: &str) -> Result<Chunk, PersistError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    expect_start(&mut reader, "inf-text-session")?;
    expect_start(&mut reader, "buffer")?;
    let chunk = read_segments(&mut reader, "buffer")?;
    expect_end(&mut reader, "inf-text-session")?;
    Ok(chunk)
}

fn read_segments(reader: &mut Reader<&[u8]>, close_tag: &str) -> Result<Chunk, PersistError> {
    let mut chunk = Chunk::new();
    let mut pending_author: Option<u32> = None;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(|_| PersistError::BadFormat)? {
            Event::Start(e) if e.name().as_ref() == b"segment" => {
                let author: u32 = attr(&e, "author")?.parse().map_err(|_| PersistError::BadFormat)?;
                pending_author = Some(author);
            }
            Event::Text(t) => {
                if let Some(author) = pending_author {
                    let text = t.unescape().map_err(|_| PersistError::BadFormat)?;
                    chunk.push_run(Run::new(author, text.into_owned()));
                }
            }
            Event::End(e) if e.name().as_ref() == b"segment" => pending_author = None,
            Event::End(e) if e.name().as_ref().eq(close_tag.as_bytes()) => return Ok(chunk),
            Event::Eof => return Err(PersistError::UnexpectedEof),
            _ => {}
        }
        buf.clear();
    }
}

fn expect_start(reader: &mut Reader<&[u8]>, tag: &str) -> Result<(), PersistError> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(|_| PersistError::BadFormat)? {
            Event::Start(e) if e.name().as_ref().eq(tag.as_bytes()) => return Ok(()),
            Event::Eof => return Err(PersistError::UnexpectedEof),
            _ => {}
        }
        buf.clear();
    }
}

fn expect_end(reader: &mut Reader<&[u8]>, tag: &str) -> Result<(), PersistError> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(|_| PersistError::BadFormat)? {
            Event::End(e) if e.name().as_ref().eq(tag.as_bytes()) => return Ok(()),
            Event::Eof => return Err(PersistError::UnexpectedEof),
            _ => {}
        }
        buf.clear();
    }
}

fn attr(start: &BytesStart, name: &str) -> Result<String, PersistError> {
    start
        .try_get_attribute(name)
        .map_err(|_| PersistError::BadFormat)?
        .ok_or(PersistError::BadFormat)
        .and_then(|a| String::from_utf8(a.value.into_owned()).map_err(|_| PersistError::BadFormat))
}

/// `<infinote-adopted-session-record>` — the initial snapshot plus every
/// request a session received afterward, in reception order.
/// Each request is carried with an absolute vector, the same convention
/// [`wire::write_sync_request`] uses, since a replay record has no shared
/// baseline vector to diff against either.
pub struct ReplayRecord {
    pub snapshot: Chunk,
    pub requests: Vec<Request>,
}

pub fn write_replay_record(record: &ReplayRecord) -> Result<String, PersistError> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Start(BytesStart::new("infinote-adopted-session-record")))
        .map_err(|_| PersistError::BadFormat)?;
    writer
        .write_event(Event::Start(BytesStart::new("inf-text-session")))
        .map_err(|_| PersistError::BadFormat)?;
    write_buffer(&mut writer, &record.snapshot)?;
    writer
        .write_event(Event::End(BytesEnd::new("inf-text-session")))
        .map_err(|_| PersistError::BadFormat)?;

    writer
        .write_event(Event::Start(BytesStart::new("received-requests")))
        .map_err(|_| PersistError::BadFormat)?;
    for request in &record.requests {
        let xml = wire::write_sync_request(request)?;
        writer
            .write_event(Event::Text(BytesText::from_escaped(xml)))
            .map_err(|_| PersistError::BadFormat)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("received-requests")))
        .map_err(|_| PersistError::BadFormat)?;
    writer
        .write_event(Event::End(BytesEnd::new("infinote-adopted-session-record")))
        .map_err(|_| PersistError::BadFormat)?;

    String::from_utf8(writer.into_inner()).map_err(|_| PersistError::BadFormat)
}

pub fn read_replay_record(xml: &str) -> Result<ReplayRecord, PersistError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    expect_start(&mut reader, "infinote-adopted-session-record")?;
    expect_start(&mut reader, "inf-text-session")?;
    expect_start(&mut reader, "buffer")?;
    let snapshot = read_segments(&mut reader, "buffer")?;
    expect_end(&mut reader, "inf-text-session")?;
    expect_start(&mut reader, "received-requests")?;

    let mut requests = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(|_| PersistError::BadFormat)? {
            Event::Text(t) => {
                let raw = t.unescape().map_err(|_| PersistError::BadFormat)?;
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    requests.push(wire::read_sync_request(trimmed)?);
                }
            }
            Event::End(e) if e.name().as_ref() == b"received-requests" => break,
            Event::Eof => return Err(PersistError::UnexpectedEof),
            _ => {}
        }
        buf.clear();
    }
    expect_end(&mut reader, "infinote-adopted-session-record")?;

    Ok(ReplayRecord { snapshot, requests })
}

/// Replays a recorded session against a fresh [`crate::algorithm::Algorithm`]
/// built from the record's snapshot, applying every request in order. The
/// caller supplies the algorithm (already populated with the right users and
/// config) so replay shares exactly the causality/apply path a live session
/// uses.
pub fn replay_into(
    algorithm: &mut crate::algorithm::Algorithm,
    record: &ReplayRecord,
) -> Result<(), crate::error::AlgorithmError> {
    for request in &record.requests {
        algorithm.receive(request.clone())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::Algorithm;
    use crate::buffer::TextBuffer;
    use crate::config::AlgorithmConfig;
    use crate::operation::Operation;
    use crate::user::User;

    #[test]
    fn snapshot_roundtrips_multiple_authors() {
        let mut chunk = Chunk::new();
        chunk.push_run(Run::new(1, "hello "));
        chunk.push_run(Run::new(2, "world"));

        let xml = write_snapshot(&chunk).unwrap();
        assert!(xml.starts_with("<inf-text-session>"));
        let parsed = read_snapshot(&xml).unwrap();
        assert_eq!(parsed.to_plain_text(), "hello world");
        assert_eq!(parsed.runs().len(), 2);
    }

    #[test]
    fn empty_snapshot_roundtrips() {
        let xml = write_snapshot(&Chunk::new()).unwrap();
        let parsed = read_snapshot(&xml).unwrap();
        assert!(parsed.is_empty());
    }

    fn algo_with(text: &str) -> Algorithm {
        let mut algo = Algorithm::new(Box::new(TextBuffer::from_chunk(Chunk::single(0, text))), AlgorithmConfig::default());
        algo.add_user(User::local(1, "alice")).unwrap();
        algo
    }

    #[test]
    fn replay_record_roundtrips_and_reconstructs_history() {
        let mut origin = algo_with("ab");
        let r1 = origin.generate_local(1, Operation::insert(2, Chunk::single(1, "c")), 0).unwrap();
        let r2 = origin.generate_local(1, Operation::insert(3, Chunk::single(1, "d")), 0).unwrap();

        let record = ReplayRecord { snapshot: Chunk::single(0, "ab"), requests: vec![r1, r2] };
        let xml = write_replay_record(&record).unwrap();
        assert!(xml.starts_with("<infinote-adopted-session-record>"));

        let parsed = read_replay_record(&xml).unwrap();
        assert_eq!(parsed.snapshot.to_plain_text(), "ab");
        assert_eq!(parsed.requests.len(), 2);

        let mut replayed = algo_with("ab");
        replay_into(&mut replayed, &parsed).unwrap();
        assert_eq!(replayed.to_plain_text().unwrap(), origin.to_plain_text().unwrap());
    }

    #[test]
    fn truncated_replay_record_is_rejected() {
        let xml = "<infinote-adopted-session-record><inf-text-session><buffer/>";
        assert_eq!(read_replay_record(xml), Err(PersistError::UnexpectedEof));
    }
}

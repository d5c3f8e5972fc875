//! XML wire encoding for `Request`/`Operation` and the synchronization
//! envelope. `quick-xml` does the tokenizing; this module
//! owns the schema itself, since none of the reference repos carries an
//! XML layer of its own to imitate.
//!
//! Chunk payloads are written as `<run author="u">base64</run>` children of
//! the enclosing `<operation>` rather than one flat blob, so per-character
//! authorship survives the wire without a side channel.

use base64::Engine;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::chunk::{Chunk, Run};
use crate::error::ProtocolError;
use crate::operation::Operation;
use crate::request::{Request, RequestKind};
use crate::vector::StateVector;

fn b64_encode(s: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(s.as_bytes())
}

fn b64_decode(s: &str) -> Result<String, ProtocolError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|_| ProtocolError::InvalidRequest)?;
    String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidRequest)
}

/// Writes `<operation>...</operation>` for `op`, recursing through `Split`.
pub fn write_operation(writer: &mut Writer<Vec<u8>>, op: &Operation) -> Result<(), ProtocolError> {
    match op {
        Operation::Insert { pos, chunk } => {
            let mut start = BytesStart::new("operation");
            start.push_attribute(("type", "insert"));
            start.push_attribute(("pos", pos.to_string().as_str()));
            writer.write_event(Event::Start(start)).map_err(|_| ProtocolError::InvalidRequest)?;
            write_runs(writer, chunk)?;
            writer
                .write_event(Event::End(BytesEnd::new("operation")))
                .map_err(|_| ProtocolError::InvalidRequest)?;
        }
        Operation::Delete { pos, len, chunk } => {
            let mut start = BytesStart::new("operation");
            start.push_attribute(("type", "delete"));
            start.push_attribute(("pos", pos.to_string().as_str()));
            start.push_attribute(("len", len.to_string().as_str()));
            writer.write_event(Event::Start(start)).map_err(|_| ProtocolError::InvalidRequest)?;
            if let Some(chunk) = chunk {
                write_runs(writer, chunk)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("operation")))
                .map_err(|_| ProtocolError::InvalidRequest)?;
        }
        Operation::Split(a, b) => {
            let mut start = BytesStart::new("operation");
            start.push_attribute(("type", "split"));
            writer.write_event(Event::Start(start)).map_err(|_| ProtocolError::InvalidRequest)?;
            write_operation(writer, a)?;
            write_operation(writer, b)?;
            writer
                .write_event(Event::End(BytesEnd::new("operation")))
                .map_err(|_| ProtocolError::InvalidRequest)?;
        }
        Operation::NoOp => {
            let mut start = BytesStart::new("operation");
            start.push_attribute(("type", "no-op"));
            writer.write_event(Event::Empty(start)).map_err(|_| ProtocolError::InvalidRequest)?;
        }
    }
    Ok(())
}

fn write_runs(writer: &mut Writer<Vec<u8>>, chunk: &Chunk) -> Result<(), ProtocolError> {
    for run in chunk.runs() {
        let mut start = BytesStart::new("run");
        start.push_attribute(("author", run.author.to_string().as_str()));
        writer.write_event(Event::Start(start)).map_err(|_| ProtocolError::InvalidRequest)?;
        writer
            .write_event(Event::Text(BytesText::new(&b64_encode(&run.text))))
            .map_err(|_| ProtocolError::InvalidRequest)?;
        writer
            .write_event(Event::End(BytesEnd::new("run")))
            .map_err(|_| ProtocolError::InvalidRequest)?;
    }
    Ok(())
}

/// Parses one `<operation>` element. `is_empty` tells us whether the start
/// tag we were handed was self-closing (`<operation ... />`, no children to
/// read at all) or opening (`<operation ...>`, with `run`/nested-`operation`
/// children terminated by a matching `</operation>`).
pub fn read_operation(reader: &mut Reader<&[u8]>, start: &BytesStart, is_empty: bool) -> Result<Operation, ProtocolError> {
    let kind = attr(start, "type")?;

    match kind.as_str() {
        "no-op" => Ok(Operation::NoOp),
        "insert" => {
            let pos: u32 = attr(start, "pos")?.parse().map_err(|_| ProtocolError::InvalidRequest)?;
            let chunk = if is_empty { Chunk::new() } else { read_runs_until_close(reader, "operation")? };
            Ok(Operation::Insert { pos, chunk })
        }
        "delete" => {
            let pos: u32 = attr(start, "pos")?.parse().map_err(|_| ProtocolError::InvalidRequest)?;
            let len: u32 = attr(start, "len")?.parse().map_err(|_| ProtocolError::InvalidRequest)?;
            let chunk = if is_empty { Chunk::new() } else { read_runs_until_close(reader, "operation")? };
            let chunk = if chunk.is_empty() { None } else { Some(chunk) };
            Ok(Operation::Delete { pos, len, chunk })
        }
        "split" => {
            if is_empty {
                return Err(ProtocolError::InvalidRequest);
            }
            let mut children = Vec::new();
            loop {
                let mut buf = Vec::new();
                match reader.read_event_into(&mut buf).map_err(|_| ProtocolError::InvalidRequest)? {
                    Event::Start(e) if e.name().as_ref() == b"operation" => {
                        children.push(read_operation(reader, &e.to_owned(), false)?);
                    }
                    Event::Empty(e) if e.name().as_ref() == b"operation" => {
                        children.push(read_operation(reader, &e.to_owned(), true)?);
                    }
                    Event::End(e) if e.name().as_ref() == b"operation" => break,
                    Event::Eof => return Err(ProtocolError::InvalidRequest),
                    _ => {}
                }
            }
            if children.len() != 2 {
                return Err(ProtocolError::InvalidRequest);
            }
            let mut it = children.into_iter();
            let a = it.next().unwrap();
            let b = it.next().unwrap();
            Ok(Operation::Split(Box::new(a), Box::new(b)))
        }
        _ => Err(ProtocolError::InvalidRequest),
    }
}

/// Reads `<run author="u">base64</run>` children until the enclosing
/// `close_tag` end event, building up a `Chunk`.
fn read_runs_until_close(reader: &mut Reader<&[u8]>, close_tag: &str) -> Result<Chunk, ProtocolError> {
    let mut chunk = Chunk::new();
    let mut pending_author: Option<u32> = None;
    loop {
        let mut buf = Vec::new();
        match reader.read_event_into(&mut buf).map_err(|_| ProtocolError::InvalidRequest)? {
            Event::Start(e) if e.name().as_ref() == b"run" => {
                let author: u32 = attr(&e, "author")?.parse().map_err(|_| ProtocolError::InvalidRequest)?;
                pending_author = Some(author);
            }
            Event::Text(t) => {
                if let Some(author) = pending_author {
                    let text = t.unescape().map_err(|_| ProtocolError::InvalidRequest)?;
                    let decoded = b64_decode(&text)?;
                    chunk.push_run(Run::new(author, decoded));
                }
            }
            Event::End(e) if e.name().as_ref() == b"run" => {
                pending_author = None;
            }
            Event::End(e) if e.name().as_ref().eq(close_tag.as_bytes()) => break,
            Event::Eof => return Err(ProtocolError::InvalidRequest),
            _ => {}
        }
    }
    Ok(chunk)
}

fn attr(start: &BytesStart, name: &str) -> Result<String, ProtocolError> {
    start
        .try_get_attribute(name)
        .map_err(|_| ProtocolError::InvalidRequest)?
        .ok_or(ProtocolError::InvalidRequest)
        .and_then(|a| {
            String::from_utf8(a.value.into_owned()).map_err(|_| ProtocolError::InvalidRequest)
        })
}

/// Writes `<request user="u" vector="V-diff" time="T" type="do|undo|redo">`,
/// with an `<operation>` child for `Do` requests (matching
/// `inf_adopted_session_write_request_info`).
pub fn write_request(request: &Request, diff_origin: &StateVector) -> Result<String, ProtocolError> {
    write_request_tagged("request", request, diff_origin)
}

/// Same schema as [`write_request`] under the element name `<sync-request>`
/// — the form the synchronization handshake uses to transfer a retained
/// request from a publisher's log to a joining member. There
/// is no shared "current vector" to diff against yet during sync, so the
/// vector is written out in full (diffed against the empty vector, which
/// [`StateVector::to_string_diff`] reduces to the canonical form).
pub fn write_sync_request(request: &Request) -> Result<String, ProtocolError> {
    write_request_tagged("sync-request", request, &StateVector::new())
}

fn write_request_tagged(tag: &str, request: &Request, diff_origin: &StateVector) -> Result<String, ProtocolError> {
    let mut writer = Writer::new(Vec::new());
    let mut start = BytesStart::new(tag);
    start.push_attribute(("user", request.user.to_string().as_str()));
    start.push_attribute(("vector", request.vector.to_string_diff(diff_origin).as_str()));
    start.push_attribute(("time", request.received.to_string().as_str()));
    let kind = match request.kind {
        RequestKind::Do => "do",
        RequestKind::Undo => "undo",
        RequestKind::Redo => "redo",
    };
    start.push_attribute(("type", kind));

    if let Some(op) = &request.operation {
        writer.write_event(Event::Start(start)).map_err(|_| ProtocolError::InvalidRequest)?;
        write_operation(&mut writer, op)?;
        writer
            .write_event(Event::End(BytesEnd::new(tag)))
            .map_err(|_| ProtocolError::InvalidRequest)?;
    } else {
        writer.write_event(Event::Empty(start)).map_err(|_| ProtocolError::InvalidRequest)?;
    }

    String::from_utf8(writer.into_inner()).map_err(|_| ProtocolError::InvalidRequest)
}

/// Parses a `<request .../>` element previously produced by
/// [`write_request`]. `diff_origin` must be the same vector the writer used
/// (the group's current vector at send time).
pub fn read_request(xml: &str, diff_origin: &StateVector) -> Result<Request, ProtocolError> {
    read_request_tagged(xml, "request", diff_origin)
}

/// Counterpart to [`write_sync_request`].
pub fn read_sync_request(xml: &str) -> Result<Request, ProtocolError> {
    read_request_tagged(xml, "sync-request", &StateVector::new())
}

fn read_request_tagged(xml: &str, tag: &str, diff_origin: &StateVector) -> Result<Request, ProtocolError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let tag_bytes = tag.as_bytes();
    loop {
        match reader.read_event_into(&mut buf).map_err(|_| ProtocolError::InvalidRequest)? {
            Event::Start(e) if e.name().as_ref() == tag_bytes => {
                return read_request_body(&mut reader, &e.to_owned(), false, diff_origin, tag);
            }
            Event::Empty(e) if e.name().as_ref() == tag_bytes => {
                return read_request_body(&mut reader, &e.to_owned(), true, diff_origin, tag);
            }
            Event::Eof => return Err(ProtocolError::InvalidRequest),
            _ => {}
        }
    }
}

fn read_request_body(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart,
    is_empty: bool,
    diff_origin: &StateVector,
    tag: &str,
) -> Result<Request, ProtocolError> {
    let user: u32 = attr(start, "user")?.parse().map_err(|_| ProtocolError::InvalidRequest)?;
    let vector_diff = attr(start, "vector")?;
    let vector =
        StateVector::from_str_diff(&vector_diff, diff_origin).map_err(|_| ProtocolError::MissingStateVector)?;
    let time: i64 = attr(start, "time")?.parse().map_err(|_| ProtocolError::InvalidRequest)?;
    let kind_str = attr(start, "type")?;
    let kind = match kind_str.as_str() {
        "do" => RequestKind::Do,
        "undo" => RequestKind::Undo,
        "redo" => RequestKind::Redo,
        _ => return Err(ProtocolError::InvalidRequest),
    };

    if kind != RequestKind::Do {
        return match kind {
            RequestKind::Undo => Ok(Request::new_undo(vector, user, time)),
            RequestKind::Redo => Ok(Request::new_redo(vector, user, time)),
            RequestKind::Do => unreachable!(),
        };
    }
    if is_empty {
        return Err(ProtocolError::MissingOperation);
    }

    let mut buf = Vec::new();
    let operation = loop {
        match reader.read_event_into(&mut buf).map_err(|_| ProtocolError::InvalidRequest)? {
            Event::Start(e) if e.name().as_ref() == b"operation" => {
                break read_operation(reader, &e.to_owned(), false)?;
            }
            Event::Empty(e) if e.name().as_ref() == b"operation" => {
                break read_operation(reader, &e.to_owned(), true)?;
            }
            Event::End(e) if e.name().as_ref() == QName(tag.as_bytes()).as_ref() => {
                return Err(ProtocolError::MissingOperation);
            }
            Event::Eof => return Err(ProtocolError::MissingOperation),
            _ => {}
        }
    };

    Ok(Request::new_do(vector, user, operation, time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;

    #[test]
    fn insert_roundtrips_through_xml() {
        let origin = StateVector::new();
        let mut vector = StateVector::new();
        vector.set(1, 0);
        let request = Request::new_do(vector, 1, Operation::insert(0, Chunk::single(1, "hi")), 42);

        let xml = write_request(&request, &origin).unwrap();
        assert!(xml.contains("type=\"insert\""));
        let parsed = read_request(&xml, &origin).unwrap();
        assert_eq!(parsed.user, 1);
        assert_eq!(parsed.operation, Some(Operation::insert(0, Chunk::single(1, "hi"))));
        assert_eq!(parsed.received, 42);
    }

    #[test]
    fn delete_reversible_roundtrips_with_chunk() {
        let origin = StateVector::new();
        let mut vector = StateVector::new();
        vector.set(2, 3);
        let op = Operation::delete_reversible(1, Chunk::single(2, "bye"));
        let request = Request::new_do(vector, 2, op.clone(), 0);

        let xml = write_request(&request, &origin).unwrap();
        let parsed = read_request(&xml, &origin).unwrap();
        assert_eq!(parsed.operation, Some(op));
    }

    #[test]
    fn delete_irreversible_roundtrips_without_chunk() {
        let origin = StateVector::new();
        let mut vector = StateVector::new();
        vector.set(2, 1);
        let op = Operation::delete_irreversible(0, 4);
        let request = Request::new_do(vector, 2, op.clone(), 0);

        let xml = write_request(&request, &origin).unwrap();
        let parsed = read_request(&xml, &origin).unwrap();
        assert_eq!(parsed.operation, Some(op));
    }

    #[test]
    fn split_roundtrips_through_xml() {
        let origin = StateVector::new();
        let mut vector = StateVector::new();
        vector.set(1, 2);
        let op = Operation::Split(
            Box::new(Operation::delete_irreversible(0, 3)),
            Box::new(Operation::delete_irreversible(5, 3)),
        );
        let request = Request::new_do(vector, 1, op.clone(), 0);

        let xml = write_request(&request, &origin).unwrap();
        let parsed = read_request(&xml, &origin).unwrap();
        assert_eq!(parsed.operation, Some(op));
    }

    #[test]
    fn undo_roundtrips_without_operation() {
        let origin = StateVector::new();
        let mut vector = StateVector::new();
        vector.set(1, 5);
        let request = Request::new_undo(vector, 1, 7);

        let xml = write_request(&request, &origin).unwrap();
        assert!(xml.contains("type=\"undo\""));
        let parsed = read_request(&xml, &origin).unwrap();
        assert_eq!(parsed.kind, RequestKind::Undo);
        assert_eq!(parsed.operation, None);
    }

    #[test]
    fn vector_diff_is_relative_to_origin() {
        let mut origin = StateVector::new();
        origin.set(1, 3);
        origin.set(2, 1);
        let mut vector = origin.clone();
        vector.set(2, 4);

        let request = Request::new_do(vector.clone(), 1, Operation::NoOp, 0);
        let xml = write_request(&request, &origin).unwrap();
        assert!(xml.contains("vector=\"2:3\""));
        let parsed = read_request(&xml, &origin).unwrap();
        assert_eq!(parsed.vector, vector);
    }

    #[test]
    fn sync_request_roundtrips_with_an_absolute_vector() {
        let mut vector = StateVector::new();
        vector.set(3, 9);
        let request = Request::new_do(vector.clone(), 3, Operation::insert(0, Chunk::single(3, "a")), 0);

        let xml = write_sync_request(&request).unwrap();
        assert!(xml.starts_with("<sync-request"));
        let parsed = read_sync_request(&xml).unwrap();
        assert_eq!(parsed.vector, vector);
        assert_eq!(parsed.operation, request.operation);
    }
}

//! `Buffer` — the character sequence an `Algorithm` mutates, plus the
//! `TextBuffer` implementation for plain-text sessions.
//! `crate::chat` supplies the other implementor for chat sessions.

use crate::chunk::Chunk;
use crate::error::ApplyError;
use crate::user::User;

/// A mutation the buffer just performed, for subscribers that want to
/// mirror buffer state elsewhere (a text widget, a replay recorder) without
/// reaching into the buffer itself. Mirrors the `text-inserted`/
/// `text-erased` signals of `inf-buffer.c`.
#[derive(Clone, Debug, PartialEq)]
pub enum BufferEvent {
    TextInserted { pos: u32, chunk: Chunk },
    TextErased { pos: u32, len: u32 },
}

/// Shared contract between `TextBuffer` and `crate::chat::ChatBuffer`: both
/// are character-indexed content types that the same `Operation`/`Algorithm`
/// engine can drive, differing only in what `insert_text`/`erase_text`
/// actually do to their backing storage (`inf-buffer.c` exposes one
/// `modified` property and one pair of mutation methods across both of its
/// subclasses).
pub trait Buffer {
    fn length(&self) -> u32;
    fn insert_text(&mut self, by: &User, pos: u32, chunk: &Chunk) -> Result<(), ApplyError>;
    fn erase_text(&mut self, pos: u32, len: u32) -> Result<Chunk, ApplyError>;
    fn get_slice(&self, pos: u32, len: u32) -> Result<Chunk, ApplyError>;
    fn modified(&self) -> bool;
    fn set_modified(&mut self, modified: bool);
    fn take_events(&mut self) -> Vec<BufferEvent>;
}

/// A character-indexed, per-character-authored text buffer.
#[derive(Debug, Default)]
pub struct TextBuffer {
    chunk: Chunk,
    modified: bool,
    events: Vec<BufferEvent>,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_chunk(chunk: Chunk) -> Self {
        Self { chunk, modified: false, events: Vec::new() }
    }

    pub fn to_plain_text(&self) -> String {
        self.chunk.to_plain_text()
    }

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }
}

impl Buffer for TextBuffer {
    fn length(&self) -> u32 {
        self.chunk.len() as u32
    }

    fn insert_text(&mut self, _by: &User, pos: u32, chunk: &Chunk) -> Result<(), ApplyError> {
        let len = self.length();
        if pos > len {
            return Err(ApplyError::OutOfBounds { pos, len: 0, buffer_len: len });
        }
        if chunk.is_empty() {
            return Ok(());
        }
        let tail = self.chunk.truncate_at(pos as usize);
        self.chunk.append_chunk(chunk.clone());
        self.chunk.append_chunk(tail);
        self.modified = true;
        self.events.push(BufferEvent::TextInserted { pos, chunk: chunk.clone() });
        Ok(())
    }

    fn erase_text(&mut self, pos: u32, len: u32) -> Result<Chunk, ApplyError> {
        let buf_len = self.length();
        if pos.saturating_add(len) > buf_len {
            return Err(ApplyError::OutOfBounds { pos, len, buffer_len: buf_len });
        }
        if len == 0 {
            return Ok(Chunk::new());
        }
        let mut tail = self.chunk.truncate_at(pos as usize);
        let rest = tail.truncate_at(len as usize);
        self.chunk.append_chunk(rest);
        self.modified = true;
        self.events.push(BufferEvent::TextErased { pos, len });
        Ok(tail)
    }

    fn get_slice(&self, pos: u32, len: u32) -> Result<Chunk, ApplyError> {
        let buf_len = self.length();
        if pos.saturating_add(len) > buf_len {
            return Err(ApplyError::OutOfBounds { pos, len, buffer_len: buf_len });
        }
        let mut copy = self.chunk.clone();
        let mut tail = copy.truncate_at(pos as usize);
        let _rest = tail.truncate_at(len as usize);
        Ok(tail)
    }

    fn modified(&self) -> bool {
        self.modified
    }

    fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    fn take_events(&mut self) -> Vec<BufferEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;

    fn user() -> User {
        User::new(1, "alice")
    }

    #[test]
    fn insert_at_end_appends() {
        let mut buf = TextBuffer::from_chunk(Chunk::single(1, "abc"));
        buf.insert_text(&user(), 3, &Chunk::single(2, "def")).unwrap();
        assert_eq!(buf.to_plain_text(), "abcdef");
    }

    #[test]
    fn insert_in_middle_splits_correctly() {
        let mut buf = TextBuffer::from_chunk(Chunk::single(1, "ac"));
        buf.insert_text(&user(), 1, &Chunk::single(2, "b")).unwrap();
        assert_eq!(buf.to_plain_text(), "abc");
    }

    #[test]
    fn erase_removes_requested_range() {
        let mut buf = TextBuffer::from_chunk(Chunk::single(1, "abcdef"));
        let erased = buf.erase_text(1, 3).unwrap();
        assert_eq!(buf.to_plain_text(), "aef");
        assert_eq!(erased.to_plain_text(), "bcd");
    }

    #[test]
    fn out_of_bounds_insert_rejected() {
        let mut buf = TextBuffer::from_chunk(Chunk::single(1, "abc"));
        assert!(buf.insert_text(&user(), 10, &Chunk::single(2, "x")).is_err());
    }

    #[test]
    fn get_slice_does_not_mutate() {
        let buf = TextBuffer::from_chunk(Chunk::single(1, "abcdef"));
        let slice = buf.get_slice(2, 3).unwrap();
        assert_eq!(slice.to_plain_text(), "cde");
        assert_eq!(buf.to_plain_text(), "abcdef");
    }

    #[test]
    fn events_accumulate_and_drain() {
        let mut buf = TextBuffer::from_chunk(Chunk::single(1, "a"));
        buf.insert_text(&user(), 1, &Chunk::single(2, "b")).unwrap();
        buf.erase_text(0, 1).unwrap();
        let events = buf.take_events();
        assert_eq!(events.len(), 2);
        assert!(buf.take_events().is_empty());
    }
}

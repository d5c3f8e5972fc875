//! `ChatBuffer` — the append-only, whole-message buffer backing chat
//! sessions, the other implementor of [`crate::buffer::Buffer`] alongside
//! `TextBuffer`.
//!
//! Unlike `TextBuffer`, which is indexed in characters, `ChatBuffer` is
//! indexed in whole messages: `length()` is the message count, and
//! `insert_text`/`get_slice` treat `pos`/`len` as message indices rather
//! than character offsets. The shared `Operation`/`Algorithm` engine never
//! needs to know the difference.

use std::collections::VecDeque;

use crate::buffer::{Buffer, BufferEvent};
use crate::chunk::Chunk;
use crate::error::ApplyError;
use crate::user::User;

/// Mirrors `INF_CHAT_BUFFER_{NORMAL,EMOTE,USERJOIN,USERPART}` in
/// `inf-chat-buffer.h`. Only `Normal` messages can arrive as an `Insert`
/// operation through the OT engine; the others are join/part/emote
/// announcements an embedder appends directly via [`ChatBuffer::push`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChatMessageKind {
    Normal,
    Emote,
    UserJoin,
    UserPart,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub kind: ChatMessageKind,
    pub user: u32,
    pub text: String,
    pub time: i64,
}

/// Append-only chat log, bounded to `max_messages` scrollback
/// (`inf-chat-buffer.h`'s `max-messages` property). Only ever receives
/// `Insert`-at-`length()` operations through `insert_text`; `erase_text`
/// exists to satisfy the `Buffer` contract but always fails, since the
/// algebra never authors a `Delete` against a chat session.
#[derive(Debug)]
pub struct ChatBuffer {
    messages: VecDeque<ChatMessage>,
    max_messages: usize,
    modified: bool,
    events: Vec<BufferEvent>,
    next_time: i64,
}

impl ChatBuffer {
    pub fn new(max_messages: usize) -> Self {
        Self { messages: VecDeque::new(), max_messages, modified: false, events: Vec::new(), next_time: 0 }
    }

    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    /// Appends `message` directly, bypassing the `Operation`/`Chunk`
    /// encoding. Used for kinds an `Insert` operation can't carry
    /// (`UserJoin`/`UserPart`/`Emote`) and for local announcements that
    /// don't need to go through the causality machinery at all.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        self.trim();
        self.modified = true;
    }

    fn trim(&mut self) {
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
    }
}

impl Buffer for ChatBuffer {
    fn length(&self) -> u32 {
        self.messages.len() as u32
    }

    fn insert_text(&mut self, by: &User, pos: u32, chunk: &Chunk) -> Result<(), ApplyError> {
        let len = self.length();
        if pos != len {
            return Err(ApplyError::OutOfBounds { pos, len: 1, buffer_len: len });
        }
        let time = self.next_time;
        self.next_time += 1;
        let message = ChatMessage { kind: ChatMessageKind::Normal, user: by.id, text: chunk.to_plain_text(), time };
        self.messages.push_back(message);
        self.trim();
        self.modified = true;
        self.events.push(BufferEvent::TextInserted { pos, chunk: chunk.clone() });
        Ok(())
    }

    fn erase_text(&mut self, pos: u32, len: u32) -> Result<Chunk, ApplyError> {
        Err(ApplyError::OutOfBounds { pos, len, buffer_len: self.length() })
    }

    fn get_slice(&self, pos: u32, len: u32) -> Result<Chunk, ApplyError> {
        let buf_len = self.length();
        if pos.saturating_add(len) > buf_len {
            return Err(ApplyError::OutOfBounds { pos, len, buffer_len: buf_len });
        }
        let mut chunk = Chunk::new();
        for message in self.messages.iter().skip(pos as usize).take(len as usize) {
            chunk.append_chunk(Chunk::single(message.user, message.text.clone()));
        }
        Ok(chunk)
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

    fn user(id: u32) -> User {
        User::new(id, format!("user{id}"))
    }

    #[test]
    fn insert_appends_a_normal_message() {
        let mut chat = ChatBuffer::new(100);
        chat.insert_text(&user(1), 0, &Chunk::single(1, "hello")).unwrap();
        assert_eq!(chat.length(), 1);
        let messages: Vec<_> = chat.messages().collect();
        assert_eq!(messages[0].text, "hello");
        assert_eq!(messages[0].user, 1);
        assert_eq!(messages[0].kind, ChatMessageKind::Normal);
    }

    #[test]
    fn insert_not_at_the_end_is_rejected() {
        let mut chat = ChatBuffer::new(100);
        chat.insert_text(&user(1), 0, &Chunk::single(1, "a")).unwrap();
        assert!(chat.insert_text(&user(1), 0, &Chunk::single(1, "b")).is_err());
    }

    #[test]
    fn scrollback_is_bounded() {
        let mut chat = ChatBuffer::new(2);
        for _ in 0..5u32 {
            let pos = chat.length();
            chat.insert_text(&user(1), pos, &Chunk::single(1, "x")).unwrap();
        }
        assert_eq!(chat.length(), 2);
    }

    #[test]
    fn push_admits_non_normal_kinds() {
        let mut chat = ChatBuffer::new(100);
        chat.push(ChatMessage { kind: ChatMessageKind::UserJoin, user: 3, text: "alice joined".into(), time: 0 });
        assert_eq!(chat.length(), 1);
        assert_eq!(chat.messages().next().unwrap().kind, ChatMessageKind::UserJoin);
    }

    #[test]
    fn get_slice_returns_a_window_of_messages() {
        let mut chat = ChatBuffer::new(100);
        chat.insert_text(&user(1), 0, &Chunk::single(1, "a")).unwrap();
        chat.insert_text(&user(2), 1, &Chunk::single(2, "b")).unwrap();
        let slice = chat.get_slice(1, 1).unwrap();
        assert_eq!(slice.to_plain_text(), "b");
    }

    #[test]
    fn erase_is_unsupported() {
        let mut chat = ChatBuffer::new(100);
        chat.insert_text(&user(1), 0, &Chunk::single(1, "a")).unwrap();
        assert!(chat.erase_text(0, 1).is_err());
    }
}

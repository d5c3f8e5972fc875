//! `User` and `UserTable` — participants in a session.

use std::collections::HashMap;

use crate::error::ProtocolError;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UserStatus {
    Active,
    Inactive,
    Unavailable,
}

/// A connection handle is owned by the embedding transport; the core only
/// needs to know whether one is attached, not what it is.
pub type ConnectionHandle = u64;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UserFlags {
    pub local: bool,
}

/// Caret/selection/hue are only meaningful for text sessions; a chat-only `User` simply leaves them at their defaults.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextCursor {
    pub caret: u32,
    pub selection: i32,
    pub hue: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct User {
    pub id: u32,
    pub name: String,
    pub status: UserStatus,
    pub flags: UserFlags,
    pub connection: Option<ConnectionHandle>,
    pub cursor: TextCursor,
}

impl User {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: UserStatus::Active,
            flags: UserFlags::default(),
            connection: None,
            cursor: TextCursor::default(),
        }
    }

    pub fn local(id: u32, name: impl Into<String>) -> Self {
        let mut user = Self::new(id, name);
        user.flags.local = true;
        user
    }
}

/// `user-id → User` mapping with a unique-name invariant and a secondary
/// index of local users.
#[derive(Debug, Default)]
pub struct UserTable {
    users: HashMap<u32, User>,
    local_ids: Vec<u32>,
}

impl UserTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, user: User) -> Result<(), ProtocolError> {
        if self.users.values().any(|u| u.name == user.name && u.id != user.id) {
            return Err(ProtocolError::InvalidRequest);
        }
        if user.flags.local && !self.local_ids.contains(&user.id) {
            self.local_ids.push(user.id);
        }
        self.users.insert(user.id, user);
        Ok(())
    }

    pub fn remove_user(&mut self, id: u32) -> Option<User> {
        self.local_ids.retain(|&u| u != id);
        self.users.remove(&id)
    }

    pub fn get(&self, id: u32) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut User> {
        self.users.get_mut(&id)
    }

    pub fn require(&self, id: u32) -> Result<&User, ProtocolError> {
        self.get(id).ok_or(ProtocolError::NoSuchUser { user: id })
    }

    pub fn local_users(&self) -> impl Iterator<Item = &User> {
        self.local_ids.iter().filter_map(move |id| self.users.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_require_user() {
        let mut table = UserTable::new();
        table.add_user(User::new(1, "alice")).unwrap();
        assert_eq!(table.require(1).unwrap().name, "alice");
        assert!(table.require(2).is_err());
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut table = UserTable::new();
        table.add_user(User::new(1, "alice")).unwrap();
        assert!(table.add_user(User::new(2, "alice")).is_err());
    }

    #[test]
    fn local_users_are_indexed_separately() {
        let mut table = UserTable::new();
        table.add_user(User::new(1, "alice")).unwrap();
        table.add_user(User::local(2, "bob")).unwrap();
        let locals: Vec<_> = table.local_users().map(|u| u.id).collect();
        assert_eq!(locals, vec![2]);
    }

    #[test]
    fn remove_user_clears_local_index() {
        let mut table = UserTable::new();
        table.add_user(User::local(1, "alice")).unwrap();
        table.remove_user(1);
        assert_eq!(table.local_users().count(), 0);
    }
}

//! An IRC channel as tracked by a single server session.

use std::collections::HashMap;

/// Per-user mode bits within a channel (op, voice, ...) are a plain `u32`
/// bitset: the bit assigned to each mode character is determined at runtime
/// from the server's ISUPPORT PREFIX table (see [`crate::server::PrefixTable`]),
/// so no fixed enum can describe it ahead of time.
///
/// A single user's membership record within a [`Channel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUser {
    pub nickname: String,
    pub modes: u32,
}

impl ChannelUser {
    pub fn new(nickname: impl Into<String>, modes: u32) -> Self {
        Self {
            nickname: nickname.into(),
            modes,
        }
    }

    pub fn has_mode(&self, bit: u32) -> bool {
        self.modes & bit != 0
    }
}

/// Channel flags. Currently only tracks whether the channel has actually
/// been joined (as opposed to merely configured to auto-join).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelFlags {
    pub joined: bool,
}

/// A channel known to a server session, joined or pending join.
///
/// Membership is keyed case-insensitively (lower-cased) so that `#Foo` and
/// `#foo` refer to the same member when looked up, matching IRC's
/// case-insensitive nickname comparison rules.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Original-case channel name as seen on the wire.
    pub name: String,
    pub password: Option<String>,
    pub flags: ChannelFlags,
    users: HashMap<String, ChannelUser>,
}

impl Channel {
    pub fn new(name: impl Into<String>, password: Option<String>) -> Self {
        Self {
            name: name.into(),
            password,
            flags: ChannelFlags::default(),
            users: HashMap::new(),
        }
    }

    /// Lower-cased lookup key, used as the map key in [`super::server::ServerSession::channels`].
    pub fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    pub fn add(&mut self, nickname: &str, modes: u32) {
        let key = nickname.to_ascii_lowercase();
        self.users
            .entry(key)
            .and_modify(|u| u.modes = modes)
            .or_insert_with(|| ChannelUser::new(nickname, modes));
    }

    pub fn get(&self, nickname: &str) -> Option<&ChannelUser> {
        self.users.get(&nickname.to_ascii_lowercase())
    }

    pub fn set_modes(&mut self, nickname: &str, modes: u32) {
        if let Some(u) = self.users.get_mut(&nickname.to_ascii_lowercase()) {
            u.modes = modes;
        }
    }

    pub fn remove(&mut self, nickname: &str) {
        self.users.remove(&nickname.to_ascii_lowercase());
    }

    pub fn rename(&mut self, old_nick: &str, new_nick: &str) {
        let key = old_nick.to_ascii_lowercase();
        if let Some(mut user) = self.users.remove(&key) {
            user.nickname = new_nick.to_string();
            self.users.insert(new_nick.to_ascii_lowercase(), user);
        }
    }

    pub fn clear(&mut self) {
        self.users.clear();
        self.flags.joined = false;
    }

    pub fn count(&self) -> usize {
        self.users.len()
    }

    pub fn users(&self) -> impl Iterator<Item = &ChannelUser> {
        self.users.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_is_case_insensitive() {
        let mut ch = Channel::new("#test", None);
        ch.add("Alice", 0);
        assert!(ch.get("alice").is_some());
        assert!(ch.get("ALICE").is_some());
        assert_eq!(ch.count(), 1);

        // Re-adding under a different case updates, not duplicates.
        ch.add("alice", 1);
        assert_eq!(ch.count(), 1);
        assert_eq!(ch.get("Alice").unwrap().modes, 1);
    }

    #[test]
    fn rename_preserves_modes() {
        let mut ch = Channel::new("#test", None);
        ch.add("bob", 2);
        ch.rename("bob", "bobby");
        assert!(ch.get("bob").is_none());
        assert_eq!(ch.get("bobby").unwrap().modes, 2);
    }

    #[test]
    fn remove_then_add_self_is_not_silently_dropped() {
        let mut ch = Channel::new("#ops", None);
        ch.add("bot", 0);
        ch.add("alice", 0);
        ch.remove("alice");
        assert!(ch.get("bot").is_some());
        assert!(ch.get("alice").is_none());
    }
}

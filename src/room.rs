use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::Limits;
use crate::error::RoomError;

/// Payload of `room-info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub host_username: String,
    pub editable_users: Vec<String>,
}

/// One entry of `room-users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUser {
    pub username: String,
    pub socket_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub username: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub socket_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyMember,
}

/// State of one collaborative room.
///
/// Every method assumes the caller holds the room's lock; nothing here is
/// shared across threads on its own.
pub struct Room {
    id: String,
    host: String,
    language: String,
    members: Vec<Member>,
    editable: Vec<String>,
    code: String,
    history: VecDeque<ChatMessage>,
    limits: Limits,
    reclaimed: bool,
}

impl Room {
    /// Opens a room with its creator as the first member and host.
    pub fn new(id: String, creator: Member, language: String, limits: Limits) -> Self {
        let host = creator.username.clone();
        Room {
            id,
            editable: vec![host.clone()],
            host,
            language,
            members: vec![creator],
            code: String::new(),
            history: VecDeque::new(),
            limits,
            reclaimed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// True once the last member has left. A reclaimed room accepts nothing.
    pub fn is_reclaimed(&self) -> bool {
        self.reclaimed
    }

    pub fn member(&self, socket_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.socket_id == socket_id)
    }

    /// Decides whether `member` may take a seat, without changing anything.
    pub fn check_join(&self, member: &Member) -> Result<JoinOutcome, RoomError> {
        if self.reclaimed {
            return Err(RoomError::NotFound(self.id.clone()));
        }
        if let Some(existing) = self.members.iter().find(|m| m.username == member.username) {
            if existing.socket_id == member.socket_id {
                return Ok(JoinOutcome::AlreadyMember);
            }
            return Err(RoomError::NameTaken(member.username.clone()));
        }
        // A seated guest may rename, but never into the absent host's name.
        if member.username == self.host && self.member(&member.socket_id).is_some() {
            return Err(RoomError::NameTaken(member.username.clone()));
        }
        Ok(JoinOutcome::Joined)
    }

    pub fn join(&mut self, member: Member) -> Result<JoinOutcome, RoomError> {
        if self.check_join(&member)? == JoinOutcome::AlreadyMember {
            return Ok(JoinOutcome::AlreadyMember);
        }

        // A connection holds at most one seat, even under a new name.
        self.leave(&member.socket_id);
        self.reclaimed = false;

        if member.username == self.host && !self.editable.contains(&self.host) {
            self.editable.insert(0, self.host.clone());
        }
        self.members.push(member);
        Ok(JoinOutcome::Joined)
    }

    /// Removes the member behind `socket_id`, dropping its edit permission.
    pub fn leave(&mut self, socket_id: &str) -> Option<Member> {
        let pos = self.members.iter().position(|m| m.socket_id == socket_id)?;
        let member = self.members.remove(pos);
        self.editable.retain(|name| name != &member.username);
        if self.members.is_empty() {
            self.reclaimed = true;
        }
        Some(member)
    }

    pub fn can_edit(&self, username: &str) -> bool {
        username == self.host || self.editable.iter().any(|name| name == username)
    }

    /// Replaces the code buffer. Last write wins.
    pub fn update_code(&mut self, socket_id: &str, code: String) -> Result<(), RoomError> {
        let member = self.require_member(socket_id)?;
        if !self.can_edit(&member.username) {
            return Err(RoomError::EditDenied);
        }
        if code.len() > self.limits.max_code_len {
            return Err(RoomError::CodeTooLarge(self.limits.max_code_len));
        }
        self.code = code;
        Ok(())
    }

    /// Appends a chat message under the sender's registered name.
    pub fn post_message(&mut self, socket_id: &str, text: String) -> Result<ChatMessage, RoomError> {
        let username = self.require_member(socket_id)?.username.clone();
        if text.trim().is_empty() {
            return Err(RoomError::EmptyMessage);
        }
        if text.chars().count() > self.limits.max_message_len {
            return Err(RoomError::MessageTooLong(self.limits.max_message_len));
        }

        let message = ChatMessage { username, message: text };
        self.history.push_back(message.clone());
        while self.history.len() > self.limits.max_history {
            self.history.pop_front();
        }
        Ok(message)
    }

    /// Grants edit permission. Returns whether the editable-set changed.
    pub fn grant_edit(&mut self, socket_id: &str, acting: &str, target: &str) -> Result<bool, RoomError> {
        self.require_host(socket_id, acting)?;
        if !self.members.iter().any(|m| m.username == target) {
            return Err(RoomError::UnknownUser(target.to_string()));
        }
        if self.editable.iter().any(|name| name == target) {
            return Ok(false);
        }
        self.editable.push(target.to_string());
        Ok(true)
    }

    /// Revokes edit permission. Returns whether the editable-set changed.
    pub fn revoke_edit(&mut self, socket_id: &str, acting: &str, target: &str) -> Result<bool, RoomError> {
        self.require_host(socket_id, acting)?;
        if target == self.host {
            return Err(RoomError::CannotRevokeHost);
        }
        let before = self.editable.len();
        self.editable.retain(|name| name != target);
        Ok(self.editable.len() != before)
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            host_username: self.host.clone(),
            editable_users: self.editable.clone(),
        }
    }

    pub fn users(&self) -> Vec<RoomUser> {
        self.members
            .iter()
            .map(|m| RoomUser {
                username: m.username.clone(),
                socket_id: m.socket_id.clone(),
            })
            .collect()
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.history.iter().cloned().collect()
    }

    fn require_member(&self, socket_id: &str) -> Result<&Member, RoomError> {
        self.member(socket_id)
            .ok_or_else(|| RoomError::NotMember(self.id.clone()))
    }

    // The claimed acting name must match the caller's seat, and that seat must be the host's.
    fn require_host(&self, socket_id: &str, acting: &str) -> Result<(), RoomError> {
        let member = self.require_member(socket_id)?;
        if member.username != self.host || acting != self.host {
            return Err(RoomError::NotHost);
        }
        Ok(())
    }
}

pub fn validate_room_id(room_id: &str, limits: &Limits) -> Result<(), RoomError> {
    let valid = !room_id.is_empty()
        && room_id.len() <= limits.max_name_len
        && room_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RoomError::InvalidRoomId)
    }
}

/// Trims a display name and checks its length.
pub fn normalize_name(name: &str, limits: &Limits) -> Result<String, RoomError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > limits.max_name_len {
        return Err(RoomError::InvalidName);
    }
    Ok(name.to_string())
}

pub fn normalize_language(language: &str, limits: &Limits) -> Result<String, RoomError> {
    let language = language.trim();
    if language.is_empty() || language.chars().count() > limits.max_name_len {
        return Err(RoomError::InvalidLanguage);
    }
    Ok(language.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn member(socket_id: &str, username: &str) -> Member {
        Member {
            socket_id: socket_id.to_string(),
            username: username.to_string(),
        }
    }

    fn room_with_limits(limits: Limits) -> Room {
        Room::new("ABC123".into(), member("s-alice", "Alice"), "python".into(), limits)
    }

    fn room() -> Room {
        room_with_limits(Limits::default())
    }

    fn assert_editable_subset_of_members(room: &Room) {
        for name in &room.info().editable_users {
            assert!(
                room.members().iter().any(|m| &m.username == name),
                "{name} is editable but not a member"
            );
        }
    }

    #[test]
    fn creator_is_host_and_sole_editor() {
        let room = room();
        assert_eq!(room.host(), "Alice");
        assert_eq!(room.language(), "python");
        assert_eq!(
            room.info(),
            RoomInfo {
                host_username: "Alice".into(),
                editable_users: vec!["Alice".into()],
            }
        );
        assert_eq!(room.users().len(), 1);
    }

    #[test]
    fn guest_join_leaves_room_info_unchanged() {
        let mut room = room();
        let before = room.info();
        assert_eq!(room.join(member("s-bob", "Bob")), Ok(JoinOutcome::Joined));

        let names: Vec<_> = room.users().into_iter().map(|u| u.username).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
        assert_eq!(room.info(), before);
    }

    #[test]
    fn host_grants_and_revokes_edit() {
        let mut room = room();
        room.join(member("s-bob", "Bob")).unwrap();

        assert_eq!(room.grant_edit("s-alice", "Alice", "Bob"), Ok(true));
        assert_eq!(room.info().editable_users, vec!["Alice", "Bob"]);
        assert_eq!(room.grant_edit("s-alice", "Alice", "Bob"), Ok(false));

        assert_eq!(room.revoke_edit("s-alice", "Alice", "Bob"), Ok(true));
        assert_eq!(room.info().editable_users, vec!["Alice"]);
        assert_eq!(room.revoke_edit("s-alice", "Alice", "Bob"), Ok(false));
    }

    #[test]
    fn only_the_host_seat_may_toggle_permissions() {
        let mut room = room();
        room.join(member("s-bob", "Bob")).unwrap();
        room.join(member("s-carol", "Carol")).unwrap();

        assert_eq!(room.grant_edit("s-bob", "Bob", "Carol"), Err(RoomError::NotHost));
        // Claiming the host's name from another seat is not enough.
        assert_eq!(room.grant_edit("s-bob", "Alice", "Carol"), Err(RoomError::NotHost));
        assert_eq!(
            room.grant_edit("s-stranger", "Alice", "Carol"),
            Err(RoomError::NotMember("ABC123".into()))
        );
        assert_eq!(room.revoke_edit("s-alice", "Alice", "Alice"), Err(RoomError::CannotRevokeHost));
    }

    #[test]
    fn permission_requires_a_current_member() {
        let mut room = room();
        assert_eq!(
            room.grant_edit("s-alice", "Alice", "Ghost"),
            Err(RoomError::UnknownUser("Ghost".into()))
        );
        assert_editable_subset_of_members(&room);
    }

    #[test]
    fn leaving_drops_edit_permission() {
        let mut room = room();
        room.join(member("s-bob", "Bob")).unwrap();
        room.grant_edit("s-alice", "Alice", "Bob").unwrap();

        let left = room.leave("s-bob").unwrap();
        assert_eq!(left.username, "Bob");
        assert_eq!(room.info().editable_users, vec!["Alice"]);
        assert_editable_subset_of_members(&room);

        // Rejoining does not restore a guest's grant.
        room.join(member("s-bob2", "Bob")).unwrap();
        assert!(!room.can_edit("Bob"));
    }

    #[test]
    fn host_regains_edit_on_rejoin() {
        let mut room = room();
        room.join(member("s-bob", "Bob")).unwrap();
        room.leave("s-alice").unwrap();
        assert!(room.info().editable_users.is_empty());
        assert_editable_subset_of_members(&room);

        room.join(member("s-alice2", "Alice")).unwrap();
        assert_eq!(room.info().editable_users, vec!["Alice"]);
        assert!(room.can_edit("Alice"));
    }

    #[test]
    fn last_member_leaving_reclaims_the_room() {
        let mut room = room();
        room.join(member("s-bob", "Bob")).unwrap();
        room.leave("s-alice");
        assert!(!room.is_reclaimed());
        room.leave("s-bob");
        assert!(room.is_reclaimed());
        assert_eq!(
            room.join(member("s-carol", "Carol")),
            Err(RoomError::NotFound("ABC123".into()))
        );
    }

    #[test]
    fn duplicate_names_are_rejected_but_rejoin_is_idempotent() {
        let mut room = room();
        assert_eq!(
            room.join(member("s-other", "Alice")),
            Err(RoomError::NameTaken("Alice".into()))
        );
        assert_eq!(room.join(member("s-alice", "Alice")), Ok(JoinOutcome::AlreadyMember));
        assert_eq!(room.members().len(), 1);
    }

    #[test]
    fn renaming_seat_replaces_previous_membership() {
        let mut room = room();
        room.join(member("s-bob", "Bob")).unwrap();
        room.join(member("s-bob", "Robert")).unwrap();
        let names: Vec<_> = room.users().into_iter().map(|u| u.username).collect();
        assert_eq!(names, vec!["Alice", "Robert"]);
    }

    #[test]
    fn seated_guest_cannot_rename_into_absent_host() {
        let mut room = room();
        room.join(member("s-carol", "Carol")).unwrap();
        room.leave("s-alice").unwrap();

        let renamed = member("s-carol", "Alice");
        assert_eq!(room.check_join(&renamed), Err(RoomError::NameTaken("Alice".into())));
        assert_eq!(room.join(renamed), Err(RoomError::NameTaken("Alice".into())));
        assert!(room.info().editable_users.is_empty());
        assert_eq!(room.member("s-carol").unwrap().username, "Carol");
    }

    #[test]
    fn check_join_leaves_the_room_untouched() {
        let mut room = room();
        room.join(member("s-bob", "Bob")).unwrap();
        let users = room.users();

        assert_eq!(room.check_join(&member("s-carol", "Carol")), Ok(JoinOutcome::Joined));
        assert_eq!(
            room.check_join(&member("s-other", "Bob")),
            Err(RoomError::NameTaken("Bob".into()))
        );
        assert_eq!(room.users(), users);
    }

    #[test]
    fn code_updates_are_last_write_wins_for_editors() {
        let mut room = room();
        room.join(member("s-bob", "Bob")).unwrap();

        assert_eq!(room.update_code("s-bob", "print(1)".into()), Err(RoomError::EditDenied));
        room.update_code("s-alice", "print('a')".into()).unwrap();
        room.grant_edit("s-alice", "Alice", "Bob").unwrap();
        room.update_code("s-bob", "print('b')".into()).unwrap();
        assert_eq!(room.code(), "print('b')");
    }

    #[test]
    fn oversized_code_is_rejected() {
        let mut room = room_with_limits(Limits {
            max_code_len: 4,
            ..Limits::default()
        });
        assert_eq!(room.update_code("s-alice", "12345".into()), Err(RoomError::CodeTooLarge(4)));
        assert_eq!(room.code(), "");
    }

    #[test]
    fn chat_keeps_append_order_and_registered_names() {
        let mut room = room();
        room.join(member("s-bob", "Bob")).unwrap();

        room.post_message("s-alice", "hi".into()).unwrap();
        let reply = room.post_message("s-bob", "hello".into()).unwrap();
        assert_eq!(reply.username, "Bob");

        let texts: Vec<_> = room.history().into_iter().map(|m| m.message).collect();
        assert_eq!(texts, vec!["hi", "hello"]);

        assert_eq!(room.post_message("s-bob", "   ".into()), Err(RoomError::EmptyMessage));
        assert_eq!(
            room.post_message("s-ghost", "boo".into()),
            Err(RoomError::NotMember("ABC123".into()))
        );
    }

    #[test]
    fn chat_history_is_capped_oldest_first() {
        let mut room = room_with_limits(Limits {
            max_history: 2,
            ..Limits::default()
        });
        for text in ["one", "two", "three"] {
            room.post_message("s-alice", text.into()).unwrap();
        }
        let texts: Vec<_> = room.history().into_iter().map(|m| m.message).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[rstest]
    #[case("ABC123", true)]
    #[case("room_1-b", true)]
    #[case("", false)]
    #[case("has space", false)]
    #[case("x/../y", false)]
    #[case("ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456", false)]
    fn room_id_validation(#[case] room_id: &str, #[case] valid: bool) {
        assert_eq!(validate_room_id(room_id, &Limits::default()).is_ok(), valid);
    }

    #[rstest]
    #[case("  Alice ", Ok("Alice".to_string()))]
    #[case("   ", Err(RoomError::InvalidName))]
    #[case("a-name-that-is-far-too-long-to-be-shown", Err(RoomError::InvalidName))]
    fn name_normalization(#[case] raw: &str, #[case] expected: Result<String, RoomError>) {
        assert_eq!(normalize_name(raw, &Limits::default()), expected);
    }
}

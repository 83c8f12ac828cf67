//! Client-side chat state: the open conversation's messages and the
//! conversation list, reconciled from optimistic sends, pushed messages and
//! fetched history.

use std::collections::{HashSet, VecDeque};

use log::{debug, warn};

use crate::api::models::{ChatMessage, Conversation, Delivery, Preview, UserId};
use crate::chat::conversation_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConversation {
    pub key: String,
    pub peer: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Duplicate,
    Applied {
        /// The message went into the visible list.
        appended: bool,
        /// No conversation entry exists for the message yet.
        needs_refresh: bool,
    },
}

/// Same server id, or identical content, timestamp and sender.
pub fn is_duplicate(existing: &[ChatMessage], msg: &ChatMessage) -> bool {
    existing.iter().any(|m| {
        let same_id = matches!((&m.id, &msg.id), (Some(a), Some(b)) if a == b);
        same_id || (m.content == msg.content && m.sent_at == msg.sent_at && m.sender_id == msg.sender_id)
    })
}

#[derive(Debug)]
pub struct ChatState {
    me: UserId,
    conversations: Vec<Conversation>,
    active: Option<ActiveConversation>,
    messages: Vec<ChatMessage>,
    notices: VecDeque<Notice>,
    last_optimistic_at: i64,
}

impl ChatState {
    pub fn new(me: UserId) -> Self {
        Self {
            me,
            conversations: Vec::new(),
            active: None,
            messages: Vec::new(),
            notices: VecDeque::new(),
            last_optimistic_at: i64::MIN,
        }
    }

    pub fn me(&self) -> UserId {
        self.me
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn active(&self) -> Option<&ActiveConversation> {
        self.active.as_ref()
    }

    pub fn active_key(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.key.as_str())
    }

    pub fn notify(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.notices.push_back(Notice {
            level,
            text: text.into(),
        });
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    /// Makes the conversation with `peer` active and returns its key.
    /// Reopening the active conversation keeps the visible list.
    pub fn open(&mut self, peer: UserId) -> Option<String> {
        if peer == self.me {
            self.notify(NoticeLevel::Error, "You cannot start a chat with yourself.");
            return None;
        }
        let key = conversation_key(self.me, peer);
        if self.active_key() == Some(key.as_str()) {
            return Some(key);
        }
        self.active = Some(ActiveConversation {
            key: key.clone(),
            peer,
        });
        self.messages.clear();
        Some(key)
    }

    pub fn close(&mut self) {
        self.active = None;
        self.messages.clear();
    }

    pub fn apply_push(&mut self, mut msg: ChatMessage) -> PushOutcome {
        if is_duplicate(&self.messages, &msg) {
            debug!("dropping duplicate message from {} at {}", msg.sender_id, msg.sent_at);
            return PushOutcome::Duplicate;
        }
        let key = conversation_key(msg.sender_id, msg.receiver_id);
        msg.conversation_key = key.clone();
        msg.delivery = Delivery::Delivered;

        let preview = Preview {
            text: msg.content.clone(),
            sent_at: msg.sent_at,
        };
        let is_active = self.active_key() == Some(key.as_str());
        if is_active {
            self.messages.push(msg);
        }
        let known = self.touch_preview(&key, preview, !is_active);
        PushOutcome::Applied {
            appended: is_active,
            needs_refresh: !known,
        }
    }

    /// Inserts an outgoing message into the visible list ahead of the
    /// network call. `now` is epoch millis; the stored timestamp is kept
    /// strictly increasing so a rollback never hits a neighbour.
    pub fn begin_send(&mut self, text: &str, now: i64) -> Option<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let active = self.active.as_ref()?;
        let sent_at = now.max(self.last_optimistic_at.saturating_add(1));
        let msg = ChatMessage {
            id: None,
            sender_id: self.me,
            receiver_id: active.peer,
            content: text.to_string(),
            conversation_key: active.key.clone(),
            sent_at,
            delivery: Delivery::Pending,
        };
        self.last_optimistic_at = sent_at;
        self.messages.push(msg.clone());
        Some(msg)
    }

    /// Returns false when the conversation is not in the list yet.
    pub fn confirm_send(&mut self, sent: &ChatMessage, server_id: Option<String>) -> bool {
        if let Some(m) = self.messages.iter_mut().find(|m| is_pending_copy(m, sent)) {
            m.delivery = Delivery::Delivered;
            if m.id.is_none() {
                m.id = server_id;
            }
        }
        let preview = Preview {
            text: sent.content.clone(),
            sent_at: sent.sent_at,
        };
        self.touch_preview(&sent.conversation_key, preview, false)
    }

    pub fn fail_send(&mut self, sent: &ChatMessage, reason: &str) {
        let before = self.messages.len();
        self.messages.retain(|m| !is_pending_copy(m, sent));
        if self.messages.len() == before {
            debug!("failed send at {} was no longer visible", sent.sent_at);
        }
        self.notify(NoticeLevel::Error, format!("Message not sent: {reason}"));
    }

    pub fn load_history(&mut self, key: &str, mut history: Vec<ChatMessage>) {
        if self.active_key() != Some(key) {
            debug!("ignoring stale history for {key}");
            return;
        }
        history.sort_by_key(|m| m.sent_at);

        let mut merged: Vec<ChatMessage> = Vec::with_capacity(history.len() + self.messages.len());
        for msg in history {
            if msg.conversation_key != key {
                warn!("history for {key} contained a message of {}", msg.conversation_key);
                continue;
            }
            if !is_duplicate(&merged, &msg) {
                merged.push(msg);
            }
        }
        // sends and pushes that landed while the fetch was in flight
        let shown: Vec<ChatMessage> = self
            .messages
            .drain(..)
            .filter(|m| m.conversation_key == key)
            .collect();
        for msg in shown {
            if !is_duplicate(&merged, &msg) {
                merged.push(msg);
            }
        }
        self.messages = merged;
    }

    pub fn history_failed(&mut self, key: &str, reason: &str) {
        if self.active_key() == Some(key) {
            self.messages.clear();
        }
        self.notify(NoticeLevel::Error, format!("Could not load messages: {reason}"));
    }

    /// Replaces the list, keeping server order; the first entry of a key wins.
    pub fn load_conversations(&mut self, list: Vec<Conversation>) {
        let mut seen = HashSet::new();
        self.conversations = list
            .into_iter()
            .filter(|c| seen.insert(c.key.clone()))
            .collect();
    }

    pub fn conversations_failed(&mut self, reason: &str) {
        self.conversations.clear();
        self.notify(NoticeLevel::Error, format!("Could not load conversations: {reason}"));
    }

    /// Inserts at the front, or replaces an existing entry in place.
    pub fn upsert_conversation(&mut self, mut conv: Conversation) {
        match self.conversations.iter_mut().find(|c| c.key == conv.key) {
            Some(existing) => {
                if conv.preview.is_none() {
                    conv.preview = existing.preview.take();
                }
                *existing = conv;
            }
            None => self.conversations.insert(0, conv),
        }
    }

    fn touch_preview(&mut self, key: &str, preview: Preview, promote: bool) -> bool {
        let Some(pos) = self.conversations.iter().position(|c| c.key == key) else {
            return false;
        };
        self.conversations[pos].preview = Some(preview);
        if promote && pos > 0 {
            let conv = self.conversations.remove(pos);
            self.conversations.insert(0, conv);
        }
        true
    }
}

fn is_pending_copy(m: &ChatMessage, sent: &ChatMessage) -> bool {
    m.delivery == Delivery::Pending
        && m.sent_at == sent.sent_at
        && m.conversation_key == sent.conversation_key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::Participant;

    const ME: UserId = 5;

    fn conv(peer: UserId, name: &str) -> Conversation {
        Conversation {
            key: conversation_key(ME, peer),
            peer: Participant {
                id: peer,
                display_name: name.into(),
                avatar_url: None,
            },
            preview: None,
        }
    }

    fn msg(from: UserId, to: UserId, text: &str, at: i64) -> ChatMessage {
        ChatMessage {
            id: None,
            sender_id: from,
            receiver_id: to,
            content: text.into(),
            conversation_key: conversation_key(from, to),
            sent_at: at,
            delivery: Delivery::Delivered,
        }
    }

    fn with_id(mut m: ChatMessage, id: &str) -> ChatMessage {
        m.id = Some(id.into());
        m
    }

    fn state_with(peers: &[(UserId, &str)]) -> ChatState {
        let mut state = ChatState::new(ME);
        state.load_conversations(peers.iter().map(|(id, name)| conv(*id, name)).collect());
        state
    }

    fn keys(state: &ChatState) -> Vec<String> {
        state.conversations().iter().map(|c| c.key.clone()).collect()
    }

    #[test]
    fn push_for_active_conversation_appends_once() {
        let mut state = state_with(&[(12, "Lan"), (7, "Minh")]);
        state.open(12);
        state.apply_push(msg(12, ME, "first", 1));

        let outcome = state.apply_push(msg(12, ME, "second", 2));
        assert_eq!(
            outcome,
            PushOutcome::Applied { appended: true, needs_refresh: false }
        );
        let texts: Vec<&str> = state.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);
        assert_eq!(state.conversations()[0].preview.as_ref().unwrap().text, "second");
    }

    #[test]
    fn repeated_push_is_dropped_by_id() {
        let mut state = state_with(&[(12, "Lan")]);
        state.open(12);
        state.apply_push(with_id(msg(12, ME, "hi", 1), "m1"));
        let outcome = state.apply_push(with_id(msg(12, ME, "edited", 9), "m1"));
        assert_eq!(outcome, PushOutcome::Duplicate);
        assert_eq!(state.messages().len(), 1);
    }

    #[test]
    fn repeated_push_is_dropped_by_content_time_and_sender() {
        let mut state = state_with(&[(12, "Lan")]);
        state.open(12);
        state.apply_push(msg(12, ME, "hi", 1));
        assert_eq!(state.apply_push(with_id(msg(12, ME, "hi", 1), "m9")), PushOutcome::Duplicate);
        assert_eq!(state.messages().len(), 1);

        // same text at another instant is a new message
        state.apply_push(msg(12, ME, "hi", 2));
        assert_eq!(state.messages().len(), 2);
    }

    #[test]
    fn push_echo_of_own_optimistic_send_is_dropped() {
        let mut state = state_with(&[(12, "Lan")]);
        state.open(12);
        let sent = state.begin_send("on my way", 100).unwrap();
        assert_eq!(state.apply_push(msg(ME, 12, "on my way", sent.sent_at)), PushOutcome::Duplicate);
        assert_eq!(state.messages().len(), 1);
    }

    #[test]
    fn push_for_other_conversation_updates_preview_and_promotes() {
        let mut state = state_with(&[(12, "Lan"), (7, "Minh"), (9, "Hoa")]);
        state.open(12);
        state.apply_push(msg(12, ME, "hello", 1));

        let outcome = state.apply_push(msg(9, ME, "price?", 2));
        assert_eq!(
            outcome,
            PushOutcome::Applied { appended: false, needs_refresh: false }
        );
        assert_eq!(state.messages().len(), 1);
        assert_eq!(keys(&state), ["5_9", "12_5", "5_7"]);
        let front = &state.conversations()[0];
        assert_eq!(front.peer.id, 9);
        assert_eq!(
            front.preview,
            Some(Preview { text: "price?".into(), sent_at: 2 })
        );
    }

    #[test]
    fn push_for_front_conversation_keeps_order() {
        let mut state = state_with(&[(7, "Minh"), (12, "Lan")]);
        state.apply_push(msg(7, ME, "yo", 3));
        assert_eq!(keys(&state), ["5_7", "12_5"]);
    }

    #[test]
    fn active_conversation_is_not_promoted() {
        let mut state = state_with(&[(7, "Minh"), (12, "Lan")]);
        state.open(12);
        state.apply_push(msg(12, ME, "hey", 3));
        assert_eq!(keys(&state), ["5_7", "12_5"]);
    }

    #[test]
    fn push_for_unknown_conversation_asks_for_refresh() {
        let mut state = state_with(&[(12, "Lan")]);
        let outcome = state.apply_push(msg(33, ME, "new buyer", 1));
        assert_eq!(
            outcome,
            PushOutcome::Applied { appended: false, needs_refresh: true }
        );
        assert_eq!(keys(&state), ["12_5"]);
    }

    #[test]
    fn push_uses_derived_key_not_wire_key() {
        let mut state = state_with(&[(12, "Lan")]);
        state.open(12);
        let mut m = msg(12, ME, "hi", 1);
        m.conversation_key = "garbage".into();
        state.apply_push(m);
        assert_eq!(state.messages()[0].conversation_key, "12_5");
    }

    #[test]
    fn optimistic_send_is_visible_immediately() {
        let mut state = state_with(&[(12, "Lan")]);
        state.open(12);
        let sent = state.begin_send("  is the battery original?  ", 1_000).unwrap();
        assert_eq!(sent.content, "is the battery original?");
        assert_eq!(sent.delivery, Delivery::Pending);
        assert_eq!(state.messages(), [sent]);
    }

    #[test]
    fn send_requires_text_and_open_conversation() {
        let mut state = state_with(&[(12, "Lan")]);
        assert!(state.begin_send("hello", 1).is_none());
        state.open(12);
        assert!(state.begin_send("   ", 1).is_none());
        assert!(state.messages().is_empty());
    }

    #[test]
    fn optimistic_timestamps_never_collide() {
        let mut state = state_with(&[(12, "Lan")]);
        state.open(12);
        let a = state.begin_send("a", 50).unwrap();
        let b = state.begin_send("b", 50).unwrap();
        let c = state.begin_send("c", 10).unwrap();
        assert!(a.sent_at < b.sent_at && b.sent_at < c.sent_at);
    }

    #[test]
    fn confirmed_send_updates_preview_and_status() {
        let mut state = state_with(&[(7, "Minh"), (12, "Lan")]);
        state.open(12);
        let sent = state.begin_send("deal", 10).unwrap();
        assert!(state.confirm_send(&sent, Some("srv-1".into())));

        let shown = &state.messages()[0];
        assert_eq!(shown.delivery, Delivery::Delivered);
        assert_eq!(shown.id.as_deref(), Some("srv-1"));
        assert_eq!(state.conversations()[1].preview.as_ref().unwrap().text, "deal");
    }

    #[test]
    fn failed_send_is_rolled_back_and_reported() {
        let mut state = state_with(&[(12, "Lan")]);
        state.open(12);
        state.apply_push(msg(12, ME, "hi", 1));
        let sent = state.begin_send("offer 200", 10).unwrap();
        let kept = state.begin_send("and a charger", 11).unwrap();

        state.fail_send(&sent, "HTTP 500");
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.messages()[1], kept);
        let notices = state.drain_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
        assert!(notices[0].text.contains("HTTP 500"));
        assert!(state.drain_notices().is_empty());
    }

    #[test]
    fn history_is_sorted_and_deduplicated() {
        let mut state = state_with(&[(12, "Lan")]);
        let key = state.open(12).unwrap();
        state.load_history(
            &key,
            vec![
                with_id(msg(ME, 12, "b", 2), "2"),
                with_id(msg(12, ME, "a", 1), "1"),
                with_id(msg(ME, 12, "b", 2), "2"),
            ],
        );
        let texts: Vec<&str> = state.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, ["a", "b"]);
    }

    #[test]
    fn history_keeps_pending_sends() {
        let mut state = state_with(&[(12, "Lan")]);
        let key = state.open(12).unwrap();
        let pending = state.begin_send("still there?", 500).unwrap();
        state.load_history(&key, vec![msg(12, ME, "old", 1)]);
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.messages()[1], pending);

        // once the server has it, history wins
        let mut state = state_with(&[(12, "Lan")]);
        let key = state.open(12).unwrap();
        let pending = state.begin_send("still there?", 500).unwrap();
        state.load_history(&key, vec![with_id(msg(ME, 12, "still there?", pending.sent_at), "s1")]);
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].id.as_deref(), Some("s1"));
    }

    #[test]
    fn history_keeps_messages_that_arrived_while_loading() {
        let mut state = state_with(&[(12, "Lan")]);
        let key = state.open(12).unwrap();
        let sent = state.begin_send("deal", 500).unwrap();
        state.confirm_send(&sent, Some("s2".into()));
        state.apply_push(msg(12, ME, "great", 600));
        state.load_history(&key, vec![msg(12, ME, "old", 1)]);
        let texts: Vec<&str> = state.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, ["old", "deal", "great"]);
    }

    #[test]
    fn stale_history_is_ignored() {
        let mut state = state_with(&[(12, "Lan"), (7, "Minh")]);
        let old_key = state.open(12).unwrap();
        state.open(7);
        state.load_history(&old_key, vec![msg(12, ME, "late", 1)]);
        assert!(state.messages().is_empty());
    }

    #[test]
    fn fetch_failures_clear_lists_and_notify() {
        let mut state = state_with(&[(12, "Lan")]);
        let key = state.open(12).unwrap();
        state.apply_push(msg(12, ME, "hi", 1));

        state.history_failed(&key, "timeout");
        assert!(state.messages().is_empty());
        state.conversations_failed("offline");
        assert!(state.conversations().is_empty());
        assert_eq!(state.drain_notices().len(), 2);
    }

    #[test]
    fn reopening_active_conversation_keeps_messages() {
        let mut state = state_with(&[(12, "Lan")]);
        state.open(12);
        state.apply_push(msg(12, ME, "hi", 1));
        state.open(12);
        assert_eq!(state.messages().len(), 1);
        state.open(7);
        assert!(state.messages().is_empty());
    }

    #[test]
    fn cannot_open_chat_with_self() {
        let mut state = ChatState::new(ME);
        assert!(state.open(ME).is_none());
        assert!(state.active().is_none());
        assert_eq!(state.drain_notices().len(), 1);
    }

    #[test]
    fn conversation_list_drops_repeated_keys() {
        let mut state = ChatState::new(ME);
        state.load_conversations(vec![conv(12, "Lan"), conv(7, "Minh"), conv(12, "Lan again")]);
        assert_eq!(keys(&state), ["12_5", "5_7"]);
        assert_eq!(state.conversations()[0].peer.display_name, "Lan");
    }

    #[test]
    fn upsert_inserts_front_or_replaces_in_place() {
        let mut state = state_with(&[(12, "Lan"), (7, "Minh")]);
        state.apply_push(msg(7, ME, "hey", 1));
        // 7 is now first; replace it without losing the preview
        state.upsert_conversation(conv(7, "Minh Tran"));
        assert_eq!(keys(&state), ["5_7", "12_5"]);
        assert_eq!(state.conversations()[0].peer.display_name, "Minh Tran");
        assert!(state.conversations()[0].preview.is_some());

        state.upsert_conversation(conv(40, "New"));
        assert_eq!(keys(&state), ["40_5", "5_7", "12_5"]);
    }
}

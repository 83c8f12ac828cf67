use std::io::Write;

use crate::api::models::{ChatMessage, Conversation, Delivery, UserId};
use crate::chat::session::ChatView;
use crate::chat::state::{Notice, NoticeLevel};
use crate::ui::sidebar::Sidebar;
use crate::utils::format_time;

/// Line-oriented chat transcript. Appends when the list only grew,
/// reprints it when earlier lines changed.
pub struct TerminalView<W: Write> {
    out: W,
    sidebar: Sidebar,
    shown_key: Option<String>,
    shown: Vec<(i64, UserId, String)>,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            sidebar: Sidebar::new(),
            shown_key: None,
            shown: Vec::new(),
        }
    }

    fn line(&self, me: UserId, msg: &ChatMessage) -> String {
        let who = if msg.sender_id == me {
            "you".to_string()
        } else {
            self.sidebar
                .name_of(&msg.conversation_key)
                .map(str::to_string)
                .unwrap_or_else(|| format!("User {}", msg.sender_id))
        };
        let status = if msg.delivery == Delivery::Pending { " (sending…)" } else { "" };
        format!("[{}] {who}: {}{status}", format_time(msg.sent_at), msg.content)
    }

    fn write_lines(&mut self, lines: &[String]) {
        for line in lines {
            if let Err(e) = writeln!(self.out, "{line}") {
                log::warn!("cannot write to terminal: {e}");
                return;
            }
        }
        let _ = self.out.flush();
    }
}

impl<W: Write> ChatView for TerminalView<W> {
    fn conversations(&mut self, list: &[Conversation], active: Option<&str>) {
        if let Err(e) = self.sidebar.set_items(&mut self.out, list, active) {
            log::warn!("cannot write to terminal: {e}");
        }
        let _ = self.out.flush();
    }

    fn messages(&mut self, me: UserId, key: Option<&str>, list: &[ChatMessage]) {
        let mut lines = Vec::new();
        if self.shown_key.as_deref() != key {
            match key {
                Some(k) => {
                    let name = self.sidebar.name_of(k).unwrap_or(k);
                    lines.push(format!("── Chat with {name} ──"));
                }
                None => lines.push("── No conversation open ──".to_string()),
            }
            self.shown_key = key.map(str::to_string);
            self.shown.clear();
        }

        let current: Vec<(i64, UserId, String)> = list
            .iter()
            .map(|m| (m.sent_at, m.sender_id, m.content.clone()))
            .collect();
        let start = if current.starts_with(&self.shown) {
            self.shown.len()
        } else {
            lines.push("── (updated) ──".to_string());
            0
        };
        for msg in &list[start..] {
            lines.push(self.line(me, msg));
        }
        self.shown = current;
        self.write_lines(&lines);
    }

    fn notice(&mut self, notice: &Notice) {
        let tag = match notice.level {
            NoticeLevel::Info => "[i]",
            NoticeLevel::Error => "[!]",
        };
        self.write_lines(&[format!("{tag} {}", notice.text)]);
    }
}

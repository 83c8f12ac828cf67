use std::collections::HashMap;
use std::io::{self, Write};

use crate::api::models::{Conversation, Preview};
use crate::utils::format_time;

/// Conversation list. Prints the whole list when its order or membership
/// changes, otherwise just the entries whose preview moved.
#[derive(Debug, Default)]
pub struct Sidebar {
    keys: Vec<String>,
    previews: HashMap<String, Option<Preview>>,
    names: HashMap<String, String>,
}

impl Sidebar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_of(&self, key: &str) -> Option<&str> {
        self.names.get(key).map(String::as_str)
    }

    pub fn set_items(
        &mut self,
        out: &mut impl Write,
        list: &[Conversation],
        active: Option<&str>,
    ) -> io::Result<()> {
        let keys: Vec<String> = list.iter().map(|c| c.key.clone()).collect();
        if keys != self.keys {
            writeln!(out, "── Conversations ({}) ──", list.len())?;
            for conv in list {
                let marker = if Some(conv.key.as_str()) == active { '*' } else { ' ' };
                writeln!(out, "{marker} {:<6} {}", conv.peer.id, row_text(conv))?;
            }
        } else {
            for conv in list {
                let changed = self.previews.get(&conv.key) != Some(&conv.preview);
                if changed && Some(conv.key.as_str()) != active {
                    writeln!(out, "• {}", row_text(conv))?;
                }
            }
        }
        self.keys = keys;
        self.previews = list.iter().map(|c| (c.key.clone(), c.preview.clone())).collect();
        self.names = list.iter().map(|c| (c.key.clone(), c.peer.label())).collect();
        Ok(())
    }
}

fn row_text(conv: &Conversation) -> String {
    match &conv.preview {
        Some(p) => format!("{}: {} ({})", conv.peer.label(), p.text, format_time(p.sent_at)),
        None => conv.peer.label(),
    }
}

//! Turns rendered template text back into role-tagged messages.
//!
//! The rendered string is walked line by line. Role and history markers close
//! the message being built; everything else accumulates as text until the
//! next flush, where media and section markers split it into parts.

use crate::marker::{Marker, Segment, decode_flow_markers, decode_part_markers};
use crate::message::{Message, Part, Role};

/// Assemble messages from rendered text, splicing in `history` if given
///
/// History lands where the template placed `{{history}}`. Without that
/// marker, it goes right after the leading system messages.
pub fn to_messages(rendered: &str, history: Option<&[Message]>) -> Vec<Message> {
    let mut assembler = MessageAssembler::new(history);

    for (index, line) in rendered.split('\n').enumerate() {
        if index > 0 {
            assembler.buffer.push('\n');
        }
        for segment in decode_flow_markers(line) {
            match segment {
                Segment::Text(text) => assembler.buffer.push_str(text),
                Segment::Marker(Marker::Role(role)) => {
                    assembler.flush();
                    assembler.role = role;
                }
                Segment::Marker(Marker::History) => assembler.insert_history(),
                Segment::Marker(_) => {}
            }
        }
    }
    assembler.flush();
    assembler.finish(rendered)
}

struct MessageAssembler<'h> {
    role: Role,
    buffer: String,
    messages: Vec<Message>,
    history: Option<&'h [Message]>,
    history_inserted: bool,
}

impl<'h> MessageAssembler<'h> {
    fn new(history: Option<&'h [Message]>) -> Self {
        Self {
            role: Role::User,
            buffer: String::new(),
            messages: Vec::new(),
            history,
            history_inserted: false,
        }
    }

    fn flush(&mut self) {
        let text = std::mem::take(&mut self.buffer);
        if text.trim().is_empty() {
            return;
        }

        let content = split_parts(&text);
        if !content.is_empty() {
            self.messages.push(Message::new(self.role, content));
        }
    }

    fn insert_history(&mut self) {
        self.flush();
        if !self.history_inserted {
            if let Some(history) = self.history {
                self.messages.extend(history.iter().map(Message::as_history));
            }
            self.history_inserted = true;
        }
        self.role = Role::Model;
    }

    fn finish(mut self, rendered: &str) -> Vec<Message> {
        if self.messages.is_empty() {
            let trimmed = rendered.trim();
            if !trimmed.is_empty() {
                self.messages.push(Message::text(Role::User, trimmed));
            }
        }

        if let Some(history) = self.history.filter(|h| !h.is_empty()) {
            if !self.history_inserted {
                let at = self
                    .messages
                    .iter()
                    .take_while(|m| m.role == Role::System)
                    .count();
                self.messages
                    .splice(at..at, history.iter().map(Message::as_history));
            }
        }
        self.messages
    }
}

/// Split flushed text into text, media and pending-section parts
fn split_parts(text: &str) -> Vec<Part> {
    decode_part_markers(text)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Text(piece) if piece.trim().is_empty() => None,
            Segment::Text(piece) => Some(Part::text(piece)),
            Segment::Marker(Marker::Media { url, content_type }) => {
                Some(Part::media(url, content_type))
            }
            Segment::Marker(Marker::Section(name)) => Some(Part::pending_section(name)),
            Segment::Marker(_) => None,
        })
        .collect()
}

//! Diagnostic message records shared by the parser, the scope table, and
//! (later, out of scope here) semantic passes.

use std::path::PathBuf;

/// Severity of a [`Message`]. Warnings never stop parsing; errors still
/// leave a usable (partial) node behind where the parser can manage it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// One diagnostic: exact source position plus enough context to present to
/// a user. `file` is the normalized file URI of the translation unit that
/// produced the message (§6).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub severity: Severity,
    pub text: String,
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl Message {
    pub fn error(text: impl Into<String>, file: PathBuf, line: u32, column: u32) -> Self {
        Message {
            severity: Severity::Error,
            text: text.into(),
            file,
            line,
            column,
        }
    }

    pub fn warning(text: impl Into<String>, file: PathBuf, line: u32, column: u32) -> Self {
        Message {
            severity: Severity::Warning,
            text: text.into(),
            file,
            line,
            column,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file.display(),
            self.line,
            self.column,
            kind,
            self.text
        )
    }
}

/// A project-wide message sink (§6 compile-project interface). Kept as a
/// trait so a driver can route messages into its own collection strategy
/// (e.g. grouped by file, deduplicated) while the parser only ever needs to
/// push.
pub trait MessageSink {
    fn push(&mut self, message: Message);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageSink for Vec<Message> {
    fn push(&mut self, message: Message) {
        Vec::push(self, message);
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_file_line_column_kind_text() {
        let m = Message::error("duplicate class \"B\"", PathBuf::from("a.ember"), 3, 7);
        assert_eq!(format!("{}", m), "a.ember:3:7: error: duplicate class \"B\"");
    }

    #[test]
    fn vec_message_sink_pushes_in_order() {
        let mut sink: Vec<Message> = Vec::new();
        sink.push(Message::warning("w1", PathBuf::from("a"), 1, 1));
        sink.push(Message::error("e1", PathBuf::from("a"), 2, 1));
        assert_eq!(sink.len(), 2);
        assert!(!sink[0].is_error());
        assert!(sink[1].is_error());
    }
}

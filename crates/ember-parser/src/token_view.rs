//! Token view (C1): a bounded random-access window over a token array.
//!
//! All positions handled by this module are offsets into the *view*, never
//! into the underlying array directly — the view translates to the
//! underlying index only when it needs to read a token. This lets the
//! expression and statement parsers hand a narrowed view (e.g. "the tokens
//! up to but not including the next top-level comma") to a sub-parser
//! without copying.

use crate::token::{Token, TokenKind};

const MAX_DESCRIBE_LEN: usize = 32;

/// A bounded window `[base, base + limit)` into `tokens`. Offsets passed to
/// every method here are relative to `base`; `limit` is the number of
/// tokens the view may consume starting at `base`, which may be less than
/// `tokens.len() - base`.
#[derive(Clone, Copy)]
pub struct TokenView<'a> {
    tokens: &'a [Token],
    base: usize,
    limit: usize,
}

impl<'a> TokenView<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        TokenView {
            tokens,
            base: 0,
            limit: tokens.len(),
        }
    }

    /// A sub-view starting `offset` tokens into this view and consuming at
    /// most `len` further tokens (clamped to this view's own limit).
    pub fn sub_view(&self, offset: usize, len: usize) -> TokenView<'a> {
        let new_base = self.base + offset.min(self.limit);
        let remaining = self.limit.saturating_sub(offset);
        TokenView {
            tokens: self.tokens,
            base: new_base,
            limit: len.min(remaining),
        }
    }

    /// Number of tokens this view may consume.
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.limit == 0
    }

    /// Invariant: offsets never exceed the view limit when dereferenced.
    pub fn get(&self, offset: usize) -> Option<&'a Token> {
        if offset >= self.limit {
            return None;
        }
        self.tokens.get(self.base + offset)
    }

    /// Index of the last real token this view can see, if any.
    fn last_real_offset(&self) -> Option<usize> {
        if self.limit == 0 { None } else { Some(self.limit - 1) }
    }

    /// `line(i)`, clamped to the last real token when `i` exceeds the view.
    pub fn line(&self, offset: usize) -> u32 {
        if let Some(tok) = self.get(offset) {
            return tok.line;
        }
        match self.last_real_offset().and_then(|o| self.get(o)) {
            Some(tok) => tok.line,
            None => 1,
        }
    }

    /// `column(i)`, clamped to the last real token when `i` exceeds the view.
    pub fn column(&self, offset: usize) -> u32 {
        if let Some(tok) = self.get(offset) {
            return tok.column;
        }
        match self.last_real_offset().and_then(|o| self.get(o)) {
            Some(tok) => tok.column,
            None => 1,
        }
    }

    /// `name(i)`: the token-kind name, or "end of file" when past end.
    pub fn name(&self, offset: usize) -> &'static str {
        match self.get(offset) {
            Some(tok) => tok.kind.name(),
            None => "end of file",
        }
    }

    /// `describe(i)`: a deterministic, human-readable snippet for
    /// diagnostics. Keywords are quoted, identifiers are truncated with an
    /// ellipsis beyond 32 bytes, operator symbols print their canonical
    /// form, integer literals print verbatim.
    pub fn describe(&self, offset: usize) -> String {
        let Some(tok) = self.get(offset) else {
            return "end of file".to_string();
        };
        match tok.kind {
            TokenKind::Keyword => format!("\"{}\"", tok.text().unwrap_or_default()),
            TokenKind::Identifier => truncate_identifier(tok.text().unwrap_or_default()),
            TokenKind::BinaryOperator | TokenKind::UnaryOperator => {
                tok.text().unwrap_or_default().to_string()
            }
            TokenKind::Integer => match &tok.payload {
                crate::token::TokenPayload::Int(n) => n.to_string(),
                _ => "integer literal".to_string(),
            },
            TokenKind::Float => match &tok.payload {
                crate::token::TokenPayload::Float(n) => n.to_string(),
                _ => "float literal".to_string(),
            },
            TokenKind::StringLiteral => format!("string \"{}\"", tok.text().unwrap_or_default()),
            TokenKind::BytesLiteral => "bytes literal".to_string(),
            TokenKind::Bool => match &tok.payload {
                crate::token::TokenPayload::Bool(b) => b.to_string(),
                _ => "bool literal".to_string(),
            },
            TokenKind::NoneLiteral => "none".to_string(),
            TokenKind::Bracket => match &tok.payload {
                crate::token::TokenPayload::Bracket(c) => c.to_string(),
                _ => "bracket".to_string(),
            },
            TokenKind::Comma => ",".to_string(),
            TokenKind::Colon => ":".to_string(),
            TokenKind::MapArrow => "=>".to_string(),
            TokenKind::InlineFuncArrow => "=>".to_string(),
        }
    }
}

fn truncate_identifier(name: &str) -> String {
    if name.len() <= MAX_DESCRIBE_LEN {
        return name.to_string();
    }
    // Truncate at a char boundary at or before the byte cap so we never
    // split a multi-byte UTF-8 sequence.
    let mut end = MAX_DESCRIBE_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &name[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Token;

    fn toks() -> Vec<Token> {
        vec![
            Token::keyword("func", 1, 1),
            Token::identifier("fib", 1, 6),
            Token::bracket('(', 1, 9),
        ]
    }

    #[test]
    fn past_end_name_is_end_of_file() {
        let tokens = toks();
        let view = TokenView::new(&tokens);
        assert_eq!(view.name(10), "end of file");
    }

    #[test]
    fn past_end_line_column_clamp_to_last_real_token() {
        let tokens = toks();
        let view = TokenView::new(&tokens);
        assert_eq!(view.line(50), 1);
        assert_eq!(view.column(50), 9);
    }

    #[test]
    fn describe_quotes_keywords_and_truncates_long_identifiers() {
        let mut tokens = toks();
        let long_name = "x".repeat(40);
        tokens.push(Token::identifier(long_name.clone(), 2, 1));
        let view = TokenView::new(&tokens);
        assert_eq!(view.describe(0), "\"func\"");
        let desc = view.describe(3);
        assert!(desc.ends_with("..."));
        assert!(desc.len() < long_name.len());
    }

    #[test]
    fn sub_view_offsets_are_relative() {
        let tokens = toks();
        let view = TokenView::new(&tokens);
        let sub = view.sub_view(1, 2);
        assert_eq!(sub.limit(), 2);
        assert_eq!(sub.name(0), "identifier");
    }

    #[test]
    fn empty_view_clamps_to_default_position() {
        let tokens: Vec<Token> = Vec::new();
        let view = TokenView::new(&tokens);
        assert_eq!(view.line(0), 1);
        assert_eq!(view.column(0), 1);
        assert_eq!(view.name(0), "end of file");
    }
}

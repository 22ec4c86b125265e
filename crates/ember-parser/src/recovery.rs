//! Error recovery (C6): two independent resynchronization heuristics run
//! after a local parse failure.

use crate::token::TokenKind;
use crate::token_view::TokenView;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FindNextStatementFlags: u8 {
        /// Forbid returning the starting index even if it already looks
        /// like a statement start.
        const MUST_FORWARD = 1 << 0;
    }
}

const STATEMENT_START_KEYWORDS: [&str; 18] = [
    "var", "const", "func", "class", "do", "rescue", "finally", "import", "raise", "break",
    "continue", "await", "async", "return", "with", "if", "while", "for",
];

fn looks_like_statement_start(view: TokenView<'_>, offset: usize) -> bool {
    match view.get(offset) {
        Some(tok) if tok.kind == TokenKind::Keyword => {
            tok.text().is_some_and(|t| STATEMENT_START_KEYWORDS.contains(&t))
        }
        Some(tok) => tok.is_identifier(),
        None => false,
    }
}

/// Scan forward from offset 0 tracking bracket depth. At depth 0, stop on
/// any token that starts a statement. At depth underflow through `}`/`)`,
/// land on the token after the bracket when it could begin a statement.
pub fn find_next_statement(view: TokenView<'_>, flags: FindNextStatementFlags) -> usize {
    let mut depth: i32 = 0;
    let mut offset = 0;

    while offset < view.limit() {
        let Some(tok) = view.get(offset) else { break };
        if let crate::token::TokenPayload::Bracket(c) = tok.payload {
            if c == '(' || c == '[' || c == '{' {
                depth += 1;
                offset += 1;
                continue;
            }
            if depth > 0 {
                depth -= 1;
                offset += 1;
                if depth == 0 && looks_like_statement_start(view, offset) {
                    if offset == 0 && flags.contains(FindNextStatementFlags::MUST_FORWARD) {
                        offset += 1;
                        continue;
                    }
                    return offset;
                }
                continue;
            }
        }
        if depth == 0 && looks_like_statement_start(view, offset) {
            if offset == 0 && flags.contains(FindNextStatementFlags::MUST_FORWARD) {
                offset += 1;
                continue;
            }
            return offset;
        }
        offset += 1;
    }
    offset
}

/// Scan forward tracking bracket depth, stopping at a top-level `}` or a
/// top-level `class`/`import` keyword (which must lie outside the
/// current block).
pub fn find_end_of_block(view: TokenView<'_>) -> usize {
    let mut depth: i32 = 0;
    let mut offset = 0;
    while offset < view.limit() {
        let Some(tok) = view.get(offset) else { break };
        if let crate::token::TokenPayload::Bracket(c) = tok.payload {
            if c == '(' || c == '[' || c == '{' {
                depth += 1;
            } else {
                if depth == 0 && c == '}' {
                    return offset;
                }
                depth -= 1;
            }
        } else if depth == 0 && (tok.is_keyword("class") || tok.is_keyword("import")) {
            return offset;
        }
        offset += 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Token;

    #[test]
    fn find_next_statement_stops_at_keyword() {
        let tokens = vec![
            Token::identifier("garbage", 1, 1),
            Token::keyword("var", 2, 1),
            Token::identifier("x", 2, 5),
        ];
        let view = TokenView::new(&tokens);
        let pos = find_next_statement(view, FindNextStatementFlags::empty());
        assert_eq!(pos, 1);
    }

    #[test]
    fn must_forward_never_returns_start_index() {
        let tokens = vec![Token::keyword("var", 1, 1), Token::identifier("x", 1, 5)];
        let view = TokenView::new(&tokens);
        let pos = find_next_statement(view, FindNextStatementFlags::MUST_FORWARD);
        assert_ne!(pos, 0);
    }

    #[test]
    fn find_end_of_block_stops_at_top_level_close_brace() {
        let tokens = vec![
            Token::bracket('{', 1, 1),
            Token::identifier("x", 1, 2),
            Token::bracket('}', 1, 3),
            Token::bracket('}', 2, 1),
        ];
        let view = TokenView::new(&tokens);
        let pos = find_end_of_block(view);
        assert_eq!(pos, 3);
    }

    #[test]
    fn find_end_of_block_stops_at_top_level_class_keyword() {
        let tokens = vec![
            Token::identifier("x", 1, 1),
            Token::keyword("class", 2, 1),
        ];
        let view = TokenView::new(&tokens);
        let pos = find_end_of_block(view);
        assert_eq!(pos, 1);
    }
}

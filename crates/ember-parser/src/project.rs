//! Compile-project interface (§6): the object a translation unit parses
//! against. Owns the bump arena every node/interned name borrows from, so
//! callers construct a `Bump` first and hand it in rather than the project
//! owning the allocator itself (§9 design note — avoids a self-referential
//! struct).

use std::path::PathBuf;

use bumpalo::Bump;
use ember_core::{Arena, AttributeInterner, Message, NodeId, Outcome};

use crate::ast::AstNode;
use crate::scope::{ScopeId, ScopeTable, WarningConfig};
use crate::stmt_parser::{StatementMode, StmtParser};
use crate::token::Token;
use crate::token_view::TokenView;

/// Everything a translation unit needs that outlives a single parse call:
/// the node arena, the scope table, the attribute interner, the message
/// sink, and warning configuration. One `SimpleProject` per translation
/// unit; `bump` must outlive it.
pub struct SimpleProject<'bump> {
    pub arena: Arena<'bump, AstNode>,
    pub scopes: ScopeTable,
    pub interner: AttributeInterner<'bump>,
    pub messages: Vec<Message>,
    pub warnings: WarningConfig,
    pub file: PathBuf,
}

/// The parser's return value (§6): a statement list, the global scope,
/// and (via `project.messages`) the result-message record.
pub struct ParseUnitResult {
    pub statements: Vec<NodeId>,
    pub global_scope: ScopeId,
}

impl<'bump> SimpleProject<'bump> {
    pub fn new(bump: &'bump Bump, file: PathBuf, warnings: WarningConfig) -> Self {
        SimpleProject {
            arena: Arena::new(bump),
            scopes: ScopeTable::new(),
            interner: AttributeInterner::new(bump),
            messages: Vec::new(),
            warnings,
            file,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(Message::is_error)
    }

    /// Parse a full translation unit's token stream at top level.
    /// Returns the global scope and the top-level statement list,
    /// wiring parent pointers afterward.
    pub fn parse_unit(&mut self, tokens: &[Token]) -> Outcome<ParseUnitResult> {
        let global = self.scopes.new_global();
        let view = TokenView::new(tokens);
        let warnings = self.warnings;
        let mut stmt_parser = StmtParser {
            arena: &mut self.arena,
            scopes: &mut self.scopes,
            warnings: &warnings,
            messages: &mut self.messages,
            interner: &mut self.interner,
            file: self.file.clone(),
        };
        let statements = stmt_parser.parse_block_body(view, global, StatementMode::TopLevel)?;
        crate::transform::wire_parent_pointers(&mut self.arena, &statements);
        Ok(ParseUnitResult {
            statements,
            global_scope: global,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsing_a_function_definition_registers_it_in_global_scope() {
        let bump = Bump::new();
        let mut project = SimpleProject::new(&bump, PathBuf::from("t.eb"), WarningConfig::default());
        let tokens = vec![
            Token::keyword("func", 1, 1),
            Token::identifier("fib", 1, 6),
            Token::bracket('(', 1, 9),
            Token::identifier("n", 1, 10),
            Token::bracket(')', 1, 11),
            Token::bracket('{', 1, 13),
            Token::keyword("return", 2, 3),
            Token::identifier("n", 2, 10),
            Token::bracket('}', 3, 1),
        ];
        let result = project.parse_unit(&tokens).unwrap();
        assert_eq!(result.statements.len(), 1);
        assert!(!project.has_errors());
        assert!(
            project
                .scopes
                .query(result.global_scope, "fib", crate::scope::QueryFlags::empty())
                .is_some()
        );
    }

    #[test]
    fn recovery_resynchronizes_past_a_malformed_statement() {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();
        let bump = Bump::new();
        let mut project = SimpleProject::new(&bump, PathBuf::from("t.eb"), WarningConfig::default());
        // `huh` is not a recognized keyword, so it reports an error and
        // leaves a placeholder node; the following `var x` must still
        // parse and register normally once recovery resynchronizes.
        let tokens = vec![
            Token::keyword("huh", 1, 1),
            Token::keyword("var", 2, 1),
            Token::identifier("x", 2, 5),
        ];
        let result = project.parse_unit(&tokens).unwrap();
        assert!(project.has_errors());
        assert_eq!(result.statements.len(), 2);
        assert!(
            project
                .scopes
                .query(result.global_scope, "x", crate::scope::QueryFlags::empty())
                .is_some()
        );
    }

    #[test]
    fn duplicate_class_at_top_level_reports_an_error() {
        let bump = Bump::new();
        let mut project = SimpleProject::new(&bump, PathBuf::from("t.eb"), WarningConfig::default());
        let tokens = vec![
            Token::keyword("class", 1, 1),
            Token::identifier("A", 1, 7),
            Token::bracket('{', 1, 9),
            Token::bracket('}', 1, 10),
            Token::keyword("class", 2, 1),
            Token::identifier("A", 2, 7),
            Token::bracket('{', 2, 9),
            Token::bracket('}', 2, 10),
        ];
        project.parse_unit(&tokens).unwrap();
        assert!(project.has_errors());
    }
}

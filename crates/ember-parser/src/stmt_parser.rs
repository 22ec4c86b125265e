//! Statement parser (C5): top-level, function, class, and block-body
//! statement parsing, gated by [`StatementMode`].

use ember_core::{Arena, AttributeInterner, Message, MessageSink, NodeId, Outcome};

use crate::ast::{
    AssignOp, AstNode, ClassDef, ClassModifiers, DoStmt, ForStmt, FuncDef, FuncModifiers, IfBranch,
    IfStmt, ImportStmt, NodeKind, RescueClause, VarDef, VarModifiers, WhileStmt, WithClause, WithStmt,
};
use tracing::{debug, trace};

use crate::expr_parser::ExprParser;
use crate::recovery::{self, FindNextStatementFlags};
use crate::scope::{DeclKind, ScopeFailure, ScopeId, ScopeTable, WarningConfig};
use crate::token::TokenKind;
use crate::token_view::TokenView;

/// The four contexts a statement may be parsed in (§4.5). Each statement
/// kind legality-checks itself against the current mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementMode {
    TopLevel,
    InClass,
    InFunction,
    InClassFunction,
}

impl StatementMode {
    fn is_in_function(self) -> bool {
        matches!(self, StatementMode::InFunction | StatementMode::InClassFunction)
    }

    fn function_body_mode(self) -> StatementMode {
        match self {
            StatementMode::InClass => StatementMode::InClassFunction,
            _ => StatementMode::InFunction,
        }
    }
}

pub struct StmtParser<'bump, 'a> {
    pub arena: &'a mut Arena<'bump, AstNode>,
    pub scopes: &'a mut ScopeTable,
    pub warnings: &'a WarningConfig,
    pub messages: &'a mut dyn MessageSink,
    pub interner: &'a mut AttributeInterner<'bump>,
    pub file: std::path::PathBuf,
}

/// Outcome of parsing a single block-body statement: the node (always
/// produced, even on error, so the caller can keep going) and how many
/// view offsets were consumed.
pub struct ParsedStmt {
    pub node: NodeId,
    pub consumed: usize,
}

impl<'bump, 'a> StmtParser<'bump, 'a> {
    fn alloc(&mut self, kind: NodeKind, line: u32, column: u32, token_index: usize) -> NodeId {
        self.arena.alloc(AstNode::new(kind, line, column, token_index))
    }

    fn error(&mut self, line: u32, column: u32, text: impl Into<String>) {
        self.messages
            .push(Message::error(text.into(), self.file.clone(), line, column));
    }

    fn expr_parser<'p>(&'p mut self, scope_warnings: &'p WarningConfig) -> ExprParser<'bump, 'p> {
        ExprParser {
            arena: self.arena,
            scopes: self.scopes,
            warnings: scope_warnings,
            messages: self.messages,
            file: self.file.clone(),
        }
    }

    fn declare(
        &mut self,
        scope: ScopeId,
        name: &str,
        decl: NodeId,
        kind: DeclKind,
        line: u32,
        column: u32,
        element_path: Option<&str>,
    ) {
        match self.scopes.add(scope, name, decl, kind, line, column, element_path, self.warnings) {
            Ok(_) => {}
            Err(ScopeFailure::Duplicate { prior }) => self.error(
                prior.line,
                prior.column,
                format!("'{name}' is already declared as a {} in this scope", prior.kind.describe()),
            ),
            Err(ScopeFailure::ForbiddenParameterRedeclare { .. }) => {
                self.error(line, column, format!("'{name}' redeclares a function parameter"))
            }
            Err(ScopeFailure::ReservedIdentifier { name }) => {
                self.error(line, column, format!("'{name}' is a reserved identifier"))
            }
        }
    }

    /// Parse one block-body statement starting at offset 0 of `view`.
    pub fn parse_statement(
        &mut self,
        view: TokenView<'_>,
        scope: ScopeId,
        mode: StatementMode,
    ) -> Outcome<ParsedStmt> {
        trace!(mode = ?mode, "parse_statement: enter");
        let result = self.parse_statement_inner(view, scope, mode);
        if let Ok(parsed) = &result {
            trace!(consumed = parsed.consumed, "parse_statement: exit");
        }
        result
    }

    fn parse_statement_inner(
        &mut self,
        view: TokenView<'_>,
        scope: ScopeId,
        mode: StatementMode,
    ) -> Outcome<ParsedStmt> {
        let Some(tok) = view.get(0) else {
            let node = self.alloc(NodeKind::Break, view.line(0), view.column(0), 0);
            return Ok(ParsedStmt { node, consumed: 0 });
        };
        let line = tok.line;
        let column = tok.column;

        if tok.kind == TokenKind::Keyword {
            return match tok.text().unwrap_or_default() {
                "var" => self.parse_var(view, scope, false),
                "const" => self.parse_var(view, scope, true),
                "func" => self.parse_func(view, scope, mode),
                "class" => self.parse_class(view, scope, mode),
                "do" => self.parse_do(view, scope, mode),
                "import" => self.parse_import(view, scope, mode),
                "raise" => self.parse_raise(view, scope, mode),
                "break" => self.parse_no_operand(view, mode, NodeKind::Break, "break"),
                "continue" => self.parse_no_operand(view, mode, NodeKind::Continue, "continue"),
                "await" => self.parse_await(view, scope, mode),
                "async" => self.parse_async(view, scope, mode),
                "return" => self.parse_return(view, scope, mode),
                "with" => self.parse_with(view, scope, mode),
                "if" => self.parse_if(view, scope, mode),
                "while" => self.parse_while(view, scope, mode),
                "for" => self.parse_for(view, scope, mode),
                other => {
                    self.error(line, column, format!("unexpected keyword '{other}'"));
                    let node = self.alloc(NodeKind::Break, line, column, 0);
                    Ok(ParsedStmt { node, consumed: 1 })
                }
            };
        }

        self.parse_expr_or_assignment_statement(view, scope)
    }

    fn require_mode(&mut self, line: u32, column: u32, ok: bool, what: &str) {
        if !ok {
            self.error(line, column, format!("'{what}' is not allowed here"));
        }
    }

    fn find_stmt_end(&self, view: TokenView<'_>) -> usize {
        let mut depth: i32 = 0;
        let mut offset = 0;
        while let Some(tok) = view.get(offset) {
            if let crate::token::TokenPayload::Bracket(c) = tok.payload {
                if c == '(' || c == '[' || c == '{' {
                    depth += 1;
                } else if depth > 0 {
                    depth -= 1;
                } else {
                    break;
                }
            } else if depth == 0 && offset > 0 {
                break;
            }
            offset += 1;
        }
        offset.max(1)
    }

    fn parse_var(&mut self, view: TokenView<'_>, scope: ScopeId, is_const: bool) -> Outcome<ParsedStmt> {
        let line = view.line(0);
        let column = view.column(0);
        let Some(name_tok) = view.get(1).filter(|t| t.is_identifier()) else {
            self.error(line, column, "expected a name after 'var'/'const'");
            let node = self.alloc(NodeKind::Break, line, column, 0);
            return Ok(ParsedStmt { node, consumed: 1 });
        };
        let name = name_tok.text().unwrap_or_default().to_string();

        let mut offset = 2;
        let mut modifiers = VarModifiers::empty();
        loop {
            match view.get(offset).and_then(|t| t.text()) {
                Some("deprecated") if view.get(offset).unwrap().kind == TokenKind::Keyword => {
                    modifiers |= VarModifiers::DEPRECATED;
                    offset += 1;
                }
                Some("protect") if view.get(offset).unwrap().kind == TokenKind::Keyword => {
                    if is_const {
                        self.error(line, column, "'protect' is not allowed on 'const'");
                    }
                    modifiers |= VarModifiers::PROTECT;
                    offset += 1;
                }
                Some("equals") if view.get(offset).unwrap().kind == TokenKind::Keyword => {
                    if modifiers.contains(VarModifiers::PROTECT) {
                        self.error(line, column, "'equals' already implies 'protect'; do not combine them");
                    }
                    modifiers |= VarModifiers::EQUALS;
                    offset += 1;
                }
                _ => break,
            }
        }

        let mut initializer = None;
        if view.get(offset).is_some_and(|t| t.is_binary_op("=")) {
            offset += 1;
            let rest = view.sub_view(offset, view.limit().saturating_sub(offset));
            let expr_end = self.find_stmt_end(rest);
            let expr_view = rest.sub_view(0, expr_end);
            let warnings = *self.warnings;
            let parsed = self.expr_parser(&warnings).parse_greedy(expr_view, scope)?;
            initializer = Some(parsed.node);
            offset += expr_end;
        } else if let Some(tok) = view.get(offset)
            && tok.kind == crate::token::TokenKind::BinaryOperator
            && tok.text().is_some_and(|t| t != "=")
        {
            self.error(line, column, format!("expected '=' as initializer operator, found '{}'", tok.text().unwrap_or_default()));
            offset += 1;
        }

        let decl = self.alloc(
            NodeKind::VarDef(VarDef {
                name: name.clone(),
                modifiers,
                is_const,
                initializer,
            }),
            line,
            column,
            0,
        );
        self.declare(scope, &name, decl, DeclKind::Variable, line, column, None);
        Ok(ParsedStmt { node: decl, consumed: offset })
    }

    fn parse_func(&mut self, view: TokenView<'_>, scope: ScopeId, mode: StatementMode) -> Outcome<ParsedStmt> {
        let line = view.line(0);
        let column = view.column(0);
        let Some(name_tok) = view.get(1).filter(|t| t.is_identifier()) else {
            self.error(line, column, "expected a name after 'func'");
            let node = self.alloc(NodeKind::Break, line, column, 0);
            return Ok(ParsedStmt { node, consumed: 1 });
        };
        let name = name_tok.text().unwrap_or_default().to_string();

        if !view.get(2).is_some_and(|t| t.is_bracket('(')) {
            self.error(line, column, "expected '(' after function name");
            let node = self.alloc(NodeKind::Break, line, column, 0);
            return Ok(ParsedStmt { node, consumed: 2 });
        }
        let params_view = view.sub_view(3, view.limit().saturating_sub(3));
        let close = self.scan_to_close_paren(params_view);

        let func_scope = self.scopes.new_child(scope, true);
        let args = self.parse_args(params_view.sub_view(0, close), func_scope);

        let mut offset = 3 + close + 1;
        let mut modifiers = FuncModifiers::empty();
        loop {
            match view.get(offset).filter(|t| t.kind == TokenKind::Keyword).and_then(|t| t.text()) {
                Some("parallel") => {
                    if modifiers.contains(FuncModifiers::NOPARALLEL) {
                        self.error(line, column, "'parallel' and 'noparallel' are mutually exclusive");
                    }
                    modifiers |= FuncModifiers::PARALLEL;
                    offset += 1;
                }
                Some("noparallel") => {
                    if modifiers.contains(FuncModifiers::PARALLEL) {
                        self.error(line, column, "'parallel' and 'noparallel' are mutually exclusive");
                    }
                    modifiers |= FuncModifiers::NOPARALLEL;
                    offset += 1;
                }
                Some("deprecated") => {
                    modifiers |= FuncModifiers::DEPRECATED;
                    offset += 1;
                }
                _ => break,
            }
        }

        if !view.get(offset).is_some_and(|t| t.is_bracket('{')) {
            self.error(line, column, "expected '{' to open function body");
            let node = self.alloc(NodeKind::Break, line, column, 0);
            return Ok(ParsedStmt { node, consumed: offset });
        }
        let body_view = view.sub_view(offset + 1, view.limit().saturating_sub(offset + 1));
        let body_close = self.scan_to_close_brace(body_view);
        let body_mode = mode.function_body_mode();
        let body = self.parse_block_body(body_view.sub_view(0, body_close), func_scope, body_mode)?;

        let decl = self.alloc(
            NodeKind::FuncDef(FuncDef {
                name: name.clone(),
                params: args,
                body,
                modifiers,
                scope: func_scope,
                bytecode_func_id: None,
            }),
            line,
            column,
            0,
        );
        self.declare(scope, &name, decl, DeclKind::Function, line, column, None);
        Ok(ParsedStmt {
            node: decl,
            consumed: offset + 1 + body_close + 1,
        })
    }

    fn scan_to_close_paren(&self, view: TokenView<'_>) -> usize {
        self.scan_to_close_bracketed(view, '(', ')')
    }

    fn scan_to_close_brace(&self, view: TokenView<'_>) -> usize {
        self.scan_to_close_bracketed(view, '{', '}')
    }

    fn scan_to_close_bracketed(&self, view: TokenView<'_>, open: char, close: char) -> usize {
        let mut depth: i32 = 0;
        let mut offset = 0;
        while let Some(tok) = view.get(offset) {
            if let crate::token::TokenPayload::Bracket(c) = tok.payload {
                if c == close {
                    if depth == 0 {
                        return offset;
                    }
                    depth -= 1;
                } else if c == open {
                    depth += 1;
                } else if c == '(' || c == '[' || c == '{' {
                    depth += 1;
                } else {
                    depth -= 1;
                }
            }
            offset += 1;
        }
        offset
    }

    fn parse_args(&mut self, view: TokenView<'_>, func_scope: ScopeId) -> crate::ast::ArgList {
        use crate::ast::{Arg, ArgList};
        let mut args = Vec::new();
        let mut offset = 0;
        while offset < view.limit() {
            let Some(tok) = view.get(offset) else { break };
            if tok.kind == TokenKind::Comma {
                offset += 1;
                continue;
            }
            if !tok.is_identifier() {
                offset += 1;
                continue;
            }
            let name = tok.text().unwrap_or_default().to_string();
            let line = tok.line;
            let column = tok.column;
            let mut default = None;
            let mut consumed = 1;
            if view.get(offset + 1).is_some_and(|t| t.is_binary_op("=")) {
                let rest = view.sub_view(offset + 2, view.limit().saturating_sub(offset + 2));
                let end = {
                    let mut depth: i32 = 0;
                    let mut o = 0;
                    while let Some(t) = rest.get(o) {
                        if let crate::token::TokenPayload::Bracket(c) = t.payload {
                            if c == '(' || c == '[' || c == '{' {
                                depth += 1;
                            } else if depth == 0 {
                                break;
                            } else {
                                depth -= 1;
                            }
                        } else if depth == 0 && t.kind == TokenKind::Comma {
                            break;
                        }
                        o += 1;
                    }
                    o
                };
                let default_view = rest.sub_view(0, end);
                let warnings = *self.warnings;
                if let Ok(parsed) = self.expr_parser(&warnings).parse_greedy(default_view, func_scope) {
                    default = Some(parsed.node);
                }
                consumed = 2 + end;
            }
            args.push(Arg { name: Some(name.clone()), default });
            self.declare(func_scope, &name, NodeId::from_raw(0), DeclKind::Parameter, line, column, None);
            offset += consumed;
        }
        ArgList {
            args,
            unpack_last_positional: false,
        }
    }

    fn parse_class(&mut self, view: TokenView<'_>, scope: ScopeId, mode: StatementMode) -> Outcome<ParsedStmt> {
        let line = view.line(0);
        let column = view.column(0);
        self.require_mode(line, column, mode == StatementMode::TopLevel, "class");

        let Some(name_tok) = view.get(1).filter(|t| t.is_identifier()) else {
            self.error(line, column, "expected a name after 'class'");
            let node = self.alloc(NodeKind::Break, line, column, 0);
            return Ok(ParsedStmt { node, consumed: 1 });
        };
        let name = name_tok.text().unwrap_or_default().to_string();

        let mut offset = 2;
        let mut base_chain = None;
        if view.get(offset).is_some_and(|t| t.is_keyword("extends")) {
            offset += 1;
            let mut chain = Vec::new();
            while let Some(tok) = view.get(offset).filter(|t| t.is_identifier()) {
                chain.push(tok.text().unwrap_or_default().to_string());
                offset += 1;
                if view.get(offset).is_some_and(|t| t.is_binary_op(".")) {
                    offset += 1;
                } else {
                    break;
                }
            }
            if chain.is_empty() {
                self.error(line, column, "expected an identifier or dotted chain after 'extends'");
            }
            base_chain = Some(chain);
        }

        let mut modifiers = ClassModifiers::empty();
        while view.get(offset).is_some_and(|t| t.is_keyword("deprecated")) {
            modifiers |= ClassModifiers::DEPRECATED;
            offset += 1;
        }

        if !view.get(offset).is_some_and(|t| t.is_bracket('{')) {
            self.error(line, column, "expected '{' to open class body");
            let node = self.alloc(NodeKind::Break, line, column, 0);
            return Ok(ParsedStmt { node, consumed: offset });
        }
        let body_view = view.sub_view(offset + 1, view.limit().saturating_sub(offset + 1));
        let close = self.scan_to_close_brace(body_view);
        let class_scope = self.scopes.new_child(scope, true);

        let mut vars = Vec::new();
        let mut funcs = Vec::new();
        let mut inner_offset = 0;
        let inner = body_view.sub_view(0, close);
        while inner_offset < inner.limit() {
            let remaining = inner.sub_view(inner_offset, inner.limit().saturating_sub(inner_offset));
            let Some(tok) = remaining.get(0) else { break };
            if tok.is_keyword("var") || tok.is_keyword("const") {
                let is_const = tok.is_keyword("const");
                let parsed = self.parse_var(remaining, class_scope, is_const)?;
                vars.push(parsed.node);
                inner_offset += parsed.consumed;
            } else if tok.is_keyword("func") {
                let parsed = self.parse_func(remaining, class_scope, StatementMode::InClass)?;
                funcs.push(parsed.node);
                inner_offset += parsed.consumed;
            } else {
                self.error(remaining.line(0), remaining.column(0), "class bodies may only contain 'var' or 'func' members");
                inner_offset += 1;
            }
        }

        // Intern attribute names as soon as the body is parsed.
        for &v in &vars {
            if let Some(AstNode { kind: NodeKind::VarDef(vd), .. }) = self.arena.get(v) {
                let attr_name = vd.name.clone();
                self.interner.attribute_name_to_id(&attr_name, true);
            }
        }

        let decl = self.alloc(
            NodeKind::ClassDef(ClassDef {
                name: name.clone(),
                base_chain,
                modifiers,
                scope: class_scope,
                vars,
                funcs,
            }),
            line,
            column,
            0,
        );
        self.declare(scope, &name, decl, DeclKind::Class, line, column, None);
        Ok(ParsedStmt {
            node: decl,
            consumed: offset + 1 + close + 1,
        })
    }

    fn parse_do(&mut self, view: TokenView<'_>, scope: ScopeId, mode: StatementMode) -> Outcome<ParsedStmt> {
        let line = view.line(0);
        let column = view.column(0);
        self.require_mode(line, column, mode.is_in_function(), "do");

        if !view.get(1).is_some_and(|t| t.is_bracket('{')) {
            self.error(line, column, "expected '{' to open 'do' block");
            let node = self.alloc(NodeKind::Break, line, column, 0);
            return Ok(ParsedStmt { node, consumed: 1 });
        }
        let body_view = view.sub_view(2, view.limit().saturating_sub(2));
        let close = self.scan_to_close_brace(body_view);
        let body_scope = self.scopes.new_child(scope, false);
        let body = self.parse_block_body(body_view.sub_view(0, close), body_scope, mode)?;
        let mut offset = 2 + close + 1;

        let mut rescue = None;
        if view.get(offset).is_some_and(|t| t.is_keyword("rescue")) {
            offset += 1;
            let rescue_scope = self.scopes.new_child(scope, false);
            let mut types = Vec::new();
            loop {
                let remaining = view.sub_view(offset, view.limit().saturating_sub(offset));
                let end = {
                    let mut o = 0;
                    while let Some(t) = remaining.get(o) {
                        if t.kind == TokenKind::Comma || t.is_keyword("as") || t.is_bracket('{') {
                            break;
                        }
                        o += 1;
                    }
                    o
                };
                let warnings = *self.warnings;
                let sub = remaining.sub_view(0, end);
                let parsed = self.expr_parser(&warnings).parse_greedy(sub, rescue_scope)?;
                types.push(parsed.node);
                offset += end;
                if view.get(offset).is_some_and(|t| t.kind == TokenKind::Comma) {
                    offset += 1;
                } else {
                    break;
                }
            }
            let mut bound_name = None;
            if view.get(offset).is_some_and(|t| t.is_keyword("as")) {
                offset += 1;
                if let Some(tok) = view.get(offset).filter(|t| t.is_identifier()) {
                    let name = tok.text().unwrap_or_default().to_string();
                    self.declare(rescue_scope, &name, NodeId::from_raw(0), DeclKind::CaughtError, tok.line, tok.column, None);
                    bound_name = Some(name);
                    offset += 1;
                }
            }
            if !view.get(offset).is_some_and(|t| t.is_bracket('{')) {
                self.error(line, column, "expected '{' to open 'rescue' block");
            } else {
                let rbody_view = view.sub_view(offset + 1, view.limit().saturating_sub(offset + 1));
                let rclose = self.scan_to_close_brace(rbody_view);
                let rbody = self.parse_block_body(rbody_view.sub_view(0, rclose), rescue_scope, mode)?;
                rescue = Some(RescueClause {
                    exception_types: types,
                    bound_name,
                    body: rbody,
                    scope: rescue_scope,
                });
                offset += 1 + rclose + 1;
            }
        }

        let mut finally_body = None;
        let mut finally_scope = None;
        if view.get(offset).is_some_and(|t| t.is_keyword("finally")) {
            offset += 1;
            if !view.get(offset).is_some_and(|t| t.is_bracket('{')) {
                self.error(line, column, "expected '{' to open 'finally' block");
            } else {
                let fscope = self.scopes.new_child(scope, false);
                let fbody_view = view.sub_view(offset + 1, view.limit().saturating_sub(offset + 1));
                let fclose = self.scan_to_close_brace(fbody_view);
                let fbody = self.parse_block_body(fbody_view.sub_view(0, fclose), fscope, mode)?;
                finally_body = Some(fbody);
                finally_scope = Some(fscope);
                offset += 1 + fclose + 1;
            }
        }

        if rescue.is_none() && finally_body.is_none() {
            self.error(line, column, "'do' requires at least one of 'rescue' or 'finally'");
        }

        let node = self.alloc(
            NodeKind::Do(DoStmt {
                body,
                body_scope,
                rescue,
                finally_body,
                finally_scope,
            }),
            line,
            column,
            0,
        );
        Ok(ParsedStmt { node, consumed: offset })
    }

    fn parse_import(&mut self, view: TokenView<'_>, scope: ScopeId, mode: StatementMode) -> Outcome<ParsedStmt> {
        let line = view.line(0);
        let column = view.column(0);
        self.require_mode(line, column, mode == StatementMode::TopLevel, "import");

        let mut offset = 1;
        let mut path = Vec::new();
        while let Some(tok) = view.get(offset).filter(|t| t.is_identifier()) {
            path.push(tok.text().unwrap_or_default().to_string());
            offset += 1;
            if view.get(offset).is_some_and(|t| t.is_binary_op(".")) {
                offset += 1;
            } else {
                break;
            }
        }
        if path.is_empty() {
            self.error(line, column, "expected an identifier path after 'import'");
        }

        let mut from_lib = None;
        if view.get(offset).is_some_and(|t| t.is_keyword("from")) {
            offset += 1;
            if let Some(tok) = view.get(offset).filter(|t| t.is_identifier()) {
                from_lib = Some(tok.text().unwrap_or_default().to_string());
                offset += 1;
            }
        }

        let mut declared_name = path.first().cloned().unwrap_or_default();
        if view.get(offset).is_some_and(|t| t.is_keyword("as")) {
            offset += 1;
            if let Some(tok) = view.get(offset).filter(|t| t.is_identifier()) {
                declared_name = tok.text().unwrap_or_default().to_string();
                offset += 1;
            }
        }

        let element_path = path.join(".");
        let node = self.alloc(
            NodeKind::Import(ImportStmt {
                element_path: path,
                from_lib,
                declared_name: declared_name.clone(),
            }),
            line,
            column,
            0,
        );
        self.declare(scope, &declared_name, node, DeclKind::Import, line, column, Some(&element_path));
        Ok(ParsedStmt { node, consumed: offset })
    }

    fn parse_raise(&mut self, view: TokenView<'_>, scope: ScopeId, mode: StatementMode) -> Outcome<ParsedStmt> {
        let line = view.line(0);
        let column = view.column(0);
        self.require_mode(line, column, mode.is_in_function(), "raise");
        let rest = view.sub_view(1, view.limit().saturating_sub(1));
        let end = self.find_stmt_end(rest);
        let warnings = *self.warnings;
        let parsed = self.expr_parser(&warnings).parse_greedy(rest.sub_view(0, end), scope)?;
        let node = self.alloc(NodeKind::Raise(parsed.node), line, column, 0);
        Ok(ParsedStmt { node, consumed: 1 + end })
    }

    fn parse_no_operand(
        &mut self,
        view: TokenView<'_>,
        mode: StatementMode,
        kind: NodeKind,
        what: &str,
    ) -> Outcome<ParsedStmt> {
        let line = view.line(0);
        let column = view.column(0);
        self.require_mode(line, column, mode.is_in_function(), what);
        let node = self.alloc(kind, line, column, 0);
        Ok(ParsedStmt { node, consumed: 1 })
    }

    fn parse_await(&mut self, view: TokenView<'_>, scope: ScopeId, mode: StatementMode) -> Outcome<ParsedStmt> {
        let line = view.line(0);
        let column = view.column(0);
        self.require_mode(line, column, mode.is_in_function(), "await");
        let rest = view.sub_view(1, view.limit().saturating_sub(1));
        let end = self.find_stmt_end(rest);
        let warnings = *self.warnings;
        let parsed = self.expr_parser(&warnings).parse_greedy(rest.sub_view(0, end), scope)?;
        if let Some(n) = self.arena.get(parsed.node)
            && !matches!(
                n.kind,
                NodeKind::IdentifierRef(_) | NodeKind::Binary(_) | NodeKind::Call(_)
            )
        {
            self.error(line, column, "'await' requires an identifier reference, attribute access, index, or call");
        }
        let node = self.alloc(NodeKind::Await(parsed.node), line, column, 0);
        Ok(ParsedStmt { node, consumed: 1 + end })
    }

    fn parse_async(&mut self, view: TokenView<'_>, scope: ScopeId, mode: StatementMode) -> Outcome<ParsedStmt> {
        let line = view.line(0);
        let column = view.column(0);
        self.require_mode(line, column, mode.is_in_function(), "async");
        let rest = view.sub_view(1, view.limit().saturating_sub(1));
        let end = self.find_stmt_end(rest);
        let warnings = *self.warnings;
        let parsed = self.expr_parser(&warnings).parse_greedy(rest.sub_view(0, end), scope)?;
        match self.arena.get_mut(parsed.node) {
            Some(AstNode { kind: NodeKind::Call(call), .. }) => call.is_async = true,
            _ => self.error(line, column, "'async' requires a call expression"),
        }
        let node = self.alloc(NodeKind::Async(parsed.node), line, column, 0);
        Ok(ParsedStmt { node, consumed: 1 + end })
    }

    fn parse_return(&mut self, view: TokenView<'_>, scope: ScopeId, mode: StatementMode) -> Outcome<ParsedStmt> {
        let line = view.line(0);
        let column = view.column(0);
        self.require_mode(line, column, mode.is_in_function(), "return");
        let rest = view.sub_view(1, view.limit().saturating_sub(1));
        if rest.is_empty() || rest.get(0).is_some_and(|t| t.is_bracket('}')) {
            let node = self.alloc(NodeKind::Return(None), line, column, 0);
            return Ok(ParsedStmt { node, consumed: 1 });
        }
        let end = self.find_stmt_end(rest);
        let warnings = *self.warnings;
        let parsed = self.expr_parser(&warnings).parse_greedy(rest.sub_view(0, end), scope)?;
        let node = self.alloc(NodeKind::Return(Some(parsed.node)), line, column, 0);
        Ok(ParsedStmt { node, consumed: 1 + end })
    }

    fn parse_with(&mut self, view: TokenView<'_>, scope: ScopeId, mode: StatementMode) -> Outcome<ParsedStmt> {
        let line = view.line(0);
        let column = view.column(0);
        self.require_mode(line, column, mode.is_in_function(), "with");
        let with_scope = self.scopes.new_child(scope, false);
        let mut clauses = Vec::new();
        let mut offset = 1;
        loop {
            let remaining = view.sub_view(offset, view.limit().saturating_sub(offset));
            let end = {
                let mut depth: i32 = 0;
                let mut o = 0;
                while let Some(t) = remaining.get(o) {
                    if let crate::token::TokenPayload::Bracket(c) = t.payload {
                        if c == '(' || c == '[' || c == '{' {
                            depth += 1;
                        } else if depth == 0 {
                            break;
                        } else {
                            depth -= 1;
                        }
                    } else if depth == 0 && (t.kind == TokenKind::Comma || t.is_keyword("as")) {
                        break;
                    }
                    o += 1;
                }
                o
            };
            let warnings = *self.warnings;
            let parsed = self.expr_parser(&warnings).parse_greedy(remaining.sub_view(0, end), scope)?;
            offset += end;
            let mut name = String::new();
            if view.get(offset).is_some_and(|t| t.is_keyword("as")) {
                offset += 1;
                if let Some(tok) = view.get(offset).filter(|t| t.is_identifier()) {
                    name = tok.text().unwrap_or_default().to_string();
                    self.declare(with_scope, &name, NodeId::from_raw(0), DeclKind::Variable, tok.line, tok.column, None);
                    offset += 1;
                }
            } else {
                self.error(line, column, "expected 'as NAME' in 'with' clause");
            }
            clauses.push(WithClause { expr: parsed.node, name });
            if view.get(offset).is_some_and(|t| t.kind == TokenKind::Comma) {
                offset += 1;
            } else {
                break;
            }
        }
        if !view.get(offset).is_some_and(|t| t.is_bracket('{')) {
            self.error(line, column, "expected '{' to open 'with' body");
            let node = self.alloc(NodeKind::Break, line, column, 0);
            return Ok(ParsedStmt { node, consumed: offset });
        }
        let body_view = view.sub_view(offset + 1, view.limit().saturating_sub(offset + 1));
        let close = self.scan_to_close_brace(body_view);
        let body = self.parse_block_body(body_view.sub_view(0, close), with_scope, mode)?;
        let node = self.alloc(
            NodeKind::With(WithStmt {
                clauses,
                body,
                scope: with_scope,
            }),
            line,
            column,
            0,
        );
        Ok(ParsedStmt { node, consumed: offset + 1 + close + 1 })
    }

    fn parse_if(&mut self, view: TokenView<'_>, scope: ScopeId, mode: StatementMode) -> Outcome<ParsedStmt> {
        let line = view.line(0);
        let column = view.column(0);
        self.require_mode(line, column, mode.is_in_function(), "if");
        let mut branches = Vec::new();
        let mut offset = 0;
        let mut first = true;
        let mut saw_else = false;

        loop {
            let keyword_ok = if first {
                view.get(offset).is_some_and(|t| t.is_keyword("if"))
            } else {
                view.get(offset).is_some_and(|t| t.is_keyword("elseif"))
            };
            if !keyword_ok {
                break;
            }
            if saw_else {
                self.error(line, column, "'elseif' cannot follow 'else'");
            }
            offset += 1;
            let branch_scope = self.scopes.new_child(scope, false);
            let rest = view.sub_view(offset, view.limit().saturating_sub(offset));
            let cond_end = {
                let mut o = 0;
                while let Some(t) = rest.get(o) {
                    if t.is_bracket('{') {
                        break;
                    }
                    o += 1;
                }
                o
            };
            let warnings = *self.warnings;
            let cond = self.expr_parser(&warnings).parse_greedy(rest.sub_view(0, cond_end), branch_scope)?;
            offset += cond_end;
            if !view.get(offset).is_some_and(|t| t.is_bracket('{')) {
                self.error(line, column, "expected '{' to open branch body");
                break;
            }
            let body_view = view.sub_view(offset + 1, view.limit().saturating_sub(offset + 1));
            let close = self.scan_to_close_brace(body_view);
            let body = self.parse_block_body(body_view.sub_view(0, close), branch_scope, mode)?;
            branches.push(IfBranch {
                condition: Some(cond.node),
                body,
                scope: branch_scope,
            });
            offset += 1 + close + 1;
            first = false;
        }

        if view.get(offset).is_some_and(|t| t.is_keyword("else")) {
            saw_else = true;
            offset += 1;
            let else_scope = self.scopes.new_child(scope, false);
            if !view.get(offset).is_some_and(|t| t.is_bracket('{')) {
                self.error(line, column, "expected '{' to open 'else' body");
            } else {
                let body_view = view.sub_view(offset + 1, view.limit().saturating_sub(offset + 1));
                let close = self.scan_to_close_brace(body_view);
                let body = self.parse_block_body(body_view.sub_view(0, close), else_scope, mode)?;
                branches.push(IfBranch {
                    condition: None,
                    body,
                    scope: else_scope,
                });
                offset += 1 + close + 1;
            }
        }
        let _ = saw_else;

        let node = self.alloc(NodeKind::If(IfStmt { branches }), line, column, 0);
        Ok(ParsedStmt { node, consumed: offset })
    }

    fn parse_while(&mut self, view: TokenView<'_>, scope: ScopeId, mode: StatementMode) -> Outcome<ParsedStmt> {
        let line = view.line(0);
        let column = view.column(0);
        self.require_mode(line, column, mode.is_in_function(), "while");
        let while_scope = self.scopes.new_child(scope, false);
        let rest = view.sub_view(1, view.limit().saturating_sub(1));
        let cond_end = {
            let mut o = 0;
            while let Some(t) = rest.get(o) {
                if t.is_bracket('{') {
                    break;
                }
                o += 1;
            }
            o
        };
        let warnings = *self.warnings;
        let cond = self.expr_parser(&warnings).parse_greedy(rest.sub_view(0, cond_end), while_scope)?;
        let mut offset = 1 + cond_end;
        if !view.get(offset).is_some_and(|t| t.is_bracket('{')) {
            self.error(line, column, "expected '{' to open 'while' body");
            let node = self.alloc(NodeKind::Break, line, column, 0);
            return Ok(ParsedStmt { node, consumed: offset });
        }
        let body_view = view.sub_view(offset + 1, view.limit().saturating_sub(offset + 1));
        let close = self.scan_to_close_brace(body_view);
        let body = self.parse_block_body(body_view.sub_view(0, close), while_scope, mode)?;
        offset += 1 + close + 1;
        let node = self.alloc(
            NodeKind::While(WhileStmt {
                condition: cond.node,
                body,
                scope: while_scope,
            }),
            line,
            column,
            0,
        );
        Ok(ParsedStmt { node, consumed: offset })
    }

    fn parse_for(&mut self, view: TokenView<'_>, scope: ScopeId, mode: StatementMode) -> Outcome<ParsedStmt> {
        let line = view.line(0);
        let column = view.column(0);
        self.require_mode(line, column, mode.is_in_function(), "for");
        let Some(name_tok) = view.get(1).filter(|t| t.is_identifier()) else {
            self.error(line, column, "expected an identifier after 'for'");
            let node = self.alloc(NodeKind::Break, line, column, 0);
            return Ok(ParsedStmt { node, consumed: 1 });
        };
        let iterator_name = name_tok.text().unwrap_or_default().to_string();
        if !view.get(2).is_some_and(|t| t.is_keyword("in")) {
            self.error(line, column, "expected 'in' after for-loop variable");
        }
        let for_scope = self.scopes.new_child(scope, false);
        self.declare(for_scope, &iterator_name, NodeId::from_raw(0), DeclKind::ForIterator, line, column, None);

        let rest = view.sub_view(3, view.limit().saturating_sub(3));
        let iter_end = {
            let mut o = 0;
            while let Some(t) = rest.get(o) {
                if t.is_bracket('{') {
                    break;
                }
                o += 1;
            }
            o
        };
        let warnings = *self.warnings;
        let iterable = self.expr_parser(&warnings).parse_greedy(rest.sub_view(0, iter_end), scope)?;
        let mut offset = 3 + iter_end;
        if !view.get(offset).is_some_and(|t| t.is_bracket('{')) {
            self.error(line, column, "expected '{' to open 'for' body");
            let node = self.alloc(NodeKind::Break, line, column, 0);
            return Ok(ParsedStmt { node, consumed: offset });
        }
        let body_view = view.sub_view(offset + 1, view.limit().saturating_sub(offset + 1));
        let close = self.scan_to_close_brace(body_view);
        let body = self.parse_block_body(body_view.sub_view(0, close), for_scope, mode)?;
        offset += 1 + close + 1;
        let node = self.alloc(
            NodeKind::For(ForStmt {
                iterator_name,
                iterable: iterable.node,
                body,
                scope: for_scope,
            }),
            line,
            column,
            0,
        );
        Ok(ParsedStmt { node, consumed: offset })
    }

    /// Assignment or call statement (§4.5 last row): parse an inline
    /// expression; if followed by an assignment operator, require the
    /// left side to be a valid l-value; else if the expression is itself
    /// a call, emit a call statement.
    fn parse_expr_or_assignment_statement(&mut self, view: TokenView<'_>, scope: ScopeId) -> Outcome<ParsedStmt> {
        let line = view.line(0);
        let column = view.column(0);
        let end = self.find_stmt_end(view);
        let expr_view = view.sub_view(0, end);
        let warnings = *self.warnings;
        let parsed = self.expr_parser(&warnings).parse_greedy(expr_view, scope)?;
        let mut offset = end;

        if let Some(op_tok) = view.get(offset) {
            let assign_op = match op_tok.text() {
                Some("=") => Some(AssignOp::Assign),
                Some("+=") => Some(AssignOp::AddAssign),
                Some("-=") => Some(AssignOp::SubtractAssign),
                Some("*=") => Some(AssignOp::MultiplyAssign),
                Some("/=") => Some(AssignOp::DivideAssign),
                Some("%=") => Some(AssignOp::ModuloAssign),
                _ => None,
            };
            if let Some(op) = assign_op {
                if !self.is_lvalue(parsed.node) {
                    self.error(line, column, "left-hand side of assignment is not a valid target");
                }
                offset += 1;
                let rhs_view = view.sub_view(offset, view.limit().saturating_sub(offset));
                let rhs_end = self.find_stmt_end(rhs_view);
                let rhs = self.expr_parser(&warnings).parse_greedy(rhs_view.sub_view(0, rhs_end), scope)?;
                offset += rhs_end;
                let node = self.alloc(
                    NodeKind::Assignment {
                        op,
                        lhs: parsed.node,
                        rhs: rhs.node,
                    },
                    line,
                    column,
                    0,
                );
                return Ok(ParsedStmt { node, consumed: offset });
            }
        }

        let is_call = matches!(self.arena.get(parsed.node), Some(n) if matches!(n.kind, NodeKind::Call(_)));
        if is_call {
            let node = self.alloc(NodeKind::ExprStatement(parsed.node), line, column, 0);
            return Ok(ParsedStmt { node, consumed: offset });
        }

        self.error(line, column, "expression is not a statement");
        Ok(ParsedStmt { node: parsed.node, consumed: offset })
    }

    /// §4.5 l-value check: identifier reference, or a binary op whose
    /// operator is attribute-by-identifier/call/index-by-expression and
    /// whose left operand is itself an l-value.
    fn is_lvalue(&self, node: NodeId) -> bool {
        match self.arena.get(node).map(|n| &n.kind) {
            Some(NodeKind::IdentifierRef(_)) => true,
            Some(NodeKind::Binary(b)) => b.op.is_lvalue_capable() && self.is_lvalue(b.left),
            _ => false,
        }
    }

    /// Parse every statement in `view` until exhausted. When a statement
    /// parse reports an error (C6), resynchronize via [`recovery`] instead
    /// of trusting the failed parse's own `consumed` count: bound the
    /// search to the remainder of this block with `find_end_of_block`,
    /// then land on the next token that looks like a statement start with
    /// `find_next_statement`.
    pub fn parse_block_body(
        &mut self,
        view: TokenView<'_>,
        scope: ScopeId,
        mode: StatementMode,
    ) -> Outcome<Vec<NodeId>> {
        let mut statements = Vec::new();
        let mut offset = 0;
        while offset < view.limit() {
            let remaining = view.sub_view(offset, view.limit().saturating_sub(offset));
            let before = self.messages.len();
            let parsed = self.parse_statement(remaining, scope, mode)?;
            statements.push(parsed.node);
            if self.messages.len() > before {
                let block_end = recovery::find_end_of_block(remaining);
                let bounded = remaining.sub_view(0, block_end);
                let resync = recovery::find_next_statement(bounded, FindNextStatementFlags::MUST_FORWARD);
                debug!(offset, resync, "parse_block_body: recovering after local parse failure");
                offset += resync.max(parsed.consumed).max(1);
            } else {
                offset += parsed.consumed.max(1);
            }
        }
        Ok(statements)
    }
}

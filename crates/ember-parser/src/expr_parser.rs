//! Expression parser (C4): non-greedy primaries and greedy
//! operator-precedence climbing over a [`TokenView`].

use ember_core::{Arena, Message, MessageSink, NodeId, Outcome};

use crate::ast::{
    Arg, ArgList, BinOp, BinaryExpr, CallArgs, CallExpr, ContainerCtor, ContainerKind, GivenExpr,
    InlineFuncDef, Literal, MapEntry, NodeKind, UnOp, UnaryExpr,
};
use crate::scope::{QueryFlags, ScopeId, ScopeTable, WarningConfig};
use crate::token::{Token, TokenKind, TokenPayload};
use crate::token_view::TokenView;

/// Brackets the precedence scan must track, in addition to the synthetic
/// call-`(` and index-`[` operators emitted by the lexer.
const OPEN_BRACKETS: [char; 3] = ['(', '[', '{'];
const CLOSE_BRACKETS: [char; 3] = [')', ']', '}'];

pub struct ExprParser<'bump, 'a> {
    pub arena: &'a mut Arena<'bump, crate::ast::AstNode>,
    pub scopes: &'a mut ScopeTable,
    pub warnings: &'a WarningConfig,
    pub messages: &'a mut dyn MessageSink,
    pub file: std::path::PathBuf,
}

/// Result of parsing an expression: the node plus how many view offsets
/// were consumed.
pub struct Parsed {
    pub node: NodeId,
    pub consumed: usize,
}

impl<'bump, 'a> ExprParser<'bump, 'a> {
    fn alloc(&mut self, kind: NodeKind, line: u32, column: u32, token_index: usize) -> NodeId {
        self.arena
            .alloc(crate::ast::AstNode::new(kind, line, column, token_index))
    }

    fn error(&mut self, line: u32, column: u32, text: impl Into<String>) {
        self.messages
            .push(Message::error(text.into(), self.file.clone(), line, column));
    }

    /// Greedy entry point: attempt operator-precedence parsing; on no
    /// operator found at this position, fall back to a bare primary.
    pub fn parse_greedy(&mut self, view: TokenView<'_>, scope: ScopeId) -> Outcome<Parsed> {
        if view.is_empty() {
            let line = view.line(0);
            let column = view.column(0);
            self.error(line, column, "expected an expression but found end of file");
            let node = self.alloc(NodeKind::Literal(Literal::None), line, column, 0);
            return Ok(Parsed { node, consumed: 0 });
        }

        match self.find_split(view) {
            Some(split) => self.parse_at_split(view, scope, split),
            None => self.parse_non_greedy(view, scope),
        }
    }

    /// Scan `view` left to right at bracket depth 0, recording the
    /// highest-precedence operator position. Ties go right (the
    /// right-most eligible position wins), matching right-associative
    /// splitting for equal precedence.
    fn find_split(&self, view: TokenView<'_>) -> Option<usize> {
        let mut depth: i32 = 0;
        let mut best: Option<(usize, u8)> = None;
        let mut offset = 0;
        while offset < view.limit() {
            let tok = view.get(offset)?;
            if let TokenPayload::Bracket(c) = tok.payload {
                if OPEN_BRACKETS.contains(&c) {
                    depth += 1;
                    offset += 1;
                    continue;
                }
                if CLOSE_BRACKETS.contains(&c) {
                    depth -= 1;
                    if depth < 0 {
                        break;
                    }
                    offset += 1;
                    continue;
                }
            }
            if depth == 0 {
                if matches!(
                    tok.kind,
                    TokenKind::Comma | TokenKind::MapArrow | TokenKind::Colon | TokenKind::InlineFuncArrow
                ) {
                    break;
                }
                if tok.is_keyword("then") {
                    break;
                }
                if self.is_assignment_operator(tok) {
                    break;
                }
                if self.starts_new_statement(tok) && offset > 0 {
                    break;
                }
                if let Some(op) = self.binary_op_of(tok) {
                    let prec = op.precedence();
                    let take = match best {
                        None => true,
                        Some((_, best_prec)) => prec >= best_prec,
                    };
                    if take {
                        best = Some((offset, prec));
                    }
                } else if tok.kind == TokenKind::Bracket && offset > 0 {
                    // call-`(` / index-`[` synthesized operators: treat
                    // the bracket opening as a tightest-precedence split.
                    if let TokenPayload::Bracket(c) = tok.payload
                        && (c == '(' || c == '[')
                    {
                        let prec = BinOp::Call.precedence();
                        let take = match best {
                            None => true,
                            Some((_, best_prec)) => prec >= best_prec,
                        };
                        if take {
                            best = Some((offset, prec));
                        }
                    }
                }
            }
            offset += 1;
        }
        best.map(|(offset, _)| offset)
    }

    fn is_assignment_operator(&self, tok: &Token) -> bool {
        matches!(
            tok.text(),
            Some("=") | Some("+=") | Some("-=") | Some("*=") | Some("/=") | Some("%=")
        ) && tok.kind == TokenKind::BinaryOperator
    }

    fn starts_new_statement(&self, tok: &Token) -> bool {
        const STATEMENT_KEYWORDS: [&str; 17] = [
            "var", "const", "func", "class", "do", "rescue", "finally", "import", "raise",
            "break", "continue", "await", "async", "return", "with", "if", "while",
        ];
        tok.kind == TokenKind::Keyword
            && tok.text().is_some_and(|t| STATEMENT_KEYWORDS.contains(&t))
    }

    fn binary_op_of(&self, tok: &Token) -> Option<BinOp> {
        if tok.kind != TokenKind::BinaryOperator {
            return None;
        }
        match tok.text()? {
            "||" | "or" => Some(BinOp::Or),
            "&&" | "and" => Some(BinOp::And),
            "==" => Some(BinOp::Equal),
            "!=" => Some(BinOp::NotEqual),
            "<" => Some(BinOp::Less),
            "<=" => Some(BinOp::LessEqual),
            ">" => Some(BinOp::Greater),
            ">=" => Some(BinOp::GreaterEqual),
            "+" => Some(BinOp::Add),
            "-" => Some(BinOp::Subtract),
            "*" => Some(BinOp::Multiply),
            "/" => Some(BinOp::Divide),
            "%" => Some(BinOp::Modulo),
            "." => Some(BinOp::AttributeByIdentifier),
            _ => None,
        }
    }

    fn parse_at_split(&mut self, view: TokenView<'_>, scope: ScopeId, split: usize) -> Outcome<Parsed> {
        let tok = view.get(split).expect("split offset is in-view by construction");
        let line = view.line(split);
        let column = view.column(split);

        if tok.kind == TokenKind::Bracket {
            if let TokenPayload::Bracket('(') = tok.payload {
                return self.parse_call(view, scope, split);
            }
            if let TokenPayload::Bracket('[') = tok.payload {
                return self.parse_index(view, scope, split);
            }
        }

        let op = match self.binary_op_of(tok) {
            Some(op) => op,
            None => return self.parse_non_greedy(view, scope),
        };

        let left_view = view.sub_view(0, split);
        let left = self.parse_greedy(left_view, scope)?;

        if op == BinOp::AttributeByIdentifier {
            let name_offset = split + 1;
            let name_tok = view.get(name_offset);
            let name = match name_tok.filter(|t| t.is_identifier()) {
                Some(t) => t.text().unwrap_or_default().to_string(),
                None => {
                    self.error(line, column, "expected an identifier after '.'");
                    String::new()
                }
            };
            let name_node = self.alloc(NodeKind::IdentifierRef(name), line, column, name_offset);
            let expr = BinaryExpr {
                op,
                left: left.node,
                right: name_node,
            };
            let node = self.alloc(NodeKind::Binary(expr), line, column, split);
            return Ok(Parsed {
                node,
                consumed: name_offset + 1,
            });
        }

        let right_view = view.sub_view(split + 1, view.limit());
        let right = self.parse_greedy(right_view, scope)?;
        let expr = BinaryExpr {
            op,
            left: left.node,
            right: right.node,
        };
        let node = self.alloc(NodeKind::Binary(expr), line, column, split);
        Ok(Parsed {
            node,
            consumed: split + 1 + right.consumed,
        })
    }

    fn parse_call(&mut self, view: TokenView<'_>, scope: ScopeId, split: usize) -> Outcome<Parsed> {
        let line = view.line(split);
        let column = view.column(split);
        let callee_view = view.sub_view(0, split);
        let callee = self.parse_greedy(callee_view, scope)?;

        let args_view = view.sub_view(split + 1, view.limit().saturating_sub(split + 1));
        let (args, close_offset) = self.parse_call_arguments(args_view, scope)?;

        let node = self.alloc(
            NodeKind::Call(CallExpr {
                callee: callee.node,
                args,
                is_async: false,
            }),
            line,
            column,
            split,
        );
        Ok(Parsed {
            node,
            consumed: split + 1 + close_offset + 1,
        })
    }

    fn parse_call_arguments(&mut self, view: TokenView<'_>, scope: ScopeId) -> Outcome<(CallArgs, usize)> {
        let mut positional = Vec::new();
        let keyword = Vec::new();
        let mut offset = 0;
        let mut unpack_last_positional = false;
        let mut had_unpack = false;

        if view.get(0).is_some_and(|t| t.is_bracket(')')) {
            return Ok((
                CallArgs {
                    positional,
                    keyword,
                    unpack_last_positional,
                },
                0,
            ));
        }

        loop {
            let mut arg_start = offset;
            let is_unpack = view.get(arg_start).is_some_and(|t| t.is_keyword("unpack"));
            if is_unpack {
                arg_start += 1;
            }
            if is_unpack && had_unpack {
                let line = view.line(offset);
                let column = view.column(offset);
                self.error(line, column, "unexpected unpack, can only be applied to last positional argument");
            } else if !is_unpack && had_unpack {
                let line = view.line(offset);
                let column = view.column(offset);
                self.error(line, column, "unexpected argument after unpack, can only be applied to last positional argument");
            }
            if is_unpack {
                had_unpack = true;
                unpack_last_positional = true;
            }

            let remaining = view.sub_view(arg_start, view.limit().saturating_sub(arg_start));
            let arg_end = self.scan_to_comma_or_close(remaining);
            let arg_view = remaining.sub_view(0, arg_end);
            let parsed = self.parse_greedy(arg_view, scope)?;
            positional.push(parsed.node);
            offset = arg_start + arg_end;

            match view.get(offset) {
                Some(t) if t.kind == TokenKind::Comma => {
                    offset += 1;
                    continue;
                }
                Some(t) if t.is_bracket(')') => {
                    return Ok((
                        CallArgs {
                            positional,
                            keyword,
                            unpack_last_positional,
                        },
                        offset,
                    ));
                }
                _ => {
                    let line = view.line(offset);
                    let column = view.column(offset);
                    self.error(line, column, "expected ',' or ')' in call argument list");
                    return Ok((
                        CallArgs {
                            positional,
                            keyword,
                            unpack_last_positional,
                        },
                        offset,
                    ));
                }
            }
        }
    }

    fn parse_index(&mut self, view: TokenView<'_>, scope: ScopeId, split: usize) -> Outcome<Parsed> {
        let line = view.line(split);
        let column = view.column(split);
        let base_view = view.sub_view(0, split);
        let base = self.parse_greedy(base_view, scope)?;

        let index_view = view.sub_view(split + 1, view.limit().saturating_sub(split + 1));
        let index_end = self.scan_to_close_bracket(index_view, ']');
        let sub = index_view.sub_view(0, index_end);
        let index = self.parse_greedy(sub, scope)?;

        if !index_view.get(index_end).is_some_and(|t| t.is_bracket(']')) {
            self.error(line, column, "unbalanced '[' starting index expression");
        }

        let expr = BinaryExpr {
            op: BinOp::IndexByExpression,
            left: base.node,
            right: index.node,
        };
        let node = self.alloc(NodeKind::Binary(expr), line, column, split);
        Ok(Parsed {
            node,
            consumed: split + 1 + index_end + 1,
        })
    }

    fn scan_to_comma_or_close(&self, view: TokenView<'_>) -> usize {
        let mut depth: i32 = 0;
        let mut offset = 0;
        while let Some(tok) = view.get(offset) {
            if let TokenPayload::Bracket(c) = tok.payload {
                if OPEN_BRACKETS.contains(&c) {
                    depth += 1;
                } else if CLOSE_BRACKETS.contains(&c) {
                    if depth == 0 {
                        return offset;
                    }
                    depth -= 1;
                }
            } else if depth == 0 && tok.kind == TokenKind::Comma {
                return offset;
            }
            offset += 1;
        }
        offset
    }

    fn scan_to_close_bracket(&self, view: TokenView<'_>, close: char) -> usize {
        let mut depth: i32 = 0;
        let mut offset = 0;
        while let Some(tok) = view.get(offset) {
            if let TokenPayload::Bracket(c) = tok.payload {
                if c == close && depth == 0 {
                    return offset;
                }
                if OPEN_BRACKETS.contains(&c) {
                    depth += 1;
                } else if CLOSE_BRACKETS.contains(&c) {
                    depth -= 1;
                }
            }
            offset += 1;
        }
        offset
    }

    /// Non-greedy: parse exactly one primary expression.
    pub fn parse_non_greedy(&mut self, view: TokenView<'_>, scope: ScopeId) -> Outcome<Parsed> {
        let Some(tok) = view.get(0) else {
            let line = view.line(0);
            let column = view.column(0);
            self.error(line, column, "expected an expression but found end of file");
            let node = self.alloc(NodeKind::Literal(Literal::None), line, column, 0);
            return Ok(Parsed { node, consumed: 0 });
        };
        let line = tok.line;
        let column = tok.column;

        if tok.kind == TokenKind::UnaryOperator {
            let op = match tok.text() {
                Some("-") => UnOp::Negate,
                Some("!") | Some("not") => UnOp::Not,
                _ => UnOp::Not,
            };
            let rest = view.sub_view(1, view.limit().saturating_sub(1));
            let operand = self.parse_non_greedy(rest, scope)?;
            let node = self.alloc(
                NodeKind::Unary(UnaryExpr {
                    op,
                    operand: operand.node,
                }),
                line,
                column,
                0,
            );
            return Ok(Parsed {
                node,
                consumed: 1 + operand.consumed,
            });
        }

        if tok.kind == TokenKind::Identifier {
            // `identifier => (expr)`: single-parameter inline function.
            if view.get(1).is_some_and(|t| t.kind == TokenKind::InlineFuncArrow) {
                return self.parse_inline_func_single_param(view, scope);
            }
            let node = self.alloc(
                NodeKind::IdentifierRef(tok.text().unwrap_or_default().to_string()),
                line,
                column,
                0,
            );
            return Ok(Parsed { node, consumed: 1 });
        }

        if tok.kind == TokenKind::Keyword && tok.text() == Some("given") {
            return self.parse_given(view, scope);
        }

        if let Some(lit) = self.literal_of(tok) {
            let node = self.alloc(NodeKind::Literal(lit), line, column, 0);
            return Ok(Parsed { node, consumed: 1 });
        }

        if let TokenPayload::Bracket(c) = tok.payload {
            match c {
                '(' => return self.parse_parenthesized_or_inline_func(view, scope),
                '[' | '{' => return self.parse_container(view, scope),
                _ => {}
            }
        }

        self.error(line, column, format!("unexpected {}", view.describe(0)));
        let node = self.alloc(NodeKind::Literal(Literal::None), line, column, 0);
        Ok(Parsed { node, consumed: 1 })
    }

    fn literal_of(&self, tok: &Token) -> Option<Literal> {
        match (&tok.kind, &tok.payload) {
            (TokenKind::Integer, TokenPayload::Int(n)) => Some(Literal::Int(*n)),
            (TokenKind::Float, TokenPayload::Float(n)) => Some(Literal::Float(*n)),
            (TokenKind::Bool, TokenPayload::Bool(b)) => Some(Literal::Bool(*b)),
            (TokenKind::StringLiteral, TokenPayload::Text(s)) => Some(Literal::Str(s.clone())),
            (TokenKind::BytesLiteral, TokenPayload::Bytes(b)) => Some(Literal::Bytes(b.clone())),
            (TokenKind::NoneLiteral, _) => Some(Literal::None),
            _ => None,
        }
    }

    fn parse_given(&mut self, view: TokenView<'_>, scope: ScopeId) -> Outcome<Parsed> {
        let line = view.line(0);
        let column = view.column(0);
        let cond_view = view.sub_view(1, view.limit().saturating_sub(1));
        let cond_end = self.scan_given_condition(cond_view);
        let cond_sub = cond_view.sub_view(0, cond_end);
        let condition = self.parse_greedy(cond_sub, scope)?;

        let mut offset = 1 + cond_end;
        if !view.get(offset).is_some_and(|t| t.is_keyword("then")) {
            self.error(line, column, "expected 'then' after 'given' condition");
            let node = self.alloc(
                NodeKind::Given(GivenExpr {
                    condition: condition.node,
                    then_branch: condition.node,
                    else_branch: None,
                }),
                line,
                column,
                0,
            );
            return Ok(Parsed { node, consumed: offset });
        }
        offset += 1;

        if !view.get(offset).is_some_and(|t| t.is_bracket('(')) {
            self.error(line, column, "expected '(' after 'then'");
            let node = self.alloc(
                NodeKind::Given(GivenExpr {
                    condition: condition.node,
                    then_branch: condition.node,
                    else_branch: None,
                }),
                line,
                column,
                0,
            );
            return Ok(Parsed { node, consumed: offset });
        }
        let paren_view = view.sub_view(offset + 1, view.limit().saturating_sub(offset + 1));
        let close = self.scan_to_close_bracket(paren_view, ')');

        // Inside the parens: `YES [else NO]`.
        let inner = paren_view.sub_view(0, close);
        let else_split = self.find_else_split(inner);
        let (then_view, else_view) = match else_split {
            Some(s) => (inner.sub_view(0, s), Some(inner.sub_view(s + 1, inner.limit().saturating_sub(s + 1)))),
            None => (inner, None),
        };
        let then_parsed = self.parse_greedy(then_view, scope)?;
        let else_parsed = match else_view {
            Some(ev) => Some(self.parse_greedy(ev, scope)?.node),
            None => None,
        };

        let node = self.alloc(
            NodeKind::Given(GivenExpr {
                condition: condition.node,
                then_branch: then_parsed.node,
                else_branch: else_parsed,
            }),
            line,
            column,
            0,
        );
        Ok(Parsed {
            node,
            consumed: offset + 1 + close + 1,
        })
    }

    fn find_else_split(&self, view: TokenView<'_>) -> Option<usize> {
        let mut depth: i32 = 0;
        let mut offset = 0;
        while let Some(tok) = view.get(offset) {
            if let TokenPayload::Bracket(c) = tok.payload {
                if OPEN_BRACKETS.contains(&c) {
                    depth += 1;
                } else if CLOSE_BRACKETS.contains(&c) {
                    depth -= 1;
                }
            } else if depth == 0 && tok.is_keyword("else") {
                return Some(offset);
            }
            offset += 1;
        }
        None
    }

    /// Scan a `given` condition, skipping nested `given … then` pairs so
    /// only the outer `then` terminates.
    fn scan_given_condition(&self, view: TokenView<'_>) -> usize {
        let mut depth: i32 = 0;
        let mut given_nesting: i32 = 0;
        let mut offset = 0;
        while let Some(tok) = view.get(offset) {
            if let TokenPayload::Bracket(c) = tok.payload {
                if OPEN_BRACKETS.contains(&c) {
                    depth += 1;
                } else if CLOSE_BRACKETS.contains(&c) {
                    if depth == 0 {
                        return offset;
                    }
                    depth -= 1;
                }
            } else if depth == 0 {
                if tok.is_keyword("given") {
                    given_nesting += 1;
                } else if tok.is_keyword("then") {
                    if given_nesting == 0 {
                        return offset;
                    }
                    given_nesting -= 1;
                }
            }
            offset += 1;
        }
        offset
    }

    fn parse_parenthesized_or_inline_func(&mut self, view: TokenView<'_>, scope: ScopeId) -> Outcome<Parsed> {
        let line = view.line(0);
        let column = view.column(0);
        let inner_view = view.sub_view(1, view.limit().saturating_sub(1));
        let close = self.scan_to_close_bracket(inner_view, ')');

        if !inner_view.get(close).is_some_and(|t| t.is_bracket(')')) {
            self.error(line, column, "unbalanced '(' starting parenthesized expression");
        }

        // `(args) => (expr)`: multi-parameter inline function.
        if inner_view
            .sub_view(close + 1, inner_view.limit().saturating_sub(close + 1))
            .get(0)
            .is_some_and(|t| t.kind == TokenKind::InlineFuncArrow)
        {
            return self.parse_inline_func_multi_param(view, scope, close);
        }

        let sub = inner_view.sub_view(0, close);
        let inner = self.parse_greedy(sub, scope)?;
        Ok(Parsed {
            node: inner.node,
            consumed: close + 2,
        })
    }

    fn parse_inline_func_single_param(&mut self, view: TokenView<'_>, scope: ScopeId) -> Outcome<Parsed> {
        let line = view.line(0);
        let column = view.column(0);
        let param_name = view.get(0).and_then(|t| t.text()).unwrap_or_default().to_string();
        let func_scope = self.scopes.new_child(scope, true);
        self.declare_inline_param(func_scope, &param_name, line, column);

        let args = ArgList {
            args: vec![Arg {
                name: Some(param_name),
                default: None,
            }],
            unpack_last_positional: false,
        };

        self.finish_inline_func(view, func_scope, args, 2, line, column)
    }

    fn parse_inline_func_multi_param(
        &mut self,
        view: TokenView<'_>,
        scope: ScopeId,
        close: usize,
    ) -> Outcome<Parsed> {
        let line = view.line(0);
        let column = view.column(0);
        let func_scope = self.scopes.new_child(scope, true);
        let params_view = view.sub_view(1, close);
        let args = self.parse_param_list(params_view, func_scope);

        // offset of the arrow token relative to the outer view.
        let arrow_offset = 1 + close + 1;
        self.finish_inline_func(view, func_scope, args, arrow_offset + 1, line, column)
    }

    fn parse_param_list(&mut self, view: TokenView<'_>, func_scope: ScopeId) -> ArgList {
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
            self.declare_inline_param(func_scope, &name, tok.line, tok.column);
            args.push(Arg { name: Some(name), default: None });
            offset += 1;
        }
        ArgList {
            args,
            unpack_last_positional: false,
        }
    }

    fn declare_inline_param(&mut self, scope: ScopeId, name: &str, line: u32, column: u32) {
        let dummy = NodeId::from_raw(0);
        if let Err(failure) = self
            .scopes
            .add(scope, name, dummy, crate::scope::DeclKind::Parameter, line, column, None, self.warnings)
        {
            self.report_scope_failure(line, column, name, failure);
        }
    }

    fn report_scope_failure(&mut self, line: u32, column: u32, name: &str, failure: crate::scope::ScopeFailure) {
        use crate::scope::ScopeFailure;
        match failure {
            ScopeFailure::Duplicate { .. } => {
                self.error(line, column, format!("'{name}' is already declared in this scope"))
            }
            ScopeFailure::ForbiddenParameterRedeclare { .. } => self.error(
                line,
                column,
                format!("'{name}' redeclares a parameter of the enclosing function"),
            ),
            ScopeFailure::ReservedIdentifier { name } => {
                self.error(line, column, format!("'{name}' is a reserved identifier"))
            }
        }
    }

    fn finish_inline_func(
        &mut self,
        view: TokenView<'_>,
        func_scope: ScopeId,
        args: ArgList,
        body_start: usize,
        line: u32,
        column: u32,
    ) -> Outcome<Parsed> {
        let rest = view.sub_view(body_start, view.limit().saturating_sub(body_start));
        if !rest.get(0).is_some_and(|t| t.is_bracket('(')) {
            self.error(line, column, "expected '(' to open inline function body");
            let node = self.alloc(NodeKind::Literal(Literal::None), line, column, 0);
            return Ok(Parsed { node, consumed: body_start });
        }
        let body_view = rest.sub_view(1, rest.limit().saturating_sub(1));
        let close = self.scan_to_close_bracket(body_view, ')');
        let expr_view = body_view.sub_view(0, close);
        let expr = self.parse_greedy(expr_view, func_scope)?;
        let return_node = self.alloc(NodeKind::Return(Some(expr.node)), line, column, 0);
        let node = self.alloc(
            NodeKind::InlineFuncDef(InlineFuncDef {
                params: args,
                body: return_node,
                scope: func_scope,
            }),
            line,
            column,
            0,
        );
        Ok(Parsed {
            node,
            consumed: body_start + 1 + close + 1,
        })
    }

    /// Disambiguate and parse `[...]`/`{...}` container constructors
    /// (§4.4 table).
    fn parse_container(&mut self, view: TokenView<'_>, scope: ScopeId) -> Outcome<Parsed> {
        let line = view.line(0);
        let column = view.column(0);
        let open = view.get(0).unwrap();
        let TokenPayload::Bracket(open_char) = open.payload else {
            unreachable!()
        };
        let close_char = if open_char == '[' { ']' } else { '}' };
        let inner_view = view.sub_view(1, view.limit().saturating_sub(1));
        let close = self.scan_to_close_bracket(inner_view, close_char);
        if !inner_view.get(close).is_some_and(|t| t.is_bracket(close_char)) {
            self.error(line, column, format!("unbalanced '{open_char}' starting container literal"));
        }
        let body = inner_view.sub_view(0, close);
        let consumed = 1 + close + 1;

        if open_char == '{' {
            if body.is_empty() {
                let node = self.alloc(
                    NodeKind::Container(ContainerCtor {
                        kind: ContainerKind::Map,
                        list_elements: Vec::new(),
                        map_entries: Vec::new(),
                    }),
                    line,
                    column,
                    0,
                );
                return Ok(Parsed { node, consumed });
            }
            return self.parse_map_or_set(body, scope, line, column, consumed);
        }

        if body.is_empty() {
            let node = self.alloc(
                NodeKind::Container(ContainerCtor {
                    kind: ContainerKind::List,
                    list_elements: Vec::new(),
                    map_entries: Vec::new(),
                }),
                line,
                column,
                0,
            );
            return Ok(Parsed { node, consumed });
        }
        self.parse_list_or_vector(body, scope, line, column, consumed)
    }

    fn parse_map_or_set(
        &mut self,
        body: TokenView<'_>,
        scope: ScopeId,
        line: u32,
        column: u32,
        consumed: usize,
    ) -> Outcome<Parsed> {
        let first_end = self.scan_to_comma_or_close(body);
        let first_segment = body.sub_view(0, first_end);
        let has_map_arrow = self.find_map_arrow(first_segment).is_some();

        if has_map_arrow {
            let mut entries = Vec::new();
            let mut offset = 0;
            while offset < body.limit() {
                let remaining = body.sub_view(offset, body.limit().saturating_sub(offset));
                let entry_end = self.scan_to_comma_or_close(remaining);
                let entry_view = remaining.sub_view(0, entry_end);
                let arrow = self.find_map_arrow(entry_view).unwrap_or(entry_view.limit());
                let key_view = entry_view.sub_view(0, arrow);
                let key = self.parse_greedy(key_view, scope)?;
                let value_view = entry_view.sub_view(arrow + 1, entry_view.limit().saturating_sub(arrow + 1));
                let value = self.parse_greedy(value_view, scope)?;
                entries.push(MapEntry {
                    key: key.node,
                    value: value.node,
                });
                offset += entry_end;
                if body.get(offset).is_some_and(|t| t.kind == TokenKind::Comma) {
                    offset += 1;
                } else {
                    break;
                }
            }
            let node = self.alloc(
                NodeKind::Container(ContainerCtor {
                    kind: ContainerKind::Map,
                    list_elements: Vec::new(),
                    map_entries: entries,
                }),
                line,
                column,
                0,
            );
            return Ok(Parsed { node, consumed });
        }

        // Set: comma-separated elements, reusing the list-parsing loop.
        let elements = self.parse_comma_separated(body, scope)?;
        let node = self.alloc(
            NodeKind::Container(ContainerCtor {
                kind: ContainerKind::Set,
                list_elements: elements,
                map_entries: Vec::new(),
            }),
            line,
            column,
            0,
        );
        Ok(Parsed { node, consumed })
    }

    fn parse_list_or_vector(
        &mut self,
        body: TokenView<'_>,
        scope: ScopeId,
        line: u32,
        column: u32,
        consumed: usize,
    ) -> Outcome<Parsed> {
        let is_vector = body
            .get(0)
            .is_some_and(|t| t.kind == TokenKind::Integer || t.is_identifier())
            && body.get(1).is_some_and(|t| t.kind == TokenKind::Colon);

        if !is_vector {
            let elements = self.parse_comma_separated(body, scope)?;
            let node = self.alloc(
                NodeKind::Container(ContainerCtor {
                    kind: ContainerKind::List,
                    list_elements: elements,
                    map_entries: Vec::new(),
                }),
                line,
                column,
                0,
            );
            return Ok(Parsed { node, consumed });
        }

        self.parse_vector(body, scope, line, column, consumed)
    }

    const VECTOR_LETTER_LABELS: [&'static str; 4] = ["x", "y", "z", "w"];

    fn parse_vector(
        &mut self,
        body: TokenView<'_>,
        scope: ScopeId,
        line: u32,
        column: u32,
        consumed: usize,
    ) -> Outcome<Parsed> {
        let mut elements = Vec::new();
        let mut offset = 0;
        let mut expected_letter_idx: usize = 0;
        let mut expected_numeric: i64 = 1;
        let mut labeled: Option<bool> = None;

        while offset < body.limit() {
            let remaining = body.sub_view(offset, body.limit().saturating_sub(offset));
            let label_tok = remaining.get(0);
            let this_labeled = match label_tok {
                Some(t) if t.is_identifier() => Some(true),
                Some(t) if t.kind == TokenKind::Integer => Some(false),
                _ => None,
            };
            match (labeled, this_labeled) {
                (None, Some(v)) => labeled = Some(v),
                (Some(prev), Some(v)) if prev != v => {
                    self.error(line, column, "vector labels mix letters and numbers");
                }
                _ => {}
            }

            if this_labeled == Some(true) {
                let name = label_tok.and_then(|t| t.text()).unwrap_or_default();
                if Self::VECTOR_LETTER_LABELS.get(expected_letter_idx) != Some(&name) {
                    self.error(line, column, format!("vector label out of order: expected '{}'", Self::VECTOR_LETTER_LABELS.get(expected_letter_idx).unwrap_or(&"?")));
                }
                expected_letter_idx += 1;
            } else if this_labeled == Some(false) {
                if let Some(TokenPayload::Int(n)) = label_tok.map(|t| &t.payload) {
                    if *n != expected_numeric {
                        self.error(line, column, format!("vector label out of order: expected '{expected_numeric}'"));
                    }
                }
                expected_numeric += 1;
            }

            if expected_letter_idx > 4 || expected_numeric > 5 {
                self.error(line, column, "vector exceeds four components");
            }

            // skip label + colon
            let value_start = 2;
            let value_view = remaining.sub_view(value_start, remaining.limit().saturating_sub(value_start));
            let value_end = self.scan_to_comma_or_close(value_view);
            let value_sub = value_view.sub_view(0, value_end);
            let value = self.parse_greedy(value_sub, scope)?;
            elements.push(value.node);

            offset += value_start + value_end;
            if body.get(offset).is_some_and(|t| t.kind == TokenKind::Comma) {
                offset += 1;
            } else {
                break;
            }
        }

        let node = self.alloc(
            NodeKind::Container(ContainerCtor {
                kind: ContainerKind::Vector {
                    labeled: labeled.unwrap_or(true),
                },
                list_elements: elements,
                map_entries: Vec::new(),
            }),
            line,
            column,
            0,
        );
        Ok(Parsed { node, consumed })
    }

    fn parse_comma_separated(&mut self, view: TokenView<'_>, scope: ScopeId) -> Outcome<Vec<NodeId>> {
        let mut elements = Vec::new();
        let mut offset = 0;
        while offset < view.limit() {
            let remaining = view.sub_view(offset, view.limit().saturating_sub(offset));
            let end = self.scan_to_comma_or_close(remaining);
            let sub = remaining.sub_view(0, end);
            let parsed = self.parse_greedy(sub, scope)?;
            elements.push(parsed.node);
            offset += end;
            if view.get(offset).is_some_and(|t| t.kind == TokenKind::Comma) {
                offset += 1;
            } else {
                break;
            }
        }
        Ok(elements)
    }

    fn find_map_arrow(&self, view: TokenView<'_>) -> Option<usize> {
        let mut depth: i32 = 0;
        let mut offset = 0;
        while let Some(tok) = view.get(offset) {
            if let TokenPayload::Bracket(c) = tok.payload {
                if OPEN_BRACKETS.contains(&c) {
                    depth += 1;
                } else if CLOSE_BRACKETS.contains(&c) {
                    depth -= 1;
                }
            } else if depth == 0 && tok.kind == TokenKind::MapArrow {
                return Some(offset);
            }
            offset += 1;
        }
        None
    }

    pub fn query_identifier(&self, scope: ScopeId, name: &str) -> bool {
        self.scopes.query(scope, name, QueryFlags::BUBBLE_UP).is_some()
    }
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;

    use super::*;
    use crate::scope::ScopeTable;

    fn toks(pairs: Vec<Token>) -> Vec<Token> {
        pairs
    }

    fn new_parser<'bump, 'a>(
        arena: &'a mut Arena<'bump, crate::ast::AstNode>,
        scopes: &'a mut ScopeTable,
        warnings: &'a WarningConfig,
        messages: &'a mut Vec<Message>,
    ) -> ExprParser<'bump, 'a> {
        ExprParser {
            arena,
            scopes,
            warnings,
            messages,
            file: std::path::PathBuf::from("test.eb"),
        }
    }

    #[test]
    fn parses_simple_addition_with_precedence() {
        let bump = Bump::new();
        let mut arena = Arena::new(&bump);
        let mut scopes = ScopeTable::new();
        let global = scopes.new_global();
        let warnings = WarningConfig::default();
        let mut messages = Vec::new();
        let tokens = toks(vec![
            Token::int(1, 1, 1),
            Token::binary_op("+", 1, 3),
            Token::int(2, 1, 5),
            Token::binary_op("*", 1, 7),
            Token::int(3, 1, 9),
        ]);
        let view = TokenView::new(&tokens);
        let mut parser = new_parser(&mut arena, &mut scopes, &warnings, &mut messages);
        let parsed = parser.parse_greedy(view, global).unwrap();
        assert_eq!(parsed.consumed, 5);
        match &parser.arena.get(parsed.node).unwrap().kind {
            NodeKind::Binary(b) => assert_eq!(b.op, BinOp::Add),
            other => panic!("expected Add at top, got {other:?}"),
        }
        assert!(messages.is_empty());
    }

    #[test]
    fn parses_identifier_reference() {
        let bump = Bump::new();
        let mut arena = Arena::new(&bump);
        let mut scopes = ScopeTable::new();
        let global = scopes.new_global();
        let warnings = WarningConfig::default();
        let mut messages = Vec::new();
        let tokens = toks(vec![Token::identifier("x", 1, 1)]);
        let view = TokenView::new(&tokens);
        let mut parser = new_parser(&mut arena, &mut scopes, &warnings, &mut messages);
        let parsed = parser.parse_greedy(view, global).unwrap();
        assert!(parser.arena.get(parsed.node).unwrap().is_identifier_ref());
    }

    #[test]
    fn parses_list_literal() {
        let bump = Bump::new();
        let mut arena = Arena::new(&bump);
        let mut scopes = ScopeTable::new();
        let global = scopes.new_global();
        let warnings = WarningConfig::default();
        let mut messages = Vec::new();
        let tokens = toks(vec![
            Token::bracket('[', 1, 1),
            Token::int(1, 1, 2),
            Token::comma(1, 3),
            Token::int(2, 1, 5),
            Token::bracket(']', 1, 6),
        ]);
        let view = TokenView::new(&tokens);
        let mut parser = new_parser(&mut arena, &mut scopes, &warnings, &mut messages);
        let parsed = parser.parse_greedy(view, global).unwrap();
        match &parser.arena.get(parsed.node).unwrap().kind {
            NodeKind::Container(c) => {
                assert!(matches!(c.kind, ContainerKind::List));
                assert_eq!(c.list_elements.len(), 2);
            }
            other => panic!("expected container, got {other:?}"),
        }
    }

    #[test]
    fn unbalanced_bracket_reports_diagnostic() {
        let bump = Bump::new();
        let mut arena = Arena::new(&bump);
        let mut scopes = ScopeTable::new();
        let global = scopes.new_global();
        let warnings = WarningConfig::default();
        let mut messages = Vec::new();
        let tokens = toks(vec![Token::bracket('(', 1, 1), Token::int(1, 1, 2)]);
        let view = TokenView::new(&tokens);
        let mut parser = new_parser(&mut arena, &mut scopes, &warnings, &mut messages);
        let _ = parser.parse_greedy(view, global).unwrap();
        assert!(!messages.is_empty());
    }
}

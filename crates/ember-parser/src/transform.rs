//! AST transform driver (C7): a generic in/out visitor used to wire parent
//! pointers after parsing and available to later (out-of-scope) passes.

use ember_core::{Arena, Message, NodeId, Outcome};

use crate::ast::{AstNode, ContainerKind, NodeKind};

/// What a `visit_in` callback decides about the node it was just handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descend {
    Into,
    Cancel,
}

/// Every child [`NodeId`] referenced directly by `kind`, in source order.
/// Used both by the transform driver to recurse and by the parent-pointer
/// wiring pass.
pub fn children_of(kind: &NodeKind) -> Vec<NodeId> {
    match kind {
        NodeKind::IdentifierRef(_) | NodeKind::Literal(_) | NodeKind::Break | NodeKind::Continue => {
            Vec::new()
        }
        NodeKind::Binary(b) => vec![b.left, b.right],
        NodeKind::Unary(u) => vec![u.operand],
        NodeKind::Call(c) => {
            let mut v = vec![c.callee];
            v.extend(c.args.positional.iter().copied());
            v.extend(c.args.keyword.iter().map(|(_, id)| *id));
            v
        }
        NodeKind::InlineFuncDef(f) => {
            let mut v: Vec<NodeId> = f.params.args.iter().filter_map(|a| a.default).collect();
            v.push(f.body);
            v
        }
        NodeKind::FuncDef(f) => {
            let mut v: Vec<NodeId> = f.params.args.iter().filter_map(|a| a.default).collect();
            v.extend(f.body.iter().copied());
            v
        }
        NodeKind::ClassDef(c) => {
            let mut v = c.vars.clone();
            v.extend(c.funcs.iter().copied());
            v
        }
        NodeKind::VarDef(v) => v.initializer.into_iter().collect(),
        NodeKind::If(s) => s
            .branches
            .iter()
            .flat_map(|b| b.condition.into_iter().chain(b.body.iter().copied()))
            .collect(),
        NodeKind::While(w) => {
            let mut v = vec![w.condition];
            v.extend(w.body.iter().copied());
            v
        }
        NodeKind::For(f) => {
            let mut v = vec![f.iterable];
            v.extend(f.body.iter().copied());
            v
        }
        NodeKind::With(w) => {
            let mut v: Vec<NodeId> = w.clauses.iter().map(|c| c.expr).collect();
            v.extend(w.body.iter().copied());
            v
        }
        NodeKind::Do(d) => {
            let mut v = d.body.clone();
            if let Some(r) = &d.rescue {
                v.extend(r.exception_types.iter().copied());
                v.extend(r.body.iter().copied());
            }
            if let Some(fb) = &d.finally_body {
                v.extend(fb.iter().copied());
            }
            v
        }
        NodeKind::Return(e) => e.into_iter().collect(),
        NodeKind::Raise(e) => vec![*e],
        NodeKind::Await(e) => vec![*e],
        NodeKind::Async(e) => vec![*e],
        NodeKind::Import(_) => Vec::new(),
        NodeKind::Container(c) => {
            let mut v = c.list_elements.clone();
            match c.kind {
                ContainerKind::Map => {
                    for entry in &c.map_entries {
                        v.push(entry.key);
                        v.push(entry.value);
                    }
                }
                _ => {}
            }
            v
        }
        NodeKind::Given(g) => {
            let mut v = vec![g.condition, g.then_branch];
            if let Some(e) = g.else_branch {
                v.push(e);
            }
            v
        }
        NodeKind::ExprStatement(e) => vec![*e],
        NodeKind::Assignment { lhs, rhs, .. } => vec![*lhs, *rhs],
    }
}

/// `apply(ast, visit_in, visit_out, ud)`: traverse `roots` and everything
/// reachable from them, calling `visit_in` pre-order and `visit_out`
/// post-order. `visit_in` may cancel descent into the node it was just
/// given. Either callback may return `Err` to signal failure; an
/// out-of-memory failure is converted into a diagnostic appended to
/// `messages` rather than aborting the whole traversal silently.
pub fn apply<'bump, In, Out>(
    arena: &Arena<'bump, AstNode>,
    roots: &[NodeId],
    messages: &mut Vec<Message>,
    file: &std::path::Path,
    mut visit_in: In,
    mut visit_out: Out,
) -> Outcome<()>
where
    In: FnMut(NodeId, &AstNode) -> Outcome<Descend>,
    Out: FnMut(NodeId, &AstNode) -> Outcome<()>,
{
    for &root in roots {
        visit_node(arena, root, messages, file, &mut visit_in, &mut visit_out)?;
    }
    Ok(())
}

fn visit_node<'bump, In, Out>(
    arena: &Arena<'bump, AstNode>,
    id: NodeId,
    messages: &mut Vec<Message>,
    file: &std::path::Path,
    visit_in: &mut In,
    visit_out: &mut Out,
) -> Outcome<()>
where
    In: FnMut(NodeId, &AstNode) -> Outcome<Descend>,
    Out: FnMut(NodeId, &AstNode) -> Outcome<()>,
{
    let Some(node) = arena.get(id) else {
        return Ok(());
    };

    let descend = match visit_in(id, node) {
        Ok(d) => d,
        Err(failure) => return Ok(convert_oom(failure, messages, file, node)),
    };

    if descend == Descend::Into {
        let children = children_of(&node.kind);
        for child in children {
            visit_node(arena, child, messages, file, visit_in, visit_out)?;
        }
    }

    let node = arena.get(id).expect("node cannot vanish mid-traversal");
    if let Err(failure) = visit_out(id, node) {
        return Ok(convert_oom(failure, messages, file, node));
    }
    Ok(())
}

fn convert_oom(
    failure: ember_core::outcome::Failure,
    messages: &mut Vec<Message>,
    file: &std::path::Path,
    node: &AstNode,
) {
    messages.push(Message::error(
        format!("internal error during AST transform: {failure}"),
        file.to_path_buf(),
        node.line,
        node.column,
    ));
}

/// Wire up every node's `parent` field by walking from `roots`. Run once
/// after a translation unit finishes parsing.
pub fn wire_parent_pointers<'bump>(arena: &mut Arena<'bump, AstNode>, roots: &[NodeId]) {
    let mut stack: Vec<NodeId> = roots.to_vec();
    let mut edges: Vec<(NodeId, NodeId)> = Vec::new();
    while let Some(id) = stack.pop() {
        let Some(node) = arena.get(id) else { continue };
        for child in children_of(&node.kind) {
            edges.push((child, id));
            stack.push(child);
        }
    }
    for (child, parent) in edges {
        if let Some(node) = arena.get_mut(child) {
            node.parent = Some(parent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, BinaryExpr, Literal};
    use bumpalo::Bump;

    #[test]
    fn apply_visits_pre_and_post_order() {
        let bump = Bump::new();
        let mut arena: Arena<AstNode> = Arena::new(&bump);
        let left = arena.alloc(AstNode::new(NodeKind::Literal(Literal::Int(1)), 1, 1, 0));
        let right = arena.alloc(AstNode::new(NodeKind::Literal(Literal::Int(2)), 1, 3, 0));
        let root = arena.alloc(AstNode::new(
            NodeKind::Binary(BinaryExpr {
                op: BinOp::Add,
                left,
                right,
            }),
            1,
            1,
            0,
        ));

        let mut order = Vec::new();
        let mut messages = Vec::new();
        apply(
            &arena,
            &[root],
            &mut messages,
            std::path::Path::new("t.eb"),
            |id, _| {
                order.push(("in", id));
                Ok(Descend::Into)
            },
            |id, _| {
                order.push(("out", id));
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(order[0], ("in", root));
        assert_eq!(order.last().unwrap(), &("out", root));
    }

    #[test]
    fn cancel_descend_skips_children() {
        let bump = Bump::new();
        let mut arena: Arena<AstNode> = Arena::new(&bump);
        let child = arena.alloc(AstNode::new(NodeKind::Literal(Literal::Int(1)), 1, 1, 0));
        let root = arena.alloc(AstNode::new(
            NodeKind::Unary(crate::ast::UnaryExpr {
                op: crate::ast::UnOp::Negate,
                operand: child,
            }),
            1,
            1,
            0,
        ));
        let mut visited = Vec::new();
        let mut messages = Vec::new();
        apply(
            &arena,
            &[root],
            &mut messages,
            std::path::Path::new("t.eb"),
            |id, _| {
                visited.push(id);
                Ok(Descend::Cancel)
            },
            |_, _| Ok(()),
        )
        .unwrap();
        assert_eq!(visited, vec![root]);
    }

    #[test]
    fn wire_parent_pointers_sets_child_parent() {
        let bump = Bump::new();
        let mut arena: Arena<AstNode> = Arena::new(&bump);
        let child = arena.alloc(AstNode::new(NodeKind::Literal(Literal::Int(1)), 1, 1, 0));
        let root = arena.alloc(AstNode::new(
            NodeKind::Unary(crate::ast::UnaryExpr {
                op: crate::ast::UnOp::Negate,
                operand: child,
            }),
            1,
            1,
            0,
        ));
        wire_parent_pointers(&mut arena, &[root]);
        assert_eq!(arena.get(child).unwrap().parent, Some(root));
        assert_eq!(arena.get(root).unwrap().parent, None);
    }
}

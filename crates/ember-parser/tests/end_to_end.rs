//! Cross-module scenarios spanning the statement parser, expression
//! parser, and scope table together (spec §8 end-to-end scenarios 1-4).

use std::path::PathBuf;

use bumpalo::Bump;
use ember_parser::scope::QueryFlags;
use ember_parser::token::Token;
use ember_parser::{SimpleProject, WarningConfig};

fn project(bump: &Bump) -> SimpleProject<'_> {
    SimpleProject::new(bump, PathBuf::from("e2e.eb"), WarningConfig::default())
}

/// Scenario 1: `func fib(n) { var a = 0  var b = 1  while n > 0 { var
/// tmp = b  b += a  a = tmp  n -= 1 }  return a }` parses clean, with
/// one parameter and four body statements, the `while` body holding
/// four statements of its own.
#[test]
fn fib_function_parses_without_diagnostics() {
    let bump = Bump::new();
    let mut project = project(&bump);
    let tokens = vec![
        Token::keyword("func", 1, 1),
        Token::identifier("fib", 1, 6),
        Token::bracket('(', 1, 9),
        Token::identifier("n", 1, 10),
        Token::bracket(')', 1, 11),
        Token::bracket('{', 1, 13),
        Token::keyword("var", 1, 15),
        Token::identifier("a", 1, 19),
        Token::binary_op("=", 1, 21),
        Token::int(0, 1, 23),
        Token::keyword("var", 1, 27),
        Token::identifier("b", 1, 31),
        Token::binary_op("=", 1, 33),
        Token::int(1, 1, 35),
        Token::keyword("while", 1, 39),
        Token::identifier("n", 1, 45),
        Token::binary_op(">", 1, 47),
        Token::int(0, 1, 49),
        Token::bracket('{', 1, 51),
        Token::keyword("var", 1, 53),
        Token::identifier("tmp", 1, 57),
        Token::binary_op("=", 1, 61),
        Token::identifier("b", 1, 63),
        Token::identifier("b", 1, 67),
        Token::binary_op("+=", 1, 69),
        Token::identifier("a", 1, 72),
        Token::identifier("a", 1, 76),
        Token::binary_op("=", 1, 78),
        Token::identifier("tmp", 1, 80),
        Token::identifier("n", 1, 86),
        Token::binary_op("-=", 1, 88),
        Token::int(1, 1, 91),
        Token::bracket('}', 1, 93),
        Token::keyword("return", 1, 96),
        Token::identifier("a", 1, 103),
        Token::bracket('}', 1, 105),
    ];
    let result = project.parse_unit(&tokens).unwrap();
    assert!(!project.has_errors());
    assert_eq!(result.statements.len(), 1);

    let func_node = project.arena.get(result.statements[0]).unwrap();
    let ember_parser::ast::NodeKind::FuncDef(func) = &func_node.kind else {
        panic!("expected a FuncDef node");
    };
    assert_eq!(func.params.args.len(), 1);
    assert_eq!(func.params.args[0].name.as_deref(), Some("n"));
    assert_eq!(func.body.len(), 4);

    let while_node_id = func.body[2];
    let while_node = project.arena.get(while_node_id).unwrap();
    let ember_parser::ast::NodeKind::While(while_stmt) = &while_node.kind else {
        panic!("expected the third body statement to be a While node");
    };
    assert_eq!(while_stmt.body.len(), 4);
}

/// Scenario 2: `class B {}  class B {}` reports a duplicate-class
/// diagnostic citing the first `B`'s position, while the second `B`
/// still produces a partial node.
#[test]
fn duplicate_top_level_class_cites_first_definitions_position() {
    let bump = Bump::new();
    let mut project = project(&bump);
    let tokens = vec![
        Token::keyword("class", 1, 1),
        Token::identifier("B", 1, 7),
        Token::bracket('{', 1, 9),
        Token::bracket('}', 1, 10),
        Token::keyword("class", 2, 1),
        Token::identifier("B", 2, 7),
        Token::bracket('{', 2, 9),
        Token::bracket('}', 2, 10),
    ];
    let result = project.parse_unit(&tokens).unwrap();
    assert!(project.has_errors());
    assert_eq!(result.statements.len(), 2);
    let duplicate = project
        .messages
        .iter()
        .find(|m| m.text.contains("already declared") && m.text.contains('B'))
        .expect("expected a duplicate-class diagnostic");
    assert_eq!(duplicate.line, 1);
    assert_eq!(duplicate.column, 1);
}

/// Scenario 3: `var x = 1  var x = 2` at top level reports a
/// duplicate-variable diagnostic.
#[test]
fn duplicate_top_level_var_reports_diagnostic() {
    let bump = Bump::new();
    let mut project = project(&bump);
    let tokens = vec![
        Token::keyword("var", 1, 1),
        Token::identifier("x", 1, 5),
        Token::binary_op("=", 1, 7),
        Token::int(1, 1, 9),
        Token::keyword("var", 2, 1),
        Token::identifier("x", 2, 5),
        Token::binary_op("=", 2, 7),
        Token::int(2, 2, 9),
    ];
    project.parse_unit(&tokens).unwrap();
    assert!(project.has_errors());
    assert!(project.messages.iter().any(|m| m.text.contains("already declared")));
}

/// Scenario 4: `import a.b  import a.b` duplicates, but `import a.b
/// import a.c` does not.
#[test]
fn duplicate_import_path_reports_diagnostic_but_distinct_paths_do_not() {
    let bump = Bump::new();
    let mut project = project(&bump);
    let tokens = vec![
        Token::keyword("import", 1, 1),
        Token::identifier("a", 1, 8),
        Token::binary_op(".", 1, 9),
        Token::identifier("b", 1, 10),
        Token::keyword("import", 2, 1),
        Token::identifier("a", 2, 8),
        Token::binary_op(".", 2, 9),
        Token::identifier("b", 2, 10),
    ];
    project.parse_unit(&tokens).unwrap();
    assert!(project.has_errors());

    let bump2 = Bump::new();
    let mut project2 = project(&bump2);
    let tokens2 = vec![
        Token::keyword("import", 1, 1),
        Token::identifier("a", 1, 8),
        Token::binary_op(".", 1, 9),
        Token::identifier("b", 1, 10),
        Token::keyword("import", 2, 1),
        Token::identifier("a", 2, 8),
        Token::binary_op(".", 2, 9),
        Token::identifier("c", 2, 10),
    ];
    project2.parse_unit(&tokens2).unwrap();
    assert!(!project2.has_errors());
}

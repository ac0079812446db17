//! AST output: render a tree back to source text
//!
//! The renderer produces canonical source: four-space indentation, fully
//! parenthesized expressions, `pass` omitted (an empty block renders as a
//! bare header line). Re-lexing and re-parsing the output of a parse
//! yields a structurally equivalent tree, which the round-trip tests
//! rely on.

use super::{Node, NodeKind};

/// Render a program node as source text
pub fn write_source(program: &Node) -> String {
    let mut out = String::new();
    for stmt in &program.children {
        write_statement(stmt, 0, &mut out);
    }
    out
}

/// Structural equality: everything but line numbers
pub fn same_shape(a: &Node, b: &Node) -> bool {
    a.kind == b.kind
        && a.value == b.value
        && a.type_name == b.type_name
        && a.parent_name == b.parent_name
        && a.params == b.params
        && a.children.len() == b.children.len()
        && a.children
            .iter()
            .zip(&b.children)
            .all(|(x, y)| same_shape(x, y))
}

fn indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("    ");
    }
}

fn write_statement(node: &Node, depth: usize, out: &mut String) {
    indent(depth, out);
    match node.kind {
        NodeKind::Block => {
            // a bare block statement comes from `pass` and holds nothing
            out.push_str("pass\n");
        }
        NodeKind::VarDecl => {
            out.push_str(node.type_name.as_deref().unwrap_or("void"));
            let mut initializer = node.children.first();
            if let Some(spec) = node
                .children
                .first()
                .filter(|child| child.kind == NodeKind::ArraySpecifier)
            {
                out.push('[');
                if let Some(size) = spec.children.first() {
                    write_expr(size, out);
                }
                out.push(']');
                initializer = node.children.get(1);
            }
            out.push(' ');
            out.push_str(node.text());
            if let Some(init) = initializer {
                out.push_str(" = ");
                write_expr(init, out);
            }
            out.push('\n');
        }
        NodeKind::Assignment => {
            write_expr(&node.children[0], out);
            out.push_str(" = ");
            write_expr(&node.children[1], out);
            out.push('\n');
        }
        NodeKind::Print => {
            out.push_str("print(");
            for (i, arg) in node.children.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(arg, out);
            }
            out.push_str(")\n");
        }
        NodeKind::Import => {
            out.push_str("import \"");
            out.push_str(node.text());
            out.push_str("\"\n");
        }
        NodeKind::If => write_if(node, depth, out, "if"),
        NodeKind::While => {
            out.push_str("while ");
            write_expr(&node.children[0], out);
            write_block(&node.children[1], depth, out);
        }
        NodeKind::DoWhile => {
            out.push_str("do");
            write_block(&node.children[0], depth, out);
            indent(depth, out);
            out.push_str("while (");
            write_expr(&node.children[1], out);
            out.push_str(")\n");
        }
        NodeKind::For => {
            out.push_str("for (");
            write_inline_statement(&node.children[0], out);
            out.push_str("; ");
            write_expr(&node.children[1], out);
            out.push_str("; ");
            write_inline_statement(&node.children[2], out);
            out.push(')');
            write_block(&node.children[3], depth, out);
        }
        NodeKind::Foreach => {
            out.push_str("foreach (");
            out.push_str(node.type_name.as_deref().unwrap_or("void"));
            out.push(' ');
            out.push_str(node.text());
            out.push_str(" in ");
            write_expr(&node.children[0], out);
            out.push(')');
            write_block(&node.children[1], depth, out);
        }
        NodeKind::Switch => {
            out.push_str("switch(");
            write_expr(&node.children[0], out);
            out.push_str("):\n");
            for case_node in &node.children[1..] {
                indent(depth + 1, out);
                match case_node.kind {
                    NodeKind::Case => {
                        out.push_str("case ");
                        write_expr(&case_node.children[0], out);
                        write_block(&case_node.children[1], depth + 1, out);
                    }
                    NodeKind::Default => {
                        out.push_str("default");
                        write_block(&case_node.children[0], depth + 1, out);
                    }
                    _ => out.push('\n'),
                }
            }
        }
        NodeKind::Break => out.push_str("break\n"),
        NodeKind::Continue => out.push_str("continue\n"),
        NodeKind::Return => {
            out.push_str("return");
            if let Some(value) = node.children.first() {
                out.push(' ');
                write_expr(value, out);
            }
            out.push('\n');
        }
        NodeKind::FuncDef => {
            out.push_str("define ");
            out.push_str(node.text());
            out.push('(');
            for (i, param) in node.params.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(param);
            }
            out.push(')');
            write_block(&node.children[0], depth, out);
        }
        NodeKind::ClassDef => {
            out.push_str("class ");
            out.push_str(node.text());
            if let Some(parent) = &node.parent_name {
                out.push_str(" extends ");
                out.push_str(parent);
            }
            out.push_str(":\n");
            for member in &node.children {
                match member.kind {
                    NodeKind::FieldDecl => {
                        indent(depth + 1, out);
                        out.push_str(member.type_name.as_deref().unwrap_or("void"));
                        out.push(' ');
                        out.push_str(member.text());
                        out.push('\n');
                    }
                    _ => write_statement(member, depth + 1, out),
                }
            }
        }
        _ => {
            write_expr(node, out);
            out.push('\n');
        }
    }
}

/// Render a for-loop header statement without trailing newline
fn write_inline_statement(node: &Node, out: &mut String) {
    match node.kind {
        NodeKind::VarDecl => {
            out.push_str(node.type_name.as_deref().unwrap_or("void"));
            out.push(' ');
            out.push_str(node.text());
            if let Some(init) = node.children.first() {
                out.push_str(" = ");
                write_expr(init, out);
            }
        }
        NodeKind::Assignment => {
            write_expr(&node.children[0], out);
            out.push_str(" = ");
            write_expr(&node.children[1], out);
        }
        _ => write_expr(node, out),
    }
}

fn write_if(node: &Node, depth: usize, out: &mut String, keyword: &str) {
    out.push_str(keyword);
    out.push(' ');
    write_expr(&node.children[0], out);
    write_block(&node.children[1], depth, out);
    if let Some(else_node) = node.children.get(2) {
        indent(depth, out);
        if else_node.kind == NodeKind::If {
            write_if(else_node, depth, out, "elif");
        } else {
            out.push_str("else");
            write_block(else_node, depth, out);
        }
    }
}

fn write_block(block: &Node, depth: usize, out: &mut String) {
    out.push_str(":\n");
    for stmt in &block.children {
        write_statement(stmt, depth + 1, out);
    }
}

fn write_expr(node: &Node, out: &mut String) {
    match node.kind {
        NodeKind::IntLiteral | NodeKind::FloatLiteral => out.push_str(node.text()),
        NodeKind::BoolLiteral => out.push_str(node.text()),
        NodeKind::StringLiteral => {
            out.push('"');
            for c in node.text().chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '"' => out.push_str("\\\""),
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    '\r' => out.push_str("\\r"),
                    other => out.push(other),
                }
            }
            out.push('"');
        }
        NodeKind::VarRef => out.push_str(node.text()),
        NodeKind::BinaryOp => {
            out.push('(');
            write_expr(&node.children[0], out);
            out.push(' ');
            out.push_str(node.text());
            out.push(' ');
            write_expr(&node.children[1], out);
            out.push(')');
        }
        NodeKind::UnaryOp => {
            out.push('(');
            out.push_str(node.text());
            write_expr(&node.children[0], out);
            out.push(')');
        }
        NodeKind::FuncCall => {
            write_expr(&node.children[0], out);
            out.push('(');
            for (i, arg) in node.children[1..].iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(arg, out);
            }
            out.push(')');
        }
        NodeKind::FieldAccess => {
            write_expr(&node.children[0], out);
            out.push('.');
            out.push_str(node.text());
        }
        NodeKind::IndexAccess => {
            write_expr(&node.children[0], out);
            out.push('[');
            write_expr(&node.children[1], out);
            out.push(']');
        }
        NodeKind::ListLiteral => {
            out.push('[');
            for (i, item) in node.children.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(item, out);
            }
            out.push(']');
        }
        NodeKind::MapLiteral => {
            out.push('{');
            for (i, pair) in node.children.chunks(2).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(&pair[0], out);
                out.push_str(": ");
                if pair.len() > 1 {
                    write_expr(&pair[1], out);
                }
            }
            out.push('}');
        }
        NodeKind::NewExpr => {
            out.push_str("new ");
            write_expr(&node.children[0], out);
        }
        _ => {}
    }
}

//! Abstract Syntax Tree definitions

pub mod output;

use serde::{Deserialize, Serialize};

/// Discriminant for every syntactic construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Program,
    Block,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    BoolLiteral,
    ListLiteral,
    MapLiteral,
    VarDecl,
    Assignment,
    VarRef,
    BinaryOp,
    UnaryOp,
    If,
    While,
    DoWhile,
    For,
    Foreach,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Print,
    FuncDef,
    FuncCall,
    Import,
    ClassDef,
    NewExpr,
    FieldAccess,
    IndexAccess,
    FieldDecl,
    ArraySpecifier,
}

impl NodeKind {
    /// True for kinds that produce a value when evaluated.
    ///
    /// The REPL uses this to decide whether to echo a sole statement's
    /// result.
    pub fn is_expression(self) -> bool {
        matches!(
            self,
            NodeKind::IntLiteral
                | NodeKind::FloatLiteral
                | NodeKind::StringLiteral
                | NodeKind::BoolLiteral
                | NodeKind::ListLiteral
                | NodeKind::MapLiteral
                | NodeKind::VarRef
                | NodeKind::BinaryOp
                | NodeKind::UnaryOp
                | NodeKind::FuncCall
                | NodeKind::NewExpr
                | NodeKind::FieldAccess
                | NodeKind::IndexAccess
        )
    }
}

/// A node in the syntax tree.
///
/// Every construct uses the same shape: a kind tag, optional textual
/// payloads, and positionally-interpreted children. `value` holds the
/// operator, name, or literal text; `type_name` the declared type of a
/// declaration or foreach binder; `parent_name` the superclass of a class
/// definition; `params` the parameter names of a function definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<Node>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub params: Vec<String>,
    pub line: usize,
}

impl Node {
    pub fn new(kind: NodeKind, line: usize) -> Self {
        Node {
            kind,
            value: None,
            type_name: None,
            parent_name: None,
            children: Vec::new(),
            params: Vec::new(),
            line,
        }
    }

    pub fn with_value(kind: NodeKind, value: impl Into<String>, line: usize) -> Self {
        let mut node = Node::new(kind, line);
        node.value = Some(value.into());
        node
    }

    /// Append a child node
    pub fn push(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Textual payload, or `""` when absent
    pub fn text(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

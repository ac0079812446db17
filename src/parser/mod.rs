//! Recursive-descent parser
//!
//! Statements are parsed by plain recursive descent; expressions by
//! precedence climbing from `or` at the bottom to the postfix chain of
//! calls, field accesses, and index accesses at the top. The parser never
//! consumes `Newline` as part of a statement — statement boundaries skip
//! them — and `Indent`/`Dedent` are the only block delimiters.
//!
//! Missing structural tokens (a dropped `:` or `)`) are tolerated where
//! the grammar stays unambiguous; a block whose `:` is not followed by an
//! `Indent` parses as an empty block, which is what makes empty `case`
//! arms fall through.

use crate::ast::{Node, NodeKind};
use crate::error::{CompileError, Result};
use crate::lexer::{Keyword, Token, TokenKind};

/// Parse a token stream into a program node
pub fn parse(tokens: &[Token]) -> Result<Node> {
    if tokens.is_empty() {
        return Ok(Node::with_value(NodeKind::Program, "root", 0));
    }
    Parser::new(tokens).parse_program()
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_at(&self, n: usize) -> &TokenKind {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)].kind
    }

    fn line(&self) -> usize {
        self.peek().line
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(&kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        self.eat(TokenKind::Keyword(kw))
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        self.peek().is_keyword(kw)
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(CompileError::parser(
                format!("Expected {what}, found {other}."),
                self.line(),
            )),
        }
    }

    // --- Program and statements ---

    fn parse_program(&mut self) -> Result<Node> {
        let mut root = Node::with_value(NodeKind::Program, "root", 0);
        while !self.check(&TokenKind::Eof) {
            if self.eat(TokenKind::Newline) {
                continue;
            }
            root.push(self.parse_statement()?);
        }
        Ok(root)
    }

    fn parse_statement(&mut self) -> Result<Node> {
        match self.peek_kind() {
            TokenKind::Keyword(Keyword::Class) => self.parse_class_definition(),
            TokenKind::Keyword(Keyword::Define) => self.parse_function_definition(),
            TokenKind::Keyword(Keyword::Print) => self.parse_print(),
            TokenKind::Keyword(Keyword::Import) => self.parse_import(),
            TokenKind::Keyword(kw) if kw.starts_declaration() => self.parse_typed_declaration(),
            TokenKind::Ident(_) if matches!(self.peek_at(1), TokenKind::Ident(_)) => {
                self.parse_user_typed_declaration()
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::Foreach) => self.parse_foreach(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Do) => self.parse_do_while(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::Pass) => {
                let line = self.line();
                self.advance();
                // pass is an empty block: executing it does nothing
                Ok(Node::new(NodeKind::Block, line))
            }
            TokenKind::Keyword(Keyword::Break) => {
                let line = self.line();
                self.advance();
                Ok(Node::new(NodeKind::Break, line))
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let line = self.line();
                self.advance();
                Ok(Node::new(NodeKind::Continue, line))
            }
            _ => {
                let expr = self.parse_expression()?;
                if self.eat(TokenKind::Assign) {
                    let line = expr.line;
                    let right = self.parse_expression()?;
                    let mut node = Node::new(NodeKind::Assignment, line);
                    node.push(expr);
                    node.push(right);
                    Ok(node)
                } else {
                    Ok(expr)
                }
            }
        }
    }

    /// `: NEWLINE INDENT stmt* DEDENT`
    ///
    /// Without an `Indent` after the colon the block is empty.
    fn parse_block(&mut self) -> Result<Node> {
        let line = self.line();
        self.eat(TokenKind::Colon);
        self.eat(TokenKind::Newline);
        let mut block = Node::new(NodeKind::Block, line);
        if !self.eat(TokenKind::Indent) {
            return Ok(block);
        }
        while !self.check(&TokenKind::Dedent) && !self.check(&TokenKind::Eof) {
            if self.eat(TokenKind::Newline) {
                continue;
            }
            block.push(self.parse_statement()?);
        }
        self.eat(TokenKind::Dedent);
        Ok(block)
    }

    fn parse_class_definition(&mut self) -> Result<Node> {
        self.advance(); // 'class'
        let line = self.line();
        let name = self.expect_ident("class name")?;
        let mut class_node = Node::with_value(NodeKind::ClassDef, name, line);
        if self.eat_keyword(Keyword::Extends) {
            class_node.parent_name = Some(self.expect_ident("parent class name")?);
        }

        self.eat(TokenKind::Colon);
        self.eat(TokenKind::Newline);
        if !self.eat(TokenKind::Indent) {
            return Ok(class_node);
        }
        while !self.check(&TokenKind::Dedent) && !self.check(&TokenKind::Eof) {
            if self.eat(TokenKind::Newline) {
                continue;
            }
            if self.at_keyword(Keyword::Define) {
                class_node.push(self.parse_function_definition()?);
            } else if self.eat_keyword(Keyword::Pass) {
                // discarded: contributes neither field nor method
            } else {
                let type_name = self.parse_type_name()?;
                if self.eat(TokenKind::LBracket) {
                    self.eat(TokenKind::RBracket);
                }
                let field_line = self.line();
                let field_name = self.expect_ident("field name")?;
                let mut field = Node::with_value(NodeKind::FieldDecl, field_name, field_line);
                field.type_name = Some(type_name);
                class_node.push(field);
            }
        }
        self.eat(TokenKind::Dedent);
        Ok(class_node)
    }

    fn parse_function_definition(&mut self) -> Result<Node> {
        self.advance(); // 'define'
        // The return type is optional; it is present exactly when the token
        // after the next one is not '('. Types are parsed and discarded.
        if !matches!(self.peek_at(1), TokenKind::LParen) {
            self.parse_type_name()?;
            if self.eat(TokenKind::LBracket) {
                self.eat(TokenKind::RBracket);
            }
        }
        let line = self.line();
        let name = self.expect_ident("function name")?;
        let mut func = Node::with_value(NodeKind::FuncDef, name, line);

        self.eat(TokenKind::LParen);
        if !self.check(&TokenKind::RParen) {
            loop {
                if self.param_has_type() {
                    self.parse_type_name()?;
                    if self.eat(TokenKind::LBracket) {
                        self.eat(TokenKind::RBracket);
                    }
                }
                let param = self.expect_ident("parameter name")?;
                func.params.push(param);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.eat(TokenKind::RParen);
        func.push(self.parse_block()?);
        Ok(func)
    }

    /// True when the upcoming parameter starts with a type annotation
    fn param_has_type(&self) -> bool {
        match self.peek_kind() {
            TokenKind::Keyword(kw) => kw.starts_declaration() || *kw == Keyword::Void,
            TokenKind::Ident(_) => matches!(self.peek_at(1), TokenKind::Ident(_)),
            _ => false,
        }
    }

    fn parse_print(&mut self) -> Result<Node> {
        let line = self.line();
        self.advance(); // 'print'
        let mut node = Node::new(NodeKind::Print, line);
        self.eat(TokenKind::LParen);
        if !self.check(&TokenKind::RParen) {
            loop {
                node.push(self.parse_expression()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.eat(TokenKind::RParen);
        Ok(node)
    }

    fn parse_import(&mut self) -> Result<Node> {
        let line = self.line();
        self.advance(); // 'import'
        match self.peek_kind().clone() {
            TokenKind::Str(name) | TokenKind::Ident(name) => {
                self.advance();
                Ok(Node::with_value(NodeKind::Import, name, line))
            }
            other => Err(CompileError::parser(
                format!("Expected module name after 'import', found {other}."),
                line,
            )),
        }
    }

    /// A single type word: a primitive type keyword or an identifier
    fn type_word(&mut self) -> Result<String> {
        match self.peek_kind().clone() {
            TokenKind::Keyword(kw) => {
                self.advance();
                Ok(kw.as_str().to_string())
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(CompileError::parser(
                format!("Expected type name, found {other}."),
                self.line(),
            )),
        }
    }

    /// A type name with optional generics: `int`, `list<T>`, `map<K,V>`
    fn parse_type_name(&mut self) -> Result<String> {
        let base = self.type_word()?;
        if (base == "list" || base == "map") && self.check(&TokenKind::Lt) {
            self.advance();
            let first = self.type_word()?;
            if self.eat(TokenKind::Comma) {
                let second = self.type_word()?;
                self.eat(TokenKind::Gt);
                return Ok(format!("{base}<{first},{second}>"));
            }
            self.eat(TokenKind::Gt);
            return Ok(format!("{base}<{first}>"));
        }
        Ok(base)
    }

    fn parse_typed_declaration(&mut self) -> Result<Node> {
        let type_name = self.parse_type_name()?;

        let mut array_spec = None;
        if self.eat(TokenKind::LBracket) {
            let mut spec = Node::new(NodeKind::ArraySpecifier, self.line());
            if !self.check(&TokenKind::RBracket) {
                spec.push(self.parse_expression()?);
            }
            self.eat(TokenKind::RBracket);
            array_spec = Some(spec);
        }

        let line = self.line();
        let name = self.expect_ident("variable name")?;
        let mut node = Node::with_value(NodeKind::VarDecl, name, line);
        node.type_name = Some(type_name);
        if let Some(spec) = array_spec {
            node.push(spec);
        }
        if self.eat(TokenKind::Assign) {
            node.push(self.parse_expression()?);
        }
        Ok(node)
    }

    fn parse_user_typed_declaration(&mut self) -> Result<Node> {
        let type_name = self.type_word()?;
        let line = self.line();
        let name = self.expect_ident("variable name")?;
        let mut node = Node::with_value(NodeKind::VarDecl, name, line);
        node.type_name = Some(type_name);
        if self.eat(TokenKind::Assign) {
            node.push(self.parse_expression()?);
        }
        // with no initializer the declaration binds void
        Ok(node)
    }

    fn parse_if(&mut self) -> Result<Node> {
        let line = self.line();
        self.advance(); // 'if' or 'elif'
        let mut node = Node::new(NodeKind::If, line);
        node.push(self.parse_expression()?);
        node.push(self.parse_block()?);
        if self.at_keyword(Keyword::Elif) {
            // each elif becomes the third child of its parent if
            node.push(self.parse_if()?);
        } else if self.eat_keyword(Keyword::Else) {
            node.push(self.parse_block()?);
        }
        Ok(node)
    }

    fn parse_while(&mut self) -> Result<Node> {
        let line = self.line();
        self.advance();
        let mut node = Node::new(NodeKind::While, line);
        node.push(self.parse_expression()?);
        node.push(self.parse_block()?);
        Ok(node)
    }

    fn parse_foreach(&mut self) -> Result<Node> {
        let line = self.line();
        self.advance();
        self.eat(TokenKind::LParen);
        let type_name = self.parse_type_name()?;
        let var_name = self.expect_ident("loop variable")?;
        if !self.eat_keyword(Keyword::In) {
            return Err(CompileError::parser(
                "Expected 'in' keyword in foreach-loop.",
                line,
            ));
        }
        let collection = self.parse_expression()?;
        self.eat(TokenKind::RParen);

        let mut node = Node::with_value(NodeKind::Foreach, var_name, line);
        node.type_name = Some(type_name);
        node.push(collection);
        node.push(self.parse_block()?);
        Ok(node)
    }

    fn parse_for(&mut self) -> Result<Node> {
        let line = self.line();
        self.advance();
        self.eat(TokenKind::LParen);
        let initializer = self.parse_statement()?;
        self.eat(TokenKind::Semicolon);
        let condition = self.parse_expression()?;
        self.eat(TokenKind::Semicolon);
        let increment = self.parse_statement()?;
        self.eat(TokenKind::RParen);

        let mut node = Node::new(NodeKind::For, line);
        node.push(initializer);
        node.push(condition);
        node.push(increment);
        node.push(self.parse_block()?);
        Ok(node)
    }

    fn parse_do_while(&mut self) -> Result<Node> {
        let line = self.line();
        self.advance();
        let mut node = Node::new(NodeKind::DoWhile, line);
        node.push(self.parse_block()?);
        if !self.eat_keyword(Keyword::While) {
            return Err(CompileError::parser(
                "Expected 'while' after 'do' block.",
                line,
            ));
        }
        self.eat(TokenKind::LParen);
        node.push(self.parse_expression()?);
        self.eat(TokenKind::RParen);
        Ok(node)
    }

    fn parse_switch(&mut self) -> Result<Node> {
        let line = self.line();
        self.advance();
        self.eat(TokenKind::LParen);
        let subject = self.parse_expression()?;
        self.eat(TokenKind::RParen);

        let mut node = Node::new(NodeKind::Switch, line);
        node.push(subject);

        self.eat(TokenKind::Colon);
        self.eat(TokenKind::Newline);
        if !self.eat(TokenKind::Indent) {
            return Ok(node);
        }
        while !self.check(&TokenKind::Dedent) && !self.check(&TokenKind::Eof) {
            if self.eat(TokenKind::Newline) {
                continue;
            }
            if self.at_keyword(Keyword::Case) {
                let case_line = self.line();
                self.advance();
                let mut case_node = Node::new(NodeKind::Case, case_line);
                case_node.push(self.parse_expression()?);
                case_node.push(self.parse_block()?);
                node.push(case_node);
            } else if self.at_keyword(Keyword::Default) {
                let default_line = self.line();
                self.advance();
                let mut default_node = Node::new(NodeKind::Default, default_line);
                default_node.push(self.parse_block()?);
                node.push(default_node);
            } else {
                self.advance();
            }
        }
        self.eat(TokenKind::Dedent);
        Ok(node)
    }

    fn parse_return(&mut self) -> Result<Node> {
        let line = self.line();
        self.advance();
        let mut node = Node::new(NodeKind::Return, line);
        if !matches!(
            self.peek_kind(),
            TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof
        ) {
            node.push(self.parse_expression()?);
        }
        Ok(node)
    }

    // --- Expressions, lowest precedence first ---

    fn parse_expression(&mut self) -> Result<Node> {
        self.parse_logic_or()
    }

    fn binary(op: &str, line: usize, left: Node, right: Node) -> Node {
        let mut node = Node::with_value(NodeKind::BinaryOp, op, line);
        node.push(left);
        node.push(right);
        node
    }

    fn parse_logic_or(&mut self) -> Result<Node> {
        let mut left = self.parse_logic_and()?;
        while self.at_keyword(Keyword::Or) {
            let line = self.line();
            self.advance();
            let right = self.parse_logic_and()?;
            left = Self::binary("or", line, left, right);
        }
        Ok(left)
    }

    fn parse_logic_and(&mut self) -> Result<Node> {
        let mut left = self.parse_equality()?;
        while self.at_keyword(Keyword::And) {
            let line = self.line();
            self.advance();
            let right = self.parse_equality()?;
            left = Self::binary("and", line, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Node> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Eq => "==",
                TokenKind::NotEq => "!=",
                _ => break,
            };
            let line = self.line();
            self.advance();
            let right = self.parse_comparison()?;
            left = Self::binary(op, line, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Node> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => "<",
                TokenKind::Gt => ">",
                TokenKind::LtEq => "<=",
                TokenKind::GtEq => ">=",
                _ => break,
            };
            let line = self.line();
            self.advance();
            let right = self.parse_term()?;
            left = Self::binary(op, line, left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Node> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => "+",
                TokenKind::Minus => "-",
                _ => break,
            };
            let line = self.line();
            self.advance();
            let right = self.parse_factor()?;
            left = Self::binary(op, line, left, right);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Node> {
        let mut left = self.parse_power()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => "*",
                TokenKind::Slash => "/",
                TokenKind::Percent => "%",
                _ => break,
            };
            let line = self.line();
            self.advance();
            let right = self.parse_power()?;
            left = Self::binary(op, line, left, right);
        }
        Ok(left)
    }

    // Exponentiation is left-associative: a^b^c parses as (a^b)^c
    fn parse_power(&mut self) -> Result<Node> {
        let mut left = self.parse_unary()?;
        while self.check(&TokenKind::Caret) {
            let line = self.line();
            self.advance();
            let right = self.parse_unary()?;
            left = Self::binary("^", line, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node> {
        let op = match self.peek_kind() {
            TokenKind::Minus => "-",
            TokenKind::Bang => "!",
            _ => return self.parse_postfix(),
        };
        let line = self.line();
        self.advance();
        let operand = self.parse_unary()?;
        let mut node = Node::with_value(NodeKind::UnaryOp, op, line);
        node.push(operand);
        Ok(node)
    }

    fn parse_postfix(&mut self) -> Result<Node> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    let line = self.line();
                    self.advance();
                    let mut call = Node::new(NodeKind::FuncCall, line);
                    call.push(expr);
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            call.push(self.parse_expression()?);
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.eat(TokenKind::RParen);
                    expr = call;
                }
                TokenKind::Dot => {
                    let line = self.line();
                    self.advance();
                    let member = self.expect_ident("member name")?;
                    let mut access = Node::with_value(NodeKind::FieldAccess, member, line);
                    access.push(expr);
                    expr = access;
                }
                TokenKind::LBracket => {
                    let line = self.line();
                    self.advance();
                    let index = self.parse_expression()?;
                    self.eat(TokenKind::RBracket);
                    let mut access = Node::new(NodeKind::IndexAccess, line);
                    access.push(expr);
                    access.push(index);
                    expr = access;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Node> {
        let line = self.line();
        match self.peek_kind().clone() {
            TokenKind::Keyword(Keyword::New) => {
                self.advance();
                let call = self.parse_postfix()?;
                let mut node = Node::new(NodeKind::NewExpr, line);
                node.push(call);
                Ok(node)
            }
            TokenKind::Int(text) => {
                self.advance();
                Ok(Node::with_value(NodeKind::IntLiteral, text, line))
            }
            TokenKind::Float(text) => {
                self.advance();
                Ok(Node::with_value(NodeKind::FloatLiteral, text, line))
            }
            TokenKind::Str(text) => {
                self.advance();
                Ok(Node::with_value(NodeKind::StringLiteral, text, line))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Node::with_value(NodeKind::BoolLiteral, "true", line))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Node::with_value(NodeKind::BoolLiteral, "false", line))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Node::with_value(NodeKind::VarRef, name, line))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.eat(TokenKind::RParen);
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut list = Node::new(NodeKind::ListLiteral, line);
                if !self.check(&TokenKind::RBracket) {
                    loop {
                        list.push(self.parse_expression()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.eat(TokenKind::RBracket);
                Ok(list)
            }
            TokenKind::LBrace => {
                self.advance();
                let mut map = Node::new(NodeKind::MapLiteral, line);
                if !self.check(&TokenKind::RBrace) {
                    loop {
                        map.push(self.parse_expression()?);
                        self.eat(TokenKind::Colon);
                        map.push(self.parse_expression()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.eat(TokenKind::RBrace);
                Ok(map)
            }
            other => Err(CompileError::parser(
                format!("Unexpected token {other}."),
                line,
            )),
        }
    }
}

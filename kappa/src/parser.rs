//! Tree builder: consumes the token stream from [crate::lexer] and produces
//! a [Program] — a small item/statement AST whose expression positions are
//! arena-backed trees built by precedence climbing (§4.1.1).

use log::trace;

use crate::error::CompileError;
use crate::op::OperatorType;
use crate::token::{Token, TokenKind};
use crate::tree::{Arena, NodeId, NodeKind};

#[derive(Debug)]
pub struct Param {
    pub type_name: String,
    pub name: String,
}

#[derive(Debug)]
pub struct Decl {
    pub type_name: String,
    pub name: String,
    pub array_len: Option<i64>,
    pub init: Option<NodeId>,
}

#[derive(Debug)]
pub enum Stmt {
    Decl(Decl),
    Expr(NodeId),
    If { cond: NodeId, then_body: Box<Stmt>, else_body: Option<Box<Stmt>> },
    While { cond: NodeId, body: Box<Stmt> },
    DoWhile { body: Box<Stmt>, cond: NodeId },
    Return(Option<NodeId>),
    Block(Vec<Stmt>),
}

#[derive(Debug)]
pub enum Item {
    TypeDecl { name: String, members: Vec<Decl> },
    FuncDecl {
        name: String,
        return_type: String,
        params: Vec<Param>,
        body: Vec<Stmt>,
    },
    GlobalDecl(Decl),
}

/// The parser's full output: every item at top level, plus the arena that
/// owns every expression node any of them reference.
#[derive(Debug)]
pub struct Program {
    pub arena: Arena,
    pub items: Vec<Item>,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    arena: Arena,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, arena: Arena::new() }
    }

    pub fn parse_program(mut self) -> Result<Program, CompileError> {
        let mut items = Vec::new();
        while !self.at_eof() {
            items.push(self.parse_item()?);
        }
        Ok(Program { arena: self.arena, items })
    }

    // -- token stream helpers ------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn at_eof(&self) -> bool {
        self.peek_kind() == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn check_lexeme(&self, kind: TokenKind, lexeme: &str) -> bool {
        self.peek_kind() == kind && self.peek().lexeme == lexeme
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, CompileError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(CompileError::unexpected(self.peek()))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<Token, CompileError> {
        if self.check_lexeme(TokenKind::Keyword, word) {
            Ok(self.advance())
        } else {
            Err(CompileError::unexpected(self.peek()))
        }
    }

    // -- top level -------------------------------------------------------

    fn parse_item(&mut self) -> Result<Item, CompileError> {
        if self.check_lexeme(TokenKind::Keyword, "type") {
            return self.parse_type_decl();
        }
        let type_name = self.parse_type_name()?;
        self.expect(TokenKind::Declarator)?;
        let name_tok = self.expect(TokenKind::Identifier)?;

        if self.check(TokenKind::NewExpression) {
            return self.parse_func_decl(type_name, name_tok.lexeme);
        }

        let decl = self.parse_decl_tail(type_name, name_tok.lexeme)?;
        self.expect(TokenKind::Endline)?;
        Ok(Item::GlobalDecl(decl))
    }

    fn parse_type_decl(&mut self) -> Result<Item, CompileError> {
        self.expect_keyword("type")?;
        self.expect(TokenKind::Declarator)?;
        let name_tok = self.expect(TokenKind::Identifier)?;
        self.expect(TokenKind::NewStatement)?;
        let mut members = Vec::new();
        while !self.check(TokenKind::EndStatement) {
            let type_name = self.parse_type_name()?;
            self.expect(TokenKind::Declarator)?;
            let member_name = self.expect(TokenKind::Identifier)?;
            let member = self.parse_decl_tail(type_name, member_name.lexeme)?;
            self.expect(TokenKind::Endline)?;
            members.push(member);
        }
        self.expect(TokenKind::EndStatement)?;
        Ok(Item::TypeDecl { name: name_tok.lexeme, members })
    }

    fn parse_func_decl(&mut self, return_type: String, name: String) -> Result<Item, CompileError> {
        self.expect(TokenKind::NewExpression)?;
        let mut params = Vec::new();
        if !self.check(TokenKind::EndExpression) {
            loop {
                let base_type = self.parse_type_name()?;
                self.expect(TokenKind::Declarator)?;
                // A parameter may also carry its `*`s after the declarator,
                // attached to the name rather than the base type (`s64: *p`
                // is the same pointer-to-s64 as `*s64: p`).
                let mut stars = String::new();
                while self.check_lexeme(TokenKind::Operator, "*") {
                    self.advance();
                    stars.push('*');
                }
                let type_name = format!("{}{}", stars, base_type);
                let param_name = self.expect(TokenKind::Identifier)?;
                params.push(Param { type_name, name: param_name.lexeme });
                if self.check(TokenKind::Separator) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::EndExpression)?;
        self.expect(TokenKind::NewStatement)?;
        let mut body = Vec::new();
        while !self.check(TokenKind::EndStatement) {
            body.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::EndStatement)?;
        trace!("parsed function {}", name);
        Ok(Item::FuncDecl { name, return_type, params, body })
    }

    /// `TYPE` is zero or more `*` tokens followed by a base-type identifier
    /// (§3 Variable record: `type_name` is `*`-prefixed base type id).
    fn parse_type_name(&mut self) -> Result<String, CompileError> {
        let mut stars = String::new();
        while self.check_lexeme(TokenKind::Operator, "*") {
            self.advance();
            stars.push('*');
        }
        let base = self.expect(TokenKind::Identifier)?;
        Ok(format!("{}{}", stars, base.lexeme))
    }

    /// Parses whatever follows `TYPE : IDENT` in a declaration: an optional
    /// `[n]` array size, or an optional `= expr` initializer.
    fn parse_decl_tail(&mut self, type_name: String, name: String) -> Result<Decl, CompileError> {
        let mut array_len = None;
        let mut init = None;
        if self.check(TokenKind::NewIndex) {
            self.advance();
            let n_tok = self.expect(TokenKind::Number)?;
            array_len = Some(
                n_tok
                    .lexeme
                    .parse::<i64>()
                    .map_err(|_| CompileError::ExpectedConstant { line: n_tok.line, column: n_tok.column })?,
            );
            self.expect(TokenKind::EndIndex)?;
        } else if self.check(TokenKind::Assignment) && self.peek().lexeme == "=" {
            self.advance();
            init = Some(self.parse_expr(0)?);
        }
        Ok(Decl { type_name, name, array_len, init })
    }

    // -- statements --------------------------------------------------------

    fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        if self.check(TokenKind::NewStatement) {
            return self.parse_block();
        }
        if self.check_lexeme(TokenKind::Keyword, "if") {
            return self.parse_if();
        }
        if self.check_lexeme(TokenKind::Keyword, "while") {
            return self.parse_while();
        }
        if self.check_lexeme(TokenKind::Keyword, "do") {
            return self.parse_do_while();
        }
        if self.check_lexeme(TokenKind::Keyword, "return") {
            return self.parse_return();
        }
        if self.looks_like_decl() {
            let type_name = self.parse_type_name()?;
            self.expect(TokenKind::Declarator)?;
            let name_tok = self.expect(TokenKind::Identifier)?;
            let decl = self.parse_decl_tail(type_name, name_tok.lexeme)?;
            self.expect(TokenKind::Endline)?;
            return Ok(Stmt::Decl(decl));
        }
        let expr = self.parse_expr(0)?;
        self.expect(TokenKind::Endline)?;
        Ok(Stmt::Expr(expr))
    }

    /// A statement starts a declaration iff it opens with an identifier (or
    /// a run of `*`s then an identifier) immediately followed by `:`, which
    /// can only be the `TYPE : IDENT` decl form — every other statement kind
    /// starts with a keyword, `{`, or an expression that can't contain a
    /// bare `:` in that position.
    fn looks_like_decl(&self) -> bool {
        let mut i = self.pos;
        while matches!(self.tokens.get(i), Some(t) if t.kind == TokenKind::Operator && t.lexeme == "*") {
            i += 1;
        }
        matches!(self.tokens.get(i), Some(t) if t.kind == TokenKind::Identifier)
            && matches!(self.tokens.get(i + 1), Some(t) if t.kind == TokenKind::Declarator)
    }

    fn parse_block(&mut self) -> Result<Stmt, CompileError> {
        self.expect(TokenKind::NewStatement)?;
        let mut stmts = Vec::new();
        while !self.check(TokenKind::EndStatement) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::EndStatement)?;
        Ok(Stmt::Block(stmts))
    }

    fn parse_if(&mut self) -> Result<Stmt, CompileError> {
        self.expect_keyword("if")?;
        self.expect(TokenKind::NewExpression)?;
        let cond = self.parse_expr(0)?;
        self.expect(TokenKind::EndExpression)?;
        let then_body = Box::new(self.parse_stmt()?);
        let else_body = if self.check_lexeme(TokenKind::Keyword, "else") {
            self.advance();
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If { cond, then_body, else_body })
    }

    fn parse_while(&mut self) -> Result<Stmt, CompileError> {
        self.expect_keyword("while")?;
        self.expect(TokenKind::NewExpression)?;
        let cond = self.parse_expr(0)?;
        self.expect(TokenKind::EndExpression)?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_do_while(&mut self) -> Result<Stmt, CompileError> {
        self.expect_keyword("do")?;
        let body = Box::new(self.parse_stmt()?);
        self.expect_keyword("while")?;
        self.expect(TokenKind::NewExpression)?;
        let cond = self.parse_expr(0)?;
        self.expect(TokenKind::EndExpression)?;
        self.expect(TokenKind::Endline)?;
        Ok(Stmt::DoWhile { body, cond })
    }

    fn parse_return(&mut self) -> Result<Stmt, CompileError> {
        self.expect_keyword("return")?;
        if self.check(TokenKind::Endline) {
            self.advance();
            return Ok(Stmt::Return(None));
        }
        let expr = self.parse_expr(0)?;
        self.expect(TokenKind::Endline)?;
        Ok(Stmt::Return(Some(expr)))
    }

    // -- expressions: precedence climbing (§4.1.1) ------------------------

    /// Parses an expression whose outermost operator binds at least as
    /// tightly as `min_prec`. This recursive formulation produces the exact
    /// same tree shape as the iterative parent-pointer rotation the model
    /// describes: each recursive call IS a position on the spine.
    fn parse_expr(&mut self, min_prec: i32) -> Result<NodeId, CompileError> {
        let mut left = self.parse_unary()?;
        loop {
            let (op, op_token) = match self.peek_binary_op() {
                Some(pair) => pair,
                None => break,
            };
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.advance();
            if op == OperatorType::Mod {
                self.reject_float_operand(left)?;
            }
            // Assignment is right-associative (binds to everything on the
            // right at its own precedence); comparisons/arithmetic are
            // left-associative, so the recursive side climbs one above.
            let next_min = if op.is_assignment() { prec } else { prec + 1 };
            let right = self.parse_expr(next_min)?;
            if op == OperatorType::Mod {
                self.reject_float_operand(right)?;
            }
            let node = self.arena.alloc(NodeKind::Operator(op), op_token);
            self.arena.attach(node, left);
            self.arena.attach(node, right);
            left = node;
        }
        Ok(left)
    }

    fn reject_float_operand(&self, id: NodeId) -> Result<(), CompileError> {
        let node = self.arena.get(id);
        if node.token.kind == TokenKind::Number && node.token.lexeme.contains('.') {
            return Err(CompileError::UnallowedFloat { line: node.token.line, column: node.token.column });
        }
        Ok(())
    }

    fn peek_binary_op(&self) -> Option<(OperatorType, Token)> {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Operator => OperatorType::from_lexeme(&tok.lexeme, false).map(|o| (o, tok.clone())),
            TokenKind::Assignment => OperatorType::from_lexeme(&tok.lexeme, false).map(|o| (o, tok.clone())),
            _ => None,
        }
    }

    fn parse_unary(&mut self) -> Result<NodeId, CompileError> {
        let tok = self.peek().clone();
        if tok.kind == TokenKind::Operator {
            if let Some(op) = OperatorType::from_lexeme(&tok.lexeme, true) {
                self.advance();
                let operand = self.parse_unary()?;
                let node = self.arena.alloc(NodeKind::Operator(op), tok);
                self.arena.attach(node, operand);
                return Ok(node);
            }
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<NodeId, CompileError> {
        let mut node = self.parse_primary()?;
        loop {
            if self.check(TokenKind::NewExpression) {
                node = self.parse_call(node)?;
            } else if self.check(TokenKind::NewIndex) {
                node = self.parse_index(node)?;
            } else if self.check(TokenKind::Member) {
                node = self.parse_member(node)?;
            } else {
                break;
            }
        }
        Ok(node)
    }

    fn parse_call(&mut self, callee: NodeId) -> Result<NodeId, CompileError> {
        let open = self.advance();
        let call = self.arena.alloc(NodeKind::Call, open);
        self.arena.attach(call, callee);
        if !self.check(TokenKind::EndExpression) {
            loop {
                let arg = self.parse_expr(0)?;
                self.arena.attach(call, arg);
                if self.check(TokenKind::Separator) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::EndExpression)?;
        Ok(call)
    }

    fn parse_index(&mut self, base: NodeId) -> Result<NodeId, CompileError> {
        let open = self.advance();
        let idx_expr = self.parse_expr(0)?;
        self.expect(TokenKind::EndIndex)?;
        let node = self.arena.alloc(NodeKind::Index, open);
        self.arena.attach(node, base);
        self.arena.attach(node, idx_expr);
        Ok(node)
    }

    fn parse_member(&mut self, object: NodeId) -> Result<NodeId, CompileError> {
        let dot = self.advance();
        let name_tok = self.expect(TokenKind::Identifier)?;
        let name_leaf = self.arena.alloc(NodeKind::LeafToken, name_tok);
        let node = self.arena.alloc(NodeKind::Member, dot);
        self.arena.attach(node, object);
        self.arena.attach(node, name_leaf);
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<NodeId, CompileError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Number | TokenKind::Identifier => {
                self.advance();
                Ok(self.arena.alloc(NodeKind::LeafToken, tok))
            }
            TokenKind::NewExpression => {
                self.advance();
                let inner = self.parse_expr(0)?;
                self.expect(TokenKind::EndExpression)?;
                Ok(inner)
            }
            _ => Err(CompileError::unexpected(&tok)),
        }
    }
}

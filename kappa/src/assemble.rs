//! Walks a [Program] and emits KASM text (§4.1.2 – §4.1.6, §4.1.8). This is
//! "core A": the only output is lines of text plus the `r`/`s` counters
//! threaded through every call, exactly as described in §4.1's preamble.

use std::fmt::Write as _;

use log::debug;

use crate::error::CompileError;
use crate::op::OperatorType;
use crate::parser::{Decl, Item, Param, Program, Stmt};
use crate::scope::Scopes;
use crate::token::TokenKind;
use crate::tree::{Arena, NodeId, NodeKind};

/// The label every top-level (non-function) declaration is assembled under.
/// The model gives the VM no notion of a preallocated global segment outside
/// a frame (§4.2.1 only ever allocates frames via `callf`), so globals are
/// lowered into an ordinary callable frame instead of silently going dead;
/// a host calls this label once before calling into user code that expects
/// globals to be initialized. See `DESIGN.md` for the reasoning.
pub const GLOBALS_LABEL: &str = "__globals__";

pub struct Assembler {
    r: i32,
    s: i32,
    out: String,
    scopes: Scopes,
}

impl Assembler {
    pub fn new() -> Self {
        Self { r: -1, s: -1, out: String::new(), scopes: Scopes::new() }
    }

    pub fn assemble(mut self, program: &Program) -> Result<String, CompileError> {
        self.predeclare(program);

        let mut global_decls = Vec::new();
        for item in &program.items {
            match item {
                Item::GlobalDecl(decl) => global_decls.push(decl),
                Item::TypeDecl { .. } | Item::FuncDecl { .. } => {}
            }
        }
        if !global_decls.is_empty() {
            self.emit_label(GLOBALS_LABEL);
            for decl in &global_decls {
                self.emit_decl(&program.arena, decl)?;
            }
            self.emit_instr("leave", &[]);
        }

        for item in &program.items {
            match item {
                Item::TypeDecl { name, members } => self.emit_type_decl(&program.arena, name, members)?,
                Item::FuncDecl { name, return_type, params, body } => {
                    self.emit_func_decl(&program.arena, name, return_type, params, body)?
                }
                Item::GlobalDecl(_) => {}
            }
        }
        Ok(self.out)
    }

    /// Registers every top-level name before emitting any code, so mutual
    /// and self recursion between functions resolves regardless of source
    /// order (§8 scenario S6 calls `fib` from inside `fib`).
    fn predeclare(&mut self, program: &Program) {
        for item in &program.items {
            match item {
                Item::FuncDecl { name, return_type, .. } => {
                    self.scopes.declare(name, return_type, true);
                }
                Item::GlobalDecl(decl) => {
                    self.scopes.declare(&decl.name, &decl.type_name, false);
                }
                Item::TypeDecl { .. } => {}
            }
        }
    }

    // -- register/label counters -----------------------------------------

    fn alloc_reg(&mut self) -> i32 {
        self.r += 1;
        self.r
    }

    /// Reads the current top register, then frees it (`r<r-->`).
    fn take_reg(&mut self) -> i32 {
        let v = self.r;
        self.r -= 1;
        v
    }

    fn alloc_label(&mut self) -> String {
        self.s += 1;
        format!("S{}", self.s)
    }

    fn reg(n: i32) -> String {
        format!("r{}", n)
    }

    // -- emission primitives ------------------------------------------------

    fn emit_label(&mut self, name: &str) {
        self.out.push_str(name);
        self.out.push_str(":\n");
    }

    fn emit_instr(&mut self, opcode: &str, args: &[String]) {
        let _ = write!(self.out, "\t{}:", opcode);
        for a in args {
            let _ = write!(self.out, " {}", a);
        }
        self.out.push('\n');
    }

    // -- declarations (§4.1.5) --------------------------------------------

    fn emit_decl(&mut self, arena: &Arena, decl: &Decl) -> Result<(), CompileError> {
        self.scopes.declare(&decl.name, &decl.type_name, false);
        if let Some(len) = decl.array_len {
            self.emit_instr(
                "newav",
                &[decl.type_name.clone(), decl.name.clone(), len.to_string()],
            );
        } else {
            self.emit_instr("newsv", &[decl.type_name.clone(), decl.name.clone()]);
        }
        if let Some(init) = decl.init {
            self.emit_expr(arena, init)?;
            let v = self.take_reg();
            self.emit_instr("saver", &[decl.name.clone(), Self::reg(v)]);
        }
        Ok(())
    }

    fn emit_type_decl(&mut self, arena: &Arena, name: &str, members: &[Decl]) -> Result<(), CompileError> {
        self.emit_label(name);
        for member in members {
            // Type bodies are layouts only (§4.1.5): never compile a member
            // initializer, and array members aren't part of §4.2.5's layout
            // rule, so only the scalar newsv form is emitted here.
            let _ = arena;
            self.emit_instr("newsv", &[member.type_name.clone(), member.name.clone()]);
        }
        Ok(())
    }

    fn emit_func_decl(
        &mut self,
        arena: &Arena,
        name: &str,
        _return_type: &str,
        params: &[Param],
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        debug!("assembling function {}", name);
        self.emit_label(name);
        self.scopes.push();
        for param in params {
            let reg = self.alloc_reg();
            self.emit_instr("poprr", &[Self::reg(reg)]);
            let v = self.take_reg();
            self.scopes.declare(&param.name, &param.type_name, false);
            // A parameter is a declaration like any other (§4.1.5): it needs
            // its own `newsv` slot before `saver` has anywhere to write.
            self.emit_instr("newsv", &[param.type_name.clone(), param.name.clone()]);
            self.emit_instr("saver", &[param.name.clone(), Self::reg(v)]);
        }
        for stmt in body {
            self.emit_stmt(arena, stmt)?;
        }
        self.scopes.pop();
        Ok(())
    }

    // -- statements (§4.1.6, §4.1.8) ---------------------------------------

    fn emit_stmt(&mut self, arena: &Arena, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Decl(decl) => self.emit_decl(arena, decl),
            Stmt::Expr(id) => {
                let is_assign = matches!(
                    arena.get(*id).kind,
                    NodeKind::Operator(op) if op.is_assignment()
                );
                self.emit_expr(arena, *id)?;
                if !is_assign {
                    // A bare expression statement's value is never consumed;
                    // free the register so the counter returns to baseline.
                    self.take_reg();
                }
                Ok(())
            }
            Stmt::If { cond, then_body, else_body } => self.emit_if(arena, *cond, then_body, else_body.as_deref()),
            Stmt::While { cond, body } => self.emit_while(arena, *cond, body),
            Stmt::DoWhile { body, cond } => self.emit_do_while(arena, body, *cond),
            Stmt::Return(expr) => self.emit_return(arena, *expr),
            Stmt::Block(stmts) => {
                self.scopes.push();
                for s in stmts {
                    self.emit_stmt(arena, s)?;
                }
                self.scopes.pop();
                Ok(())
            }
        }
    }

    fn emit_condition_test(&mut self, arena: &Arena, cond: NodeId) -> Result<(), CompileError> {
        self.emit_expr(arena, cond)?;
        let v = self.take_reg();
        self.emit_instr("cmprd", &[Self::reg(v), "0".to_string()]);
        Ok(())
    }

    fn emit_if(
        &mut self,
        arena: &Arena,
        cond: NodeId,
        then_body: &Stmt,
        else_body: Option<&Stmt>,
    ) -> Result<(), CompileError> {
        self.emit_condition_test(arena, cond)?;
        match else_body {
            None => {
                let end = self.alloc_label();
                self.emit_instr("jmpeq", &[end.clone()]);
                self.emit_stmt(arena, then_body)?;
                self.emit_label(&end);
            }
            Some(else_stmt) => {
                let else_label = self.alloc_label();
                let end = self.alloc_label();
                self.emit_instr("jmpeq", &[else_label.clone()]);
                self.emit_stmt(arena, then_body)?;
                self.emit_instr("jmpal", &[end.clone()]);
                self.emit_label(&else_label);
                self.emit_stmt(arena, else_stmt)?;
                self.emit_label(&end);
            }
        }
        Ok(())
    }

    fn emit_while(&mut self, arena: &Arena, cond: NodeId, body: &Stmt) -> Result<(), CompileError> {
        let head = self.alloc_label();
        self.emit_label(&head);
        self.emit_condition_test(arena, cond)?;
        let exit = self.alloc_label();
        self.emit_instr("jmpeq", &[exit.clone()]);
        self.emit_stmt(arena, body)?;
        self.emit_instr("jmpal", &[head]);
        self.emit_label(&exit);
        Ok(())
    }

    /// `do body while (cond);` — body runs once unconditionally, then the
    /// back-edge is taken for as long as `cond` holds (§4.1.8).
    fn emit_do_while(&mut self, arena: &Arena, body: &Stmt, cond: NodeId) -> Result<(), CompileError> {
        let head = self.alloc_label();
        self.emit_label(&head);
        self.emit_stmt(arena, body)?;
        self.emit_condition_test(arena, cond)?;
        let exit = self.alloc_label();
        self.emit_instr("jmpeq", &[exit.clone()]);
        self.emit_instr("jmpal", &[head]);
        self.emit_label(&exit);
        Ok(())
    }

    fn emit_return(&mut self, arena: &Arena, expr: Option<NodeId>) -> Result<(), CompileError> {
        if let Some(id) = expr {
            self.emit_expr(arena, id)?;
            let v = self.take_reg();
            self.emit_instr("movrr", &["r0".to_string(), Self::reg(v)]);
        }
        self.emit_instr("leave", &[]);
        Ok(())
    }

    // -- expressions (§4.1.2, §4.1.3, §4.1.4) ------------------------------

    fn emit_expr(&mut self, arena: &Arena, id: NodeId) -> Result<(), CompileError> {
        let node = arena.get(id);
        match node.kind {
            NodeKind::LeafToken => self.emit_leaf(arena, id),
            NodeKind::Call => self.emit_call(arena, id),
            NodeKind::Index => self.emit_index_rvalue(arena, id),
            NodeKind::Member => self.emit_member_rvalue(arena, id),
            NodeKind::Operator(op) if op.is_assignment() => {
                let left = node.left().expect("assign has a left child");
                let right = node.right().expect("assign has a right child");
                self.emit_assign(arena, left, right)
            }
            NodeKind::Operator(op) if op.is_unary() => self.emit_unary(arena, id, op),
            NodeKind::Operator(op) => self.emit_binary(arena, id, op),
        }
    }

    fn emit_leaf(&mut self, arena: &Arena, id: NodeId) -> Result<(), CompileError> {
        let token = &arena.get(id).token;
        match token.kind {
            TokenKind::Number => {
                let reg = self.alloc_reg();
                if token.lexeme.contains('.') {
                    self.emit_instr("movrf", &[Self::reg(reg), token.lexeme.clone()]);
                } else {
                    self.emit_instr("movrn", &[Self::reg(reg), token.lexeme.clone()]);
                }
                Ok(())
            }
            TokenKind::Identifier => {
                if !self.scopes.is_declared(&token.lexeme) {
                    return Err(CompileError::undeclared(token));
                }
                let reg = self.alloc_reg();
                self.emit_instr("loadr", &[Self::reg(reg), token.lexeme.clone()]);
                Ok(())
            }
            _ => Err(CompileError::unexpected(token)),
        }
    }

    fn emit_call(&mut self, arena: &Arena, id: NodeId) -> Result<(), CompileError> {
        let node = arena.get(id);
        let callee = node.left().expect("call has a callee");
        let callee_token = arena.get(callee).token.clone();
        if !self.scopes.is_declared(&callee_token.lexeme) {
            return Err(CompileError::undeclared(&callee_token));
        }
        // Pushed right-to-left: the callee's prologue `poprr`s its
        // parameters in left-to-right declaration order, and the stack is
        // LIFO, so the last argument pushed must be the first one popped.
        for &arg in node.children[1..].iter().rev() {
            self.emit_expr(arena, arg)?;
            let v = self.take_reg();
            self.emit_instr("pushr", &[Self::reg(v)]);
        }
        self.emit_instr("callf", &[callee_token.lexeme.clone()]);
        let reg = self.alloc_reg();
        self.emit_instr("movrr", &[Self::reg(reg), "r0".to_string()]);
        Ok(())
    }

    /// Emits `loadr base; idx; addrr; --r`, leaving the element's *address*
    /// in the top register. Shared by the rvalue and lvalue index forms.
    fn emit_index_address(&mut self, arena: &Arena, id: NodeId) -> Result<(), CompileError> {
        let node = arena.get(id);
        let base = node.left().expect("index has a base");
        let idx = node.right().expect("index has an index expression");
        let base_token = arena.get(base).token.clone();
        if base_token.kind != TokenKind::Identifier {
            return Err(CompileError::unexpected(&base_token));
        }
        if !self.scopes.is_declared(&base_token.lexeme) {
            return Err(CompileError::undeclared(&base_token));
        }
        let base_reg = self.alloc_reg();
        self.emit_instr("loadr", &[Self::reg(base_reg), base_token.lexeme]);
        self.emit_expr(arena, idx)?;
        let idx_reg = self.take_reg();
        self.emit_instr(
            "addrr",
            &[Self::reg(base_reg), Self::reg(base_reg), Self::reg(idx_reg)],
        );
        Ok(())
    }

    fn emit_index_rvalue(&mut self, arena: &Arena, id: NodeId) -> Result<(), CompileError> {
        self.emit_index_address(arena, id)?;
        let r = self.r;
        self.emit_instr("deref", &[Self::reg(r), Self::reg(r)]);
        Ok(())
    }

    /// Walks the `.` spine down to the root identifier, then back up
    /// emitting `adszr` for each member name, left-to-right (§4.1.4).
    fn emit_member_address(&mut self, arena: &Arena, id: NodeId) -> Result<(), CompileError> {
        let mut members = Vec::new();
        let mut cur = id;
        loop {
            let node = arena.get(cur);
            match node.kind {
                NodeKind::Member => {
                    let object = node.left().expect("member has an object");
                    let name_leaf = node.right().expect("member has a name");
                    members.push(arena.get(name_leaf).token.lexeme.clone());
                    cur = object;
                }
                _ => break,
            }
        }
        let root_token = arena.get(cur).token.clone();
        if root_token.kind != TokenKind::Identifier {
            return Err(CompileError::unexpected(&root_token));
        }
        if !self.scopes.is_declared(&root_token.lexeme) {
            return Err(CompileError::undeclared(&root_token));
        }
        let reg = self.alloc_reg();
        self.emit_instr("loadr", &[Self::reg(reg), root_token.lexeme]);
        for member in members.into_iter().rev() {
            self.emit_instr("adszr", &[Self::reg(reg), Self::reg(reg), member]);
        }
        Ok(())
    }

    fn emit_member_rvalue(&mut self, arena: &Arena, id: NodeId) -> Result<(), CompileError> {
        self.emit_member_address(arena, id)?;
        let r = self.r;
        self.emit_instr("deref", &[Self::reg(r), Self::reg(r)]);
        Ok(())
    }

    fn emit_unary(&mut self, arena: &Arena, id: NodeId, op: OperatorType) -> Result<(), CompileError> {
        let node = arena.get(id);
        let child = node.left().expect("unary operator has one child");
        match op {
            OperatorType::Ref => {
                let token = arena.get(child).token.clone();
                if token.kind != TokenKind::Identifier {
                    return Err(CompileError::unexpected(&token));
                }
                if !self.scopes.is_declared(&token.lexeme) {
                    return Err(CompileError::undeclared(&token));
                }
                let reg = self.alloc_reg();
                self.emit_instr("refsv", &[Self::reg(reg), token.lexeme]);
                Ok(())
            }
            OperatorType::Deref => {
                self.emit_expr(arena, child)?;
                let r = self.r;
                self.emit_instr("deref", &[Self::reg(r), Self::reg(r)]);
                Ok(())
            }
            OperatorType::Neg => {
                self.emit_expr(arena, child)?;
                let r = self.r;
                self.emit_instr("negrr", &[Self::reg(r), Self::reg(r)]);
                Ok(())
            }
            OperatorType::Not => Err(CompileError::unexpected(&node.token)),
            _ => unreachable!("emit_unary called on a non-unary operator"),
        }
    }

    fn emit_binary(&mut self, arena: &Arena, id: NodeId, op: OperatorType) -> Result<(), CompileError> {
        let node = arena.get(id);
        let left = node.left().expect("binary operator has a left child");
        let right = node.right().expect("binary operator has a right child");
        self.emit_expr(arena, left)?;
        self.emit_expr(arena, right)?;
        let opcode = match op {
            OperatorType::Add => "addrr",
            OperatorType::Sub => "subrr",
            OperatorType::Mul => "mulrr",
            OperatorType::Div => "divrr",
            OperatorType::Mod => "modrr",
            OperatorType::L => "lesrr",
            OperatorType::G => "grerr",
            OperatorType::Le => "leqrr",
            OperatorType::Ge => "geqrr",
            OperatorType::Eq => "equrr",
            OperatorType::Ne => "nequrr",
            OperatorType::And | OperatorType::Or => return Err(CompileError::unexpected(&node.token)),
            _ => unreachable!("emit_binary called on a non-binary operator"),
        };
        let r = self.r;
        self.emit_instr(opcode, &[Self::reg(r - 1), Self::reg(r - 1), Self::reg(r)]);
        self.r -= 1;
        Ok(())
    }

    fn emit_assign(&mut self, arena: &Arena, left: NodeId, right: NodeId) -> Result<(), CompileError> {
        let left_node = arena.get(left);
        match left_node.kind {
            NodeKind::LeafToken if left_node.token.kind == TokenKind::Identifier => {
                let name = left_node.token.lexeme.clone();
                if !self.scopes.is_declared(&name) {
                    return Err(CompileError::undeclared(&left_node.token));
                }
                self.emit_expr(arena, right)?;
                let v = self.take_reg();
                self.emit_instr("saver", &[name, Self::reg(v)]);
                Ok(())
            }
            NodeKind::Index => {
                self.emit_index_address(arena, left)?;
                self.emit_expr(arena, right)?;
                let rv = self.r;
                let addr = rv - 1;
                self.emit_instr("savea", &[Self::reg(addr), Self::reg(rv)]);
                self.r -= 2;
                Ok(())
            }
            NodeKind::Member => {
                self.emit_member_address(arena, left)?;
                self.emit_expr(arena, right)?;
                let rv = self.r;
                let addr = rv - 1;
                self.emit_instr("savea", &[Self::reg(addr), Self::reg(rv)]);
                self.r -= 2;
                Ok(())
            }
            NodeKind::Operator(OperatorType::Deref) => {
                self.emit_deref_chain_address(arena, left)?;
                self.emit_expr(arena, right)?;
                let rv = self.r;
                let addr = rv - 1;
                self.emit_instr("savea", &[Self::reg(addr), Self::reg(rv)]);
                self.r -= 2;
                Ok(())
            }
            _ => Err(CompileError::unexpected(&left_node.token)),
        }
    }

    /// `*…*v` as an lvalue: load the innermost variable, then `deref` once
    /// per additional `*` beyond the outermost (§4.1.4).
    fn emit_deref_chain_address(&mut self, arena: &Arena, id: NodeId) -> Result<(), CompileError> {
        let mut depth = 0usize;
        let mut cur = id;
        loop {
            let node = arena.get(cur);
            match node.kind {
                NodeKind::Operator(OperatorType::Deref) => {
                    depth += 1;
                    cur = node.left().expect("deref has a child");
                }
                _ => break,
            }
        }
        let token = arena.get(cur).token.clone();
        if token.kind != TokenKind::Identifier {
            return Err(CompileError::unexpected(&token));
        }
        if !self.scopes.is_declared(&token.lexeme) {
            return Err(CompileError::undeclared(&token));
        }
        let reg = self.alloc_reg();
        self.emit_instr("loadr", &[Self::reg(reg), token.lexeme]);
        for _ in 1..depth {
            self.emit_instr("deref", &[Self::reg(reg), Self::reg(reg)]);
        }
        Ok(())
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

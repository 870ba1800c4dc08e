//! Recursive-descent, precedence-climbing parser (§4.2's grammar).
//!
//! On a malformed construct the parser records a [`ParseError`], skips one
//! token, and keeps going so a single run surfaces more than one mistake —
//! the same "skip one token and resynchronize" policy the lexer uses for
//! bad characters.

use crate::ast::*;
use crate::lexer::{Lexer, LexerErrorKind};
use osfl_core::{LiteralValue, SourceLocation, Token, TokenKind};

#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub location: SourceLocation,
}

pub struct Parser<'a> {
    lexer: &'a mut Lexer,
    current: Token,
    errors: Vec<ParseError>,
}

type PResult<T> = Result<T, ()>;

impl<'a> Parser<'a> {
    pub fn new(lexer: &'a mut Lexer) -> Self {
        let current = lexer.next();
        Parser {
            lexer,
            current,
            errors: Vec::new(),
        }
    }

    pub fn parse_program(mut self) -> (Program, Vec<ParseError>) {
        let mut declarations = Vec::new();
        while !self.at(TokenKind::Eof) {
            match self.parse_declaration() {
                Ok(decl) => declarations.push(decl),
                Err(()) => self.synchronize(),
            }
        }
        if let LexerErrorKind::None = self.lexer.last_error().kind {
        } else {
            let err = self.lexer.last_error();
            self.errors.push(ParseError {
                message: err.message.clone(),
                location: err.location.clone(),
            });
        }
        (Program { declarations }, self.errors)
    }

    /// *Declaration* = Frame | FuncDecl | ClassDecl | ImportDecl | VarDecl |
    /// *Statement* — `FuncDecl`/`ClassDecl`/`VarDecl`/`Statement` are all
    /// already `Stmt` variants, so only `Frame` and `Import` need their own
    /// top-level dispatch.
    fn parse_declaration(&mut self) -> PResult<Declaration> {
        match self.current.kind {
            TokenKind::Frame => Ok(Declaration::Frame(self.parse_frame()?)),
            TokenKind::Import => Ok(Declaration::Import(self.parse_import()?)),
            _ => Ok(Declaration::Item(self.parse_stmt()?)),
        }
    }

    // -- cursor helpers --------------------------------------------------

    fn at(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.current.clone();
        self.current = self.lexer.next();
        tok
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> PResult<Token> {
        if self.current.kind == kind {
            Ok(self.advance())
        } else {
            self.error(format!(
                "expected {kind} {context}, found {}",
                self.current.kind
            ));
            Err(())
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&mut self, message: String) {
        self.errors.push(ParseError {
            message,
            location: self.current.location.clone(),
        });
    }

    /// Discards tokens until the next plausible statement boundary, per
    /// the grammar's error-recovery rule.
    fn synchronize(&mut self) {
        self.advance();
        while !self.at(TokenKind::Eof) {
            if matches!(
                self.current.kind,
                TokenKind::Semicolon
                    | TokenKind::Frame
                    | TokenKind::Import
                    | TokenKind::Func
                    | TokenKind::Var
                    | TokenKind::Const
                    | TokenKind::Class
                    | TokenKind::If
                    | TokenKind::While
                    | TokenKind::For
                    | TokenKind::Return
                    | TokenKind::RBrace
            ) {
                return;
            }
            self.advance();
        }
    }

    // -- top level --------------------------------------------------------

    fn parse_frame(&mut self) -> PResult<FrameDecl> {
        let location = self.current.location.clone();
        self.expect(TokenKind::Frame, "to start a frame declaration")?;
        let name = self.parse_identifier_name()?;
        let body = self.parse_block()?;
        Ok(FrameDecl { name, body, location })
    }

    /// `import` Id (`.` Id)* `;`? — no `from`/`as` clauses; the grammar's
    /// keyword table has no tokens for them.
    fn parse_import(&mut self) -> PResult<ImportDecl> {
        let location = self.advance().location; // `import`
        let mut path = vec![self.parse_identifier_name()?];
        while self.eat(TokenKind::Dot) {
            path.push(self.parse_identifier_name()?);
        }
        self.eat(TokenKind::Semicolon);
        Ok(ImportDecl { path, location })
    }

    fn parse_identifier_name(&mut self) -> PResult<String> {
        let tok = self.expect(TokenKind::Identifier, "as a name")?;
        Ok(tok.lexeme)
    }

    fn parse_param_list(&mut self) -> PResult<Vec<String>> {
        self.expect(TokenKind::LParen, "before parameter list")?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                params.push(self.parse_identifier_name()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "after parameter list")?;
        Ok(params)
    }

    fn parse_block(&mut self) -> PResult<Block> {
        self.expect(TokenKind::LBrace, "to start a block")?;
        let mut statements = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            match self.parse_stmt() {
                Ok(stmt) => statements.push(stmt),
                Err(()) => self.synchronize(),
            }
        }
        self.expect(TokenKind::RBrace, "to close a block")?;
        Ok(Block { statements })
    }

    // -- statements --------------------------------------------------------

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let stmt = match self.current.kind {
            TokenKind::Var => Stmt::VarDecl(self.parse_var_decl()?),
            TokenKind::Const => Stmt::ConstDecl(self.parse_const_decl()?),
            TokenKind::Func => Stmt::FuncDecl(self.parse_func_decl()?),
            TokenKind::Class => Stmt::ClassDecl(self.parse_class_decl()?),
            TokenKind::If => Stmt::If(self.parse_if()?),
            TokenKind::While => Stmt::While(self.parse_while()?),
            TokenKind::For => Stmt::For(self.parse_for()?),
            TokenKind::Return => Stmt::Return(self.parse_return()?),
            TokenKind::Try => Stmt::TryCatch(self.parse_try_catch()?),
            TokenKind::OnError => Stmt::OnError(self.parse_on_error()?),
            TokenKind::Break => {
                let loc = self.advance().location;
                self.eat(TokenKind::Semicolon);
                Stmt::Break(loc)
            }
            TokenKind::Continue => {
                let loc = self.advance().location;
                self.eat(TokenKind::Semicolon);
                Stmt::Continue(loc)
            }
            TokenKind::LBrace => Stmt::Block(self.parse_block()?),
            _ => {
                let expr = self.parse_expr()?;
                self.eat(TokenKind::Semicolon);
                Stmt::ExprStmt(expr)
            }
        };
        Ok(stmt)
    }

    fn parse_var_decl(&mut self) -> PResult<VarDecl> {
        let location = self.advance().location; // `var`
        let name = self.parse_identifier_name()?;
        let init = if self.eat(TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.eat(TokenKind::Semicolon);
        Ok(VarDecl { name, init, location })
    }

    fn parse_const_decl(&mut self) -> PResult<ConstDecl> {
        let location = self.advance().location; // `const`
        let name = self.parse_identifier_name()?;
        self.expect(TokenKind::Eq, "in const declaration")?;
        let init = self.parse_expr()?;
        self.eat(TokenKind::Semicolon);
        Ok(ConstDecl { name, init, location })
    }

    fn parse_func_decl(&mut self) -> PResult<FuncDecl> {
        let location = self.advance().location; // `func`
        let name = self.parse_identifier_name()?;
        let params = self.parse_param_list()?;
        let body = self.parse_block()?;
        Ok(FuncDecl {
            name,
            params,
            body,
            location,
        })
    }

    fn parse_class_decl(&mut self) -> PResult<ClassDecl> {
        let location = self.advance().location; // `class`
        let name = self.parse_identifier_name()?;
        self.expect(TokenKind::LBrace, "to start a class body")?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            if self.at(TokenKind::Func) {
                methods.push(self.parse_func_decl()?);
            } else {
                fields.push(self.parse_identifier_name()?);
                self.eat(TokenKind::Semicolon);
            }
        }
        self.expect(TokenKind::RBrace, "to close a class body")?;
        Ok(ClassDecl {
            name,
            fields,
            methods,
            location,
        })
    }

    fn parse_if(&mut self) -> PResult<IfStmt> {
        let location = self.advance().location; // `if`
        self.expect(TokenKind::LParen, "after if")?;
        let condition = self.parse_expr()?;
        self.expect(TokenKind::RParen, "after if condition")?;
        let then_branch = self.parse_block()?;
        let mut elif_branches = Vec::new();
        while self.at(TokenKind::Elif) {
            self.advance();
            self.expect(TokenKind::LParen, "after elif")?;
            let cond = self.parse_expr()?;
            self.expect(TokenKind::RParen, "after elif condition")?;
            let block = self.parse_block()?;
            elif_branches.push((cond, block));
        }
        let else_branch = if self.eat(TokenKind::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(IfStmt {
            condition,
            then_branch,
            elif_branches,
            else_branch,
            location,
        })
    }

    fn parse_while(&mut self) -> PResult<WhileStmt> {
        let location = self.advance().location; // `while`
        self.expect(TokenKind::LParen, "after while")?;
        let condition = self.parse_expr()?;
        self.expect(TokenKind::RParen, "after while condition")?;
        let body = self.parse_block()?;
        Ok(WhileStmt {
            condition,
            body,
            location,
        })
    }

    fn parse_for(&mut self) -> PResult<ForStmt> {
        let location = self.advance().location; // `for`
        self.expect(TokenKind::LParen, "after for")?;
        let binding = self.parse_identifier_name()?;
        self.expect(TokenKind::In, "in for-loop header")?;
        let iterable = self.parse_expr()?;
        self.expect(TokenKind::RParen, "after for header")?;
        let body = self.parse_block()?;
        Ok(ForStmt {
            binding,
            iterable,
            body,
            location,
        })
    }

    fn parse_return(&mut self) -> PResult<ReturnStmt> {
        let location = self.advance().location; // `return`
        let value = if self.at(TokenKind::Semicolon) || self.at(TokenKind::RBrace) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.eat(TokenKind::Semicolon);
        Ok(ReturnStmt { value, location })
    }

    fn parse_try_catch(&mut self) -> PResult<TryCatchStmt> {
        let location = self.advance().location; // `try`
        let try_block = self.parse_block()?;
        self.expect(TokenKind::Catch, "to match try")?;
        let catch_binding = if self.eat(TokenKind::LParen) {
            let name = self.parse_identifier_name()?;
            self.expect(TokenKind::RParen, "after catch binding")?;
            Some(name)
        } else {
            None
        };
        let catch_block = self.parse_block()?;
        Ok(TryCatchStmt {
            try_block,
            catch_binding,
            catch_block,
            location,
        })
    }

    fn parse_on_error(&mut self) -> PResult<OnErrorStmt> {
        let location = self.advance().location; // `on_error`
        let body = self.parse_block()?;
        let handler = if self.eat(TokenKind::Retry) {
            let tok = self.expect(TokenKind::Integer, "retry count")?;
            let count = match tok.value {
                Some(LiteralValue::Int(n)) if n >= 0 => n as u32,
                _ => {
                    self.error("retry count must be a non-negative integer".to_string());
                    0
                }
            };
            OnErrorHandler::Retry(count)
        } else {
            self.expect(TokenKind::Reset, "after on_error block")?;
            OnErrorHandler::Reset(self.parse_block()?)
        };
        Ok(OnErrorStmt {
            body,
            handler,
            location,
        })
    }

    // -- expressions: precedence climbing ----------------------------------

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        let expr = self.parse_or()?;
        if self.at(TokenKind::Eq) {
            let location = self.advance().location;
            let value = self.parse_assignment()?;
            if !matches!(expr, Expr::Identifier(..) | Expr::Index { .. } | Expr::Member { .. }) {
                self.error("left-hand side of assignment must be a variable, index or member".to_string());
                return Err(());
            }
            return Ok(Expr::Assign {
                target: Box::new(expr),
                value: Box::new(value),
                location,
            });
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_and()?;
        while self.at(TokenKind::PipePipe) {
            let location = self.advance().location;
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bitor()?;
        while self.at(TokenKind::AmpAmp) {
            let location = self.advance().location;
            let right = self.parse_bitor()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }
        Ok(left)
    }

    fn parse_bitor(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bitxor()?;
        while self.at(TokenKind::Pipe) {
            let location = self.advance().location;
            let right = self.parse_bitxor()?;
            left = Expr::Binary {
                op: BinaryOp::BitOr,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }
        Ok(left)
    }

    fn parse_bitxor(&mut self) -> PResult<Expr> {
        let mut left = self.parse_bitand()?;
        while self.at(TokenKind::Caret) {
            let location = self.advance().location;
            let right = self.parse_bitand()?;
            left = Expr::Binary {
                op: BinaryOp::BitXor,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }
        Ok(left)
    }

    fn parse_bitand(&mut self) -> PResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.at(TokenKind::Amp) {
            let location = self.advance().location;
            let right = self.parse_equality()?;
            left = Expr::Binary {
                op: BinaryOp::BitAnd,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.current.kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Neq,
                _ => break,
            };
            let location = self.advance().location;
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let mut left = self.parse_shift()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Less => BinaryOp::Lt,
                TokenKind::Greater => BinaryOp::Gt,
                TokenKind::LessEq => BinaryOp::Le,
                TokenKind::GreaterEq => BinaryOp::Ge,
                _ => break,
            };
            let location = self.advance().location;
            let right = self.parse_shift()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current.kind {
                TokenKind::ShiftLeft => BinaryOp::Shl,
                TokenKind::ShiftRight => BinaryOp::Shr,
                _ => break,
            };
            let location = self.advance().location;
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let location = self.advance().location;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.parse_power()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let location = self.advance().location;
            let right = self.parse_power()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> PResult<Expr> {
        let left = self.parse_unary()?;
        if self.at(TokenKind::StarStar) {
            let location = self.advance().location;
            let right = self.parse_power()?; // right-associative
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(left),
                right: Box::new(right),
                location,
            });
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.current.kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            let location = self.advance().location;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                location,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current.kind {
                TokenKind::LParen => {
                    let location = self.advance().location;
                    let mut args = Vec::new();
                    if !self.at(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, "after call arguments")?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        location,
                    };
                }
                TokenKind::LBracket => {
                    let location = self.advance().location;
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket, "after index expression")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        location,
                    };
                }
                TokenKind::Dot => {
                    let location = self.advance().location;
                    let property = self.parse_identifier_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        location,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let location = self.current.location.clone();
        match self.current.kind {
            TokenKind::Integer => {
                let tok = self.advance();
                let n = match tok.value {
                    Some(LiteralValue::Int(n)) => n,
                    _ => 0,
                };
                Ok(Expr::Literal(LiteralNode::Int(n), location))
            }
            TokenKind::Float => {
                let tok = self.advance();
                let x = match tok.value {
                    Some(LiteralValue::Float(x)) => x,
                    _ => 0.0,
                };
                Ok(Expr::Literal(LiteralNode::Float(x), location))
            }
            TokenKind::Boolean => {
                let tok = self.advance();
                let b = matches!(tok.value, Some(LiteralValue::Bool(true)));
                Ok(Expr::Literal(LiteralNode::Bool(b), location))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Literal(LiteralNode::Null, location))
            }
            TokenKind::Docstring => {
                let tok = self.advance();
                let text = match tok.value {
                    Some(LiteralValue::Str(s)) => s,
                    _ => String::new(),
                };
                Ok(Expr::Literal(LiteralNode::Str(text), location))
            }
            TokenKind::Regex => {
                let tok = self.advance();
                let text = match tok.value {
                    Some(LiteralValue::Str(s)) => s,
                    _ => String::new(),
                };
                Ok(Expr::Literal(LiteralNode::Str(text), location))
            }
            TokenKind::String => self.parse_string_or_interpolation(),
            TokenKind::Identifier => {
                let tok = self.advance();
                Ok(Expr::Identifier(tok.lexeme, location))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen, "to close a parenthesized expression")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                if !self.at(TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket, "to close a list literal")?;
                Ok(Expr::ListLiteral(items, location))
            }
            other => {
                self.error(format!("unexpected token {other} in expression"));
                Err(())
            }
        }
    }

    /// A `String` token starts a (possibly interpolated) string literal.
    /// A plain string is just one `Text` part; `"a${b}c"` arrives from the
    /// lexer as `String("a") InterpolationStart Identifier(b)
    /// InterpolationEnd String("c")`.
    fn parse_string_or_interpolation(&mut self) -> PResult<Expr> {
        let location = self.current.location.clone();
        let first = self.advance();
        let first_text = match first.value {
            Some(LiteralValue::Str(s)) => s,
            _ => String::new(),
        };
        if !self.at(TokenKind::InterpolationStart) {
            return Ok(Expr::Literal(LiteralNode::Str(first_text), location));
        }
        let mut parts = vec![InterpPart::Text(first_text)];
        while self.eat(TokenKind::InterpolationStart) {
            let expr = self.parse_expr()?;
            self.expect(TokenKind::InterpolationEnd, "to close string interpolation")?;
            parts.push(InterpPart::Expr(Box::new(expr)));
            let text_tok = self.expect(TokenKind::String, "after interpolated expression")?;
            let text = match text_tok.value {
                Some(LiteralValue::Str(s)) => s,
                _ => String::new(),
            };
            parts.push(InterpPart::Text(text));
        }
        Ok(Expr::Interpolation(parts, location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::LexerConfig;

    fn parse(src: &str) -> (Program, Vec<ParseError>) {
        let mut lexer = Lexer::new(src.as_bytes(), LexerConfig::default());
        Parser::new(&mut lexer).parse_program()
    }

    fn frame_body(program: &Program, index: usize) -> &Block {
        let Declaration::Frame(frame) = &program.declarations[index] else {
            panic!("expected a frame declaration");
        };
        &frame.body
    }

    #[test]
    fn parses_an_empty_frame() {
        let (program, errors) = parse("frame main {}");
        assert!(errors.is_empty());
        assert_eq!(program.declarations.len(), 1);
        let Declaration::Frame(frame) = &program.declarations[0] else {
            panic!("expected a frame declaration");
        };
        assert_eq!(frame.name, "main");
    }

    #[test]
    fn frame_takes_no_parameter_list() {
        // Scenario 4: a bare `frame Main { ... }` with no parens.
        let (program, errors) = parse("frame Main { var x = 42; }");
        assert!(errors.is_empty());
        let Stmt::VarDecl(decl) = &frame_body(&program, 0).statements[0] else {
            panic!("expected var decl");
        };
        assert_eq!(decl.name, "x");
        assert!(matches!(decl.init, Some(Expr::Literal(LiteralNode::Int(42), _))));
    }

    #[test]
    fn bare_top_level_func_decl_parses() {
        // Scenario 5.
        let (program, errors) = parse("func add(x, y) { return x + y; }");
        assert!(errors.is_empty());
        let Declaration::Item(Stmt::FuncDecl(decl)) = &program.declarations[0] else {
            panic!("expected a top-level func decl");
        };
        assert_eq!(decl.name, "add");
        assert_eq!(decl.params, vec!["x".to_string(), "y".to_string()]);
        assert!(matches!(
            decl.body.statements[0],
            Stmt::Return(ReturnStmt { value: Some(Expr::Binary { op: BinaryOp::Add, .. }), .. })
        ));
    }

    #[test]
    fn nested_main_inside_frame_main_parses() {
        // Scenario 6.
        let (program, errors) = parse("frame Main { func main() { print(1 + 2); } }");
        assert!(errors.is_empty());
        let Stmt::FuncDecl(main_fn) = &frame_body(&program, 0).statements[0] else {
            panic!("expected a nested func decl");
        };
        assert_eq!(main_fn.name, "main");
    }

    #[test]
    fn import_decl_parses_a_dotted_path() {
        let (program, errors) = parse("import a.b.c;");
        assert!(errors.is_empty());
        let Declaration::Import(import) = &program.declarations[0] else {
            panic!("expected an import declaration");
        };
        assert_eq!(import.path, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn parses_var_decl_with_binary_expr() {
        let (program, errors) = parse("frame main { var x = 1 + 2 * 3; }");
        assert!(errors.is_empty());
        let Stmt::VarDecl(decl) = &frame_body(&program, 0).statements[0] else {
            panic!("expected var decl");
        };
        assert_eq!(decl.name, "x");
        assert!(matches!(decl.init, Some(Expr::Binary { op: BinaryOp::Add, .. })));
    }

    #[test]
    fn if_with_no_else_has_empty_elif_and_else() {
        let (program, errors) = parse("frame main { if (1) { return 1; } }");
        assert!(errors.is_empty());
        let Stmt::If(if_stmt) = &frame_body(&program, 0).statements[0] else {
            panic!("expected if");
        };
        assert!(if_stmt.elif_branches.is_empty());
        assert!(if_stmt.else_branch.is_none());
    }

    #[test]
    fn power_is_right_associative() {
        let (program, errors) = parse("frame main { var x = 2 ** 3 ** 2; }");
        assert!(errors.is_empty());
        let Stmt::VarDecl(decl) = &frame_body(&program, 0).statements[0] else {
            panic!("expected var decl");
        };
        let Some(Expr::Binary { right, .. }) = &decl.init else {
            panic!("expected binary expr");
        };
        assert!(matches!(**right, Expr::Binary { op: BinaryOp::Pow, .. }));
    }

    #[test]
    fn call_and_index_and_member_chain() {
        let (program, errors) = parse("frame main { a.b(1)[2]; }");
        assert!(errors.is_empty());
        assert_eq!(frame_body(&program, 0).statements.len(), 1);
    }

    #[test]
    fn malformed_statement_is_recovered_and_reported() {
        let (program, errors) = parse("frame main { var ; var y = 1; }");
        assert!(!errors.is_empty());
        assert_eq!(frame_body(&program, 0).statements.len(), 1);
    }

    #[test]
    fn interpolated_string_produces_text_and_expr_parts() {
        let (program, errors) = parse(r#"frame main { var x = "a${1}b"; }"#);
        assert!(errors.is_empty());
        let Stmt::VarDecl(decl) = &frame_body(&program, 0).statements[0] else {
            panic!("expected var decl");
        };
        let Some(Expr::Interpolation(parts, _)) = &decl.init else {
            panic!("expected interpolation");
        };
        assert_eq!(parts.len(), 3);
    }
}

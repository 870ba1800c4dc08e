//! osflc: the lexer, parser and register-allocating compiler stages of the
//! toolchain (§4.1-§4.3).
//!
//! # Pipeline
//!
//! [`lexer::Lexer`] turns source bytes into a [`Token`](osfl_core::Token)
//! stream; [`parser::Parser`] builds an [`ast::Program`]; [`compiler::Compiler`]
//! lowers that tree to the [`osfl_core::Bytecode`] the VM executes.

pub mod ast;
pub mod compiler;
pub mod config;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod scope;

pub use compiler::{CompiledProgram, Compiler};
pub use config::CompilerConfig;
pub use error::CompileError;
pub use lexer::{Lexer, LexerConfig, LexerError, LexerErrorKind};
pub use parser::{ParseError, Parser};

use tracing::{debug, info, instrument};

/// Runs the full front-end: source text in, compiled bytecode out. Each
/// stage is wrapped in its own `tracing` span so `-d/--debug` (§6.1) can
/// show exactly where time and errors land.
#[instrument(skip(source, config), fields(file = %config.lexer.file_name))]
pub fn compile_source(source: &[u8], config: CompilerConfig) -> Result<CompiledProgram, CompileError> {
    let program = {
        let _span = tracing::info_span!("parse").entered();
        let mut lexer = Lexer::new(source, config.lexer.clone());
        let (program, errors) = Parser::new(&mut lexer).parse_program();
        if let Some(first) = errors.first() {
            return Err(CompileError::from(first.clone()));
        }
        debug!(declarations = program.declarations.len(), "parsed program");
        program
    };

    let _span = tracing::info_span!("codegen").entered();
    let compiled = Compiler::new(config).compile(&program)?;
    info!(instructions = compiled.bytecode.len(), "compiled program");
    Ok(compiled)
}

//! Bytecode virtual machine: register-windowed call stack, object heap,
//! native function bridge and cooperative coroutine scheduler.

pub mod error;
pub mod frame;
pub mod native;
pub mod natives;
pub mod vm;

pub use error::RuntimeError;
pub use frame::{Frame, REGISTER_COUNT};
pub use native::{NativeFn, NativeRegistry, NativeResult};
pub use vm::{Vm, MAX_CALL_DEPTH, MAX_COROUTINES};

use osfl_core::{Bytecode, Value};
use tracing::{info, instrument};

/// Runs compiled bytecode with the reference native library installed,
/// returning the value `main` returned.
#[instrument(skip(bytecode))]
pub fn run_program(bytecode: Bytecode) -> Result<Value, RuntimeError> {
    let mut vm = Vm::with_standard_library(bytecode);
    let result = vm.run()?;
    info!(?result, "program finished");
    Ok(result)
}

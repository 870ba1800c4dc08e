//! The bytecode dispatch loop (§4.4): fetch-decode-execute over the flat
//! instruction stream the compiler emits, a register-windowed call stack,
//! a handler stack per frame for `try`/`catch`/`on_error`, and a small
//! pool of cooperative coroutine slots.

use crate::error::{set_runtime_error, RuntimeError};
use crate::frame::Frame;
use crate::native::NativeRegistry;
use osfl_core::{Bytecode, Opcode, SourceLocation, Value};
use tracing::{instrument, trace};

/// Call frames deep before the VM gives up on what is almost certainly
/// unbounded recursion rather than exhausting the host stack.
pub const MAX_CALL_DEPTH: usize = 1024;

/// Live coroutines a single VM instance can hold at once.
pub const MAX_COROUTINES: usize = 64;

struct Coroutine {
    call_stack: Vec<Frame>,
    pc: usize,
    done: bool,
    /// Register in the coroutine's own top frame that the next `resume`
    /// argument lands in; `None` until the coroutine has yielded once.
    resume_register: Option<u8>,
}

/// A paused caller context, pushed when `CORO_RESUME` switches the VM's
/// active call stack to a coroutine's, popped when that coroutine yields
/// or returns so execution continues where the resume left off.
struct SuspendedCaller {
    call_stack: Vec<Frame>,
    pc: usize,
    dest: u8,
}

pub struct Vm {
    bytecode: Bytecode,
    natives: NativeRegistry,
    call_stack: Vec<Frame>,
    pc: usize,
    coroutines: Vec<Option<Coroutine>>,
    /// Slot index of the coroutine currently executing, innermost last;
    /// empty while running the top-level program.
    active_coroutines: Vec<usize>,
    suspended_callers: Vec<SuspendedCaller>,
}

impl Vm {
    pub fn new(bytecode: Bytecode, natives: NativeRegistry) -> Self {
        Vm {
            bytecode,
            natives,
            call_stack: vec![Frame::new(1, 0)],
            pc: 0,
            coroutines: Vec::new(),
            active_coroutines: Vec::new(),
            suspended_callers: Vec::new(),
        }
    }

    /// Builds a VM with the reference native library (`print`, `len`,
    /// `str`, ...) already registered.
    pub fn with_standard_library(bytecode: Bytecode) -> Self {
        let mut natives = NativeRegistry::new();
        crate::natives::install(&mut natives);
        Vm::new(bytecode, natives)
    }

    #[instrument(skip(self), fields(instructions = self.bytecode.len()))]
    pub fn run(&mut self) -> Result<Value, RuntimeError> {
        loop {
            let instr_pc = self.pc;
            let instruction = *self
                .bytecode
                .instructions
                .get(instr_pc)
                .ok_or_else(|| RuntimeError::new(format!("program counter {instr_pc} ran off the end of the program"), None))?;
            self.pc += 1;
            trace!(pc = instr_pc, opcode = %instruction.opcode, "dispatch");

            let outcome = self.execute(instruction, instr_pc);
            match outcome {
                Ok(Step::Continue) => continue,
                Ok(Step::Halt) => {
                    return Ok(self.call_stack[0].registers[0].clone());
                }
                Err(message) => {
                    let location = self.bytecode.location_at(instr_pc).cloned();
                    if !self.unwind(message.clone(), location.clone()) {
                        let error = RuntimeError::new(message, location);
                        set_runtime_error(error.clone());
                        return Err(error);
                    }
                }
            }
        }
    }

    /// Searches the active call stack innermost-to-outermost for an
    /// installed handler. On a hit, truncates back to the owning frame,
    /// writes the error into its bound register and resumes at the catch
    /// address; returns `false` if nothing catches it.
    fn unwind(&mut self, message: String, location: Option<SourceLocation>) -> bool {
        for index in (0..self.call_stack.len()).rev() {
            if let Some((catch_pc, err_reg)) = self.call_stack[index].handlers.pop() {
                self.call_stack.truncate(index + 1);
                let _ = location;
                self.call_stack[index].registers[err_reg as usize] = Value::string(message);
                self.pc = catch_pc;
                return true;
            }
        }
        false
    }

    fn frame(&mut self) -> &mut Frame {
        self.call_stack.last_mut().expect("call stack is never empty while running")
    }

    fn reg(&mut self, index: i64) -> Value {
        self.frame().registers[index as usize].clone()
    }

    fn set_reg(&mut self, index: i64, value: Value) {
        self.frame().registers[index as usize] = value;
    }

    fn execute(&mut self, instruction: osfl_core::Instruction, instr_pc: usize) -> Result<Step, String> {
        use Opcode::*;
        let (op1, op2, op3, op4) = (instruction.op1, instruction.op2, instruction.op3, instruction.op4);

        match instruction.opcode {
            Nop => {}
            LoadConst => self.set_reg(op1, Value::Int(op2)),
            LoadConstFloat => self.set_reg(op1, Value::Float(f64::from_bits(op2 as u64))),
            LoadConstStr => {
                let s = self.bytecode.constant(op2 as usize).ok_or("invalid string constant index")?.to_string();
                self.set_reg(op1, Value::string(s));
            }
            LoadNull => self.set_reg(op1, Value::Null),
            Move => {
                let v = self.reg(op2);
                self.set_reg(op1, v);
            }

            Add => self.binary_arith(op1, op2, op3, |a, b| a + b, |a, b| a.checked_add(b))?,
            Sub => self.binary_arith(op1, op2, op3, |a, b| a - b, |a, b| a.checked_sub(b))?,
            Mul => self.binary_arith(op1, op2, op3, |a, b| a * b, |a, b| a.checked_mul(b))?,
            Div => self.binary_div(op1, op2, op3)?,
            Mod => self.binary_mod(op1, op2, op3)?,
            Pow => {
                let base = self.as_number(self.reg(op2))?;
                let exp = self.as_number(self.reg(op3))?;
                self.set_reg(op1, Value::Float(base.powf(exp)));
            }
            Neg => {
                let value = self.reg(op2);
                let result = match value {
                    Value::Int(i) => Value::Int(-i),
                    Value::Float(f) => Value::Float(-f),
                    other => return Err(format!("cannot negate a {}", other.type_name())),
                };
                self.set_reg(op1, result);
            }

            Eq => {
                let result = self.reg(op2) == self.reg(op3);
                self.set_reg(op1, Value::Bool(result));
            }
            Neq => {
                let result = self.reg(op2) != self.reg(op3);
                self.set_reg(op1, Value::Bool(result));
            }
            Lt => self.compare(op1, op2, op3, |o| o == std::cmp::Ordering::Less)?,
            Gt => self.compare(op1, op2, op3, |o| o == std::cmp::Ordering::Greater)?,
            Le => self.compare(op1, op2, op3, |o| o != std::cmp::Ordering::Greater)?,
            Ge => self.compare(op1, op2, op3, |o| o != std::cmp::Ordering::Less)?,

            Not => {
                let truthy = self.reg(op2).is_truthy();
                self.set_reg(op1, Value::Bool(!truthy));
            }
            BitAnd => self.binary_int(op1, op2, op3, |a, b| a & b)?,
            BitOr => self.binary_int(op1, op2, op3, |a, b| a | b)?,
            BitXor => self.binary_int(op1, op2, op3, |a, b| a ^ b)?,
            BitNot => {
                let i = self.as_int(self.reg(op2))?;
                self.set_reg(op1, Value::Int(!i));
            }
            Shl => self.binary_int(op1, op2, op3, |a, b| a.wrapping_shl(b as u32))?,
            Shr => self.binary_int(op1, op2, op3, |a, b| a.wrapping_shr(b as u32))?,

            Jump => {
                self.pc = op1 as usize;
            }
            JumpIfZero => {
                if !self.reg(op2).is_truthy() {
                    self.pc = op1 as usize;
                }
            }

            Call => self.call(op1 as usize, op2 as usize, op3, op4, instr_pc)?,
            CallNative => self.call_native(op1 as usize, op2 as usize, op3, op4)?,
            Ret => return self.ret(op1),

            Halt => return Ok(Step::Halt),

            Newobj => self.set_reg(op1, Value::object(osfl_core::VMObject::new())),
            Setprop => {
                let name = self.bytecode.constant(op2 as usize).ok_or("invalid property name constant")?.to_string();
                let value = self.reg(op3);
                match self.reg(op1) {
                    Value::Object(obj) => obj.borrow_mut().set(&name, value),
                    other => return Err(format!("cannot set a property on a {}", other.type_name())),
                }
            }
            Getprop => {
                let name = self.bytecode.constant(op3 as usize).ok_or("invalid property name constant")?.to_string();
                let value = match self.reg(op2) {
                    Value::Object(obj) => obj.borrow().get(&name).cloned().unwrap_or(Value::Null),
                    other => return Err(format!("cannot read a property from a {}", other.type_name())),
                };
                self.set_reg(op1, value);
            }

            NewList => self.set_reg(op1, Value::list(Vec::new())),
            GetIndex => {
                let index = self.as_int(self.reg(op3))?;
                let value = match self.reg(op2) {
                    Value::List(list) => {
                        let list = list.borrow();
                        let i = resolve_index(index, list.len())?;
                        list[i].clone()
                    }
                    Value::String(s) => {
                        let i = resolve_index(index, s.len())?;
                        Value::string(s.as_bytes()[i].to_string())
                    }
                    other => return Err(format!("cannot index a {}", other.type_name())),
                };
                self.set_reg(op1, value);
            }
            SetIndex => {
                let value = self.reg(op3);
                match self.reg(op1) {
                    Value::List(list) => {
                        if op2 == -1 {
                            list.borrow_mut().push(value);
                        } else {
                            let mut list = list.borrow_mut();
                            let i = resolve_index(op2, list.len())?;
                            list[i] = value;
                        }
                    }
                    other => return Err(format!("cannot index-assign into a {}", other.type_name())),
                }
            }

            PushHandler => {
                self.frame().handlers.push((op1 as usize, op2 as u8));
            }
            PopHandler => {
                self.frame().handlers.pop();
            }

            CoroInit => self.coro_init(op1, op2 as usize, op3 as usize, op4)?,
            CoroResume => self.coro_resume(op1, op2, op3 as usize, op4)?,
            CoroYield => return self.coro_yield(op1, op2),
        }
        Ok(Step::Continue)
    }

    fn binary_arith(
        &mut self,
        dest: i64,
        left: i64,
        right: i64,
        float_op: impl Fn(f64, f64) -> f64,
        int_op: impl Fn(i64, i64) -> Option<i64>,
    ) -> Result<(), String> {
        let (l, r) = (self.reg(left), self.reg(right));
        let result = match (&l, &r) {
            (Value::Int(a), Value::Int(b)) => {
                Value::Int(int_op(*a, *b).ok_or("integer overflow")?)
            }
            _ => Value::Float(float_op(self.as_number(l)?, self.as_number(r)?)),
        };
        self.set_reg(dest, result);
        Ok(())
    }

    fn binary_div(&mut self, dest: i64, left: i64, right: i64) -> Result<(), String> {
        let (l, r) = (self.reg(left), self.reg(right));
        let result = match (&l, &r) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    return Err("division by zero".to_string());
                }
                Value::Int(a / b)
            }
            _ => {
                let (a, b) = (self.as_number(l)?, self.as_number(r)?);
                Value::Float(a / b)
            }
        };
        self.set_reg(dest, result);
        Ok(())
    }

    fn binary_mod(&mut self, dest: i64, left: i64, right: i64) -> Result<(), String> {
        let (l, r) = (self.reg(left), self.reg(right));
        let result = match (&l, &r) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    return Err("division by zero".to_string());
                }
                Value::Int(a % b)
            }
            _ => {
                let (a, b) = (self.as_number(l)?, self.as_number(r)?);
                Value::Float(a % b)
            }
        };
        self.set_reg(dest, result);
        Ok(())
    }

    fn binary_int(&mut self, dest: i64, left: i64, right: i64, op: impl Fn(i64, i64) -> i64) -> Result<(), String> {
        let a = self.as_int(self.reg(left))?;
        let b = self.as_int(self.reg(right))?;
        self.set_reg(dest, Value::Int(op(a, b)));
        Ok(())
    }

    fn compare(&mut self, dest: i64, left: i64, right: i64, accept: impl Fn(std::cmp::Ordering) -> bool) -> Result<(), String> {
        let (l, r) = (self.reg(left), self.reg(right));
        let ordering = match (&l, &r) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            _ => self
                .as_number(l)?
                .partial_cmp(&self.as_number(r)?)
                .ok_or("comparison between incomparable values")?,
        };
        self.set_reg(dest, Value::Bool(accept(ordering)));
        Ok(())
    }

    fn as_number(&self, value: Value) -> Result<f64, String> {
        match value {
            Value::Int(i) => Ok(i as f64),
            Value::Float(f) => Ok(f),
            other => Err(format!("expected a number, found a {}", other.type_name())),
        }
    }

    fn as_int(&self, value: Value) -> Result<i64, String> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(format!("expected an int, found a {}", other.type_name())),
        }
    }

    fn call(&mut self, address: usize, argcount: usize, first_arg: i64, dest: i64, instr_pc: usize) -> Result<(), String> {
        let _ = instr_pc;
        let caller = self.frame();
        let start = first_arg as usize;
        let args: Vec<Value> = caller.registers[start..start + argcount].to_vec();

        if self.call_stack.len() >= MAX_CALL_DEPTH {
            return Err("call stack overflow".to_string());
        }
        let mut new_frame = Frame::new(self.pc, dest as u8);
        for (index, value) in args.into_iter().enumerate() {
            new_frame.registers[index] = value;
        }
        self.call_stack.push(new_frame);
        self.pc = address;
        Ok(())
    }

    fn call_native(&mut self, name_idx: usize, argcount: usize, first_arg: i64, dest: i64) -> Result<(), String> {
        let name = self.bytecode.constant(name_idx).ok_or("invalid native function name constant")?.to_string();
        let frame = self.frame();
        let start = first_arg as usize;
        let args: Vec<Value> = frame.registers[start..start + argcount].to_vec();
        let result = self.natives.call(&name, &args)?;
        self.set_reg(dest, result);
        Ok(())
    }

    fn ret(&mut self, value_reg: i64) -> Result<Step, String> {
        let ret_val = if value_reg == -1 { Value::Null } else { self.reg(value_reg) };
        let popped = self.call_stack.pop().expect("ret always runs inside at least one frame");

        if self.call_stack.is_empty() {
            if let Some(slot) = self.active_coroutines.pop() {
                self.coroutines[slot] = Some(Coroutine {
                    call_stack: Vec::new(),
                    pc: 0,
                    done: true,
                    resume_register: None,
                });
                let caller = self.suspended_callers.pop().expect("a coroutine always has a resuming caller");
                self.call_stack = caller.call_stack;
                self.pc = caller.pc;
                self.set_reg(caller.dest as i64, ret_val);
                return Ok(Step::Continue);
            }
            unreachable!("the top-level frame is never popped by RET, only by HALT");
        }

        self.pc = popped.return_pc;
        self.set_reg(popped.return_register as i64, ret_val);
        Ok(Step::Continue)
    }

    fn coro_init(&mut self, dest: i64, address: usize, argcount: usize, first_arg: i64) -> Result<(), String> {
        let start = first_arg as usize;
        let args: Vec<Value> = self.frame().registers[start..start + argcount].to_vec();
        let mut root = Frame::new(usize::MAX, 0);
        for (index, value) in args.into_iter().enumerate() {
            root.registers[index] = value;
        }
        let coroutine = Coroutine {
            call_stack: vec![root],
            pc: address,
            done: false,
            resume_register: None,
        };
        let slot = match self.coroutines.iter().position(Option::is_none) {
            Some(slot) => {
                self.coroutines[slot] = Some(coroutine);
                slot
            }
            None => {
                if self.coroutines.len() >= MAX_COROUTINES {
                    return Err(format!("coroutine table is full (limit {MAX_COROUTINES})"));
                }
                self.coroutines.push(Some(coroutine));
                self.coroutines.len() - 1
            }
        };
        self.set_reg(dest, Value::Int(slot as i64 + 1));
        Ok(())
    }

    fn coro_resume(&mut self, dest: i64, handle_reg: i64, argcount: usize, first_arg: i64) -> Result<(), String> {
        let handle = self.as_int(self.reg(handle_reg))?;
        let slot = handle as usize - 1;
        let mut coroutine = self
            .coroutines
            .get_mut(slot)
            .and_then(Option::take)
            .ok_or("resume of an invalid coroutine handle")?;
        if coroutine.done {
            return Err("cannot resume a finished coroutine".to_string());
        }

        let start = first_arg as usize;
        let args: Vec<Value> = self.frame().registers[start..start + argcount].to_vec();
        if let Some(reg) = coroutine.resume_register {
            if let Some(value) = args.first() {
                coroutine.call_stack.last_mut().expect("a suspended coroutine keeps at least its root frame").registers[reg as usize] = value.clone();
            }
        }

        let caller_call_stack = std::mem::replace(&mut self.call_stack, coroutine.call_stack);
        let caller_pc = std::mem::replace(&mut self.pc, coroutine.pc);
        self.suspended_callers.push(SuspendedCaller {
            call_stack: caller_call_stack,
            pc: caller_pc,
            dest: dest as u8,
        });
        self.active_coroutines.push(slot);
        Ok(())
    }

    fn coro_yield(&mut self, resume_reg: i64, value_reg: i64) -> Result<Step, String> {
        let value = self.reg(value_reg);
        let slot = self.active_coroutines.pop().ok_or("yield outside of a coroutine")?;
        self.coroutines[slot] = Some(Coroutine {
            call_stack: std::mem::take(&mut self.call_stack),
            pc: self.pc,
            done: false,
            resume_register: Some(resume_reg as u8),
        });
        let caller = self.suspended_callers.pop().expect("a running coroutine always has a suspended caller");
        self.call_stack = caller.call_stack;
        self.pc = caller.pc;
        self.set_reg(caller.dest as i64, value);
        Ok(Step::Continue)
    }
}

enum Step {
    Continue,
    Halt,
}

fn resolve_index(index: i64, len: usize) -> Result<usize, String> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved as usize >= len {
        return Err(format!("index {index} out of bounds for length {len}"));
    }
    Ok(resolved as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use osflc::{compile_source as compile, CompilerConfig};

    fn run(src: &str) -> Value {
        let compiled = compile(src.as_bytes(), CompilerConfig::default()).expect("compile should succeed");
        let mut vm = Vm::with_standard_library(compiled.bytecode);
        vm.run().expect("run should succeed")
    }

    #[test]
    fn arithmetic_and_return() {
        assert_eq!(run("frame Main { func main() { return 2 + 3 * 4; } }"), Value::Int(14));
    }

    #[test]
    fn float_promotion() {
        assert_eq!(run("frame Main { func main() { return 1 + 2.5; } }"), Value::Float(3.5));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let compiled = compile(b"frame Main { func main() { return 1 / 0; } }", CompilerConfig::default()).unwrap();
        let mut vm = Vm::with_standard_library(compiled.bytecode);
        let err = vm.run().unwrap_err();
        assert!(err.message.contains("division by zero"));
    }

    #[test]
    fn function_call_and_return_value() {
        let src = "func add(a, b) { return a + b; } frame Main { func main() { return add(3, 4); } }";
        assert_eq!(run(src), Value::Int(7));
    }

    #[test]
    fn while_loop_accumulates() {
        let src = "frame Main { func main() { var i = 0; var total = 0; while (i < 5) { total = total + i; i = i + 1; } return total; } }";
        assert_eq!(run(src), Value::Int(10));
    }

    #[test]
    fn for_loop_over_list_literal() {
        let src = "frame Main { func main() { var total = 0; for (x in [1, 2, 3]) { total = total + x; } return total; } }";
        assert_eq!(run(src), Value::Int(6));
    }

    #[test]
    fn try_catch_recovers_from_a_native_error() {
        let src = r#"frame Main { func main() { var r = 0; try { r = 1 / 0; } catch (e) { r = 9; } return r; } }"#;
        assert_eq!(run(src), Value::Int(9));
    }

    #[test]
    fn uncaught_error_propagates_out_of_nested_calls() {
        let src = "func boom() { return 1 / 0; } frame Main { func main() { return boom(); } }";
        let compiled = compile(src.as_bytes(), CompilerConfig::default()).unwrap();
        let mut vm = Vm::with_standard_library(compiled.bytecode);
        assert!(vm.run().is_err());
    }

    #[test]
    fn string_interpolation_concatenates_parts() {
        let src = r#"frame Main { func main() { var name = "world"; return "hello ${name}!"; } }"#;
        assert_eq!(run(src), Value::string("hello world!"));
    }

    #[test]
    fn list_index_and_append() {
        let src = "frame Main { func main() { var xs = [1, 2]; append(xs, 3); return xs[2]; } }";
        assert_eq!(run(src), Value::Int(3));
    }
}

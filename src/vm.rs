// File: src/vm.rs
//
// The Carblang virtual machine. Executes chunks on a value stack with call
// frames, a globals table and built-in method dispatch. Strictly
// single-threaded and non-reentrant: one instruction at a time, no
// suspension, no user-level exception handling. Any runtime error unwinds
// the whole run.

use std::io::{self, BufRead, Write};
use std::rc::Rc;

use ahash::AHashMap;

use crate::builtins::{self, MethodIo, NativeMethod};
use crate::bytecode::{Chunk, OpCode};
use crate::value::{BoundMethod, Value};

/// Saved caller state plus the base slot of the running invocation.
/// `stack_base` is the absolute stack index where the callee sat; the callee
/// slot is removed in place, so the arguments become local slots `0..argc`
/// and the returning value lands back at `stack_base`.
struct CallFrame {
    chunk: Rc<Chunk>,
    ip: usize,
    stack_base: usize,
}

pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: AHashMap<String, Value>,
    chunk: Rc<Chunk>,
    ip: usize,
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// A VM wired to real stdin/stdout
    pub fn new() -> Self {
        Self::with_io(Box::new(io::BufReader::new(io::stdin())), Box::new(io::stdout()))
    }

    /// A VM with injected script I/O; tests use this to capture output and
    /// feed `input()` deterministically.
    pub fn with_io(input: Box<dyn BufRead>, output: Box<dyn Write>) -> Self {
        Vm {
            stack: Vec::new(),
            frames: Vec::new(),
            globals: AHashMap::new(),
            chunk: Rc::new(Chunk::new()),
            ip: 0,
            input,
            output,
        }
    }

    /// Runs a compiled chunk to completion and returns the value left by the
    /// top-level return. Globals survive across calls, so a REPL can reuse
    /// one VM; the free built-ins are (re)seeded before the first
    /// instruction.
    pub fn interpret(&mut self, chunk: Chunk) -> Result<Value, String> {
        self.chunk = Rc::new(chunk);
        self.ip = 0;
        self.stack.clear();
        self.frames.clear();
        self.init_globals();
        self.run()
    }

    /// Final value of a global, mostly for tests and the REPL
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    fn init_globals(&mut self) {
        for (name, method) in NativeMethod::globals() {
            self.globals.insert(
                name.to_string(),
                Value::BoundMethod(Rc::new(BoundMethod { receiver: Value::Null, method })),
            );
        }
    }

    fn run(&mut self) -> Result<Value, String> {
        loop {
            let opcode = OpCode::try_from(self.read_byte()?)?;
            match opcode {
                OpCode::Constant => {
                    let value = self.read_constant()?;
                    self.stack.push(value);
                }

                OpCode::Null => self.stack.push(Value::Null),
                OpCode::True => self.stack.push(Value::Bool(true)),
                OpCode::False => self.stack.push(Value::Bool(false)),

                OpCode::Add | OpCode::Subtract | OpCode::Multiply | OpCode::Divide => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let result = arithmetic(opcode, a, b)?;
                    self.stack.push(result);
                }

                OpCode::Not => {
                    let value = self.pop()?;
                    self.stack.push(Value::Bool(!value.is_truthy()));
                }

                OpCode::Negate => {
                    let value = self.pop()?;
                    match value {
                        Value::Number(n) => self.stack.push(Value::Number(-n)),
                        _ => return Err("Operand must be a number".to_string()),
                    }
                }

                OpCode::Equal => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.stack.push(Value::Bool(a == b));
                }

                OpCode::Greater | OpCode::Less => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    match (a, b) {
                        (Value::Number(x), Value::Number(y)) => {
                            let result =
                                if opcode == OpCode::Greater { x > y } else { x < y };
                            self.stack.push(Value::Bool(result));
                        }
                        _ => return Err("Operands must be numbers".to_string()),
                    }
                }

                OpCode::Print | OpCode::PrintLn => {
                    let value = self.pop()?;
                    let mut text = value.stringify();
                    if opcode == OpCode::PrintLn {
                        text.push('\n');
                    }
                    self.output
                        .write_all(text.as_bytes())
                        .and_then(|_| self.output.flush())
                        .map_err(|e| format!("Failed to write output: {}", e))?;
                }

                OpCode::Pop => {
                    self.pop()?;
                }

                OpCode::DefineGlobal => {
                    let name = self.read_name()?;
                    let value = self.pop()?;
                    self.globals.insert(name, value);
                }

                OpCode::GetGlobal => {
                    let name = self.read_name()?;
                    match self.globals.get(&name) {
                        Some(value) => self.stack.push(value.clone()),
                        None => return Err(format!("Undefined variable '{}'", name)),
                    }
                }

                OpCode::SetGlobal => {
                    let name = self.read_name()?;
                    if !self.globals.contains_key(&name) {
                        return Err(format!("Undefined variable '{}'", name));
                    }
                    let value = self.peek()?.clone();
                    self.globals.insert(name, value);
                }

                OpCode::GetLocal => {
                    let slot = self.read_byte()? as usize;
                    let index = self.frame_base() + slot;
                    let value = self
                        .stack
                        .get(index)
                        .cloned()
                        .ok_or_else(|| "Local slot out of range".to_string())?;
                    self.stack.push(value);
                }

                OpCode::SetLocal => {
                    let slot = self.read_byte()? as usize;
                    let index = self.frame_base() + slot;
                    let value = self.peek()?.clone();
                    match self.stack.get_mut(index) {
                        Some(target) => *target = value,
                        None => return Err("Local slot out of range".to_string()),
                    }
                }

                OpCode::Jump => {
                    let offset = self.read_short()? as usize;
                    self.ip += offset;
                }

                OpCode::JumpIfTrue => {
                    let offset = self.read_short()? as usize;
                    let condition = self.pop()?;
                    if condition.is_truthy() {
                        self.ip += offset;
                    }
                }

                OpCode::JumpIfFalse => {
                    let offset = self.read_short()? as usize;
                    let condition = self.peek()?;
                    if !condition.is_truthy() {
                        self.ip += offset;
                    }
                }

                OpCode::Loop => {
                    let offset = self.read_short()? as usize;
                    self.ip -= offset;
                }

                OpCode::Call => {
                    let arg_count = self.read_byte()? as usize;
                    self.call_value(arg_count)?;
                }

                OpCode::Closure => {
                    let function = self.read_constant()?;
                    self.stack.push(function);
                }

                OpCode::Array => {
                    let count = self.read_byte()? as usize;
                    if self.stack.len() < count {
                        return Err("Stack underflow".to_string());
                    }
                    let elements = self.stack.split_off(self.stack.len() - count);
                    self.stack.push(Value::array(elements));
                }

                OpCode::GetIndex => {
                    let index = self.pop()?;
                    let container = self.pop()?;
                    let value = index_get(&container, &index)?;
                    self.stack.push(value);
                }

                OpCode::SetIndex => {
                    let value = self.pop()?;
                    let index = self.pop()?;
                    let container = self.pop()?;
                    index_set(&container, &index, value.clone())?;
                    self.stack.push(value);
                }

                OpCode::GetProperty => {
                    let name = self.read_name()?;
                    let receiver = self.pop()?;
                    match NativeMethod::resolve(&receiver, &name) {
                        Some(method) => self.stack.push(Value::BoundMethod(Rc::new(
                            BoundMethod { receiver, method },
                        ))),
                        None => return Err(format!("Undefined method '{}'", name)),
                    }
                }

                OpCode::Return => {
                    let result = self.pop()?;
                    match self.frames.pop() {
                        None => {
                            // Top-level return: leave the value and halt
                            self.stack.push(result.clone());
                            return Ok(result);
                        }
                        Some(frame) => {
                            self.stack.truncate(frame.stack_base);
                            self.stack.push(result);
                            self.chunk = frame.chunk;
                            self.ip = frame.ip;
                        }
                    }
                }
            }
        }
    }

    /// Dispatches `CALL argc`. The callee sits below its arguments; user
    /// functions get a frame, built-ins run to completion immediately and
    /// never push one.
    fn call_value(&mut self, arg_count: usize) -> Result<(), String> {
        if self.stack.len() < arg_count + 1 {
            return Err("Stack underflow".to_string());
        }
        let callee_index = self.stack.len() - arg_count - 1;
        let callee = self.stack[callee_index].clone();

        match callee {
            Value::Function(function) => {
                if arg_count != function.arity {
                    return Err(format!(
                        "Expected {} arguments but got {}",
                        function.arity, arg_count
                    ));
                }
                // Remove the callee slot in place; the arguments shift down
                // to become local slots 0..argc of the new frame.
                self.stack.remove(callee_index);
                self.frames.push(CallFrame {
                    chunk: Rc::clone(&self.chunk),
                    ip: self.ip,
                    stack_base: callee_index,
                });
                self.chunk = Rc::clone(&function.chunk);
                self.ip = 0;
                Ok(())
            }

            Value::BoundMethod(bound) => {
                let args = self.stack.split_off(callee_index + 1);
                self.stack.pop();
                let mut method_io =
                    MethodIo { input: &mut *self.input, output: &mut *self.output };
                let result = builtins::invoke(bound.method, &bound.receiver, &args, &mut method_io)?;
                self.stack.push(result);
                Ok(())
            }

            _ => Err("Can only call functions".to_string()),
        }
    }

    fn frame_base(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.stack_base)
    }

    fn read_byte(&mut self) -> Result<u8, String> {
        let byte = self
            .chunk
            .code
            .get(self.ip)
            .copied()
            .ok_or_else(|| "Instruction pointer out of bounds".to_string())?;
        self.ip += 1;
        Ok(byte)
    }

    fn read_short(&mut self) -> Result<u16, String> {
        let high = self.read_byte()? as u16;
        let low = self.read_byte()? as u16;
        Ok((high << 8) | low)
    }

    fn read_constant(&mut self) -> Result<Value, String> {
        let index = self.read_byte()? as usize;
        self.chunk
            .constants
            .get(index)
            .cloned()
            .ok_or_else(|| "Constant index out of bounds".to_string())
    }

    fn read_name(&mut self) -> Result<String, String> {
        match self.read_constant()? {
            Value::Str(name) => Ok(name.as_ref().clone()),
            _ => Err("Name constant must be a string".to_string()),
        }
    }

    fn pop(&mut self) -> Result<Value, String> {
        self.stack.pop().ok_or_else(|| "Stack underflow".to_string())
    }

    fn peek(&self) -> Result<&Value, String> {
        self.stack.last().ok_or_else(|| "Stack underflow".to_string())
    }
}

/// Arithmetic for ADD/SUBTRACT/MULTIPLY/DIVIDE, with the string and array
/// forms layered over plain numeric IEEE-754 semantics:
/// string + anything concatenates, array + array concatenates, string *
/// whole number repeats, and array op number maps the scalar element-wise.
fn arithmetic(op: OpCode, a: Value, b: Value) -> Result<Value, String> {
    if op == OpCode::Add {
        if matches!(a, Value::Str(_)) || matches!(b, Value::Str(_)) {
            return Ok(Value::string(a.stringify() + &b.stringify()));
        }
        if let (Value::Array(x), Value::Array(y)) = (&a, &b) {
            let mut elements = x.borrow().elements.clone();
            elements.extend(y.borrow().elements.iter().cloned());
            return Ok(Value::array(elements));
        }
    }

    if op == OpCode::Multiply {
        if let (Value::Str(s), Value::Number(n)) | (Value::Number(n), Value::Str(s)) = (&a, &b) {
            if n.trunc() != *n {
                return Err("String repetition count must be a whole number".to_string());
            }
            let count = (*n as i64).max(0) as usize;
            return Ok(Value::string(s.repeat(count)));
        }
    }

    if let (Value::Array(array), Value::Number(scalar)) = (&a, &b) {
        if op == OpCode::Divide && *scalar == 0.0 {
            return Err("Division by zero".to_string());
        }
        let mut elements = Vec::with_capacity(array.borrow().elements.len());
        for element in &array.borrow().elements {
            let Value::Number(n) = element else {
                return Err("Array elements must be numbers".to_string());
            };
            elements.push(Value::Number(apply_numeric(op, *n, *scalar)));
        }
        return Ok(Value::array(elements));
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if op == OpCode::Divide && y == 0.0 {
                return Err("Division by zero".to_string());
            }
            Ok(Value::Number(apply_numeric(op, x, y)))
        }
        _ => Err("Operands must be numbers".to_string()),
    }
}

fn apply_numeric(op: OpCode, x: f64, y: f64) -> f64 {
    match op {
        OpCode::Add => x + y,
        OpCode::Subtract => x - y,
        OpCode::Multiply => x * y,
        _ => x / y,
    }
}

fn index_get(container: &Value, index: &Value) -> Result<Value, String> {
    let Value::Number(raw) = index else {
        return Err("Index must be a number".to_string());
    };
    let index = *raw as i64;

    match container {
        Value::Array(array) => {
            let elements = &array.borrow().elements;
            if index < 0 || index >= elements.len() as i64 {
                return Err("Index out of bounds".to_string());
            }
            Ok(elements[index as usize].clone())
        }
        Value::Str(s) => {
            if index < 0 || index >= s.len() as i64 {
                return Err("Index out of bounds".to_string());
            }
            let byte = s.as_bytes()[index as usize];
            Ok(Value::string(String::from_utf8_lossy(&[byte]).into_owned()))
        }
        _ => Err("Only arrays and strings can be indexed".to_string()),
    }
}

fn index_set(container: &Value, index: &Value, value: Value) -> Result<(), String> {
    let Value::Array(array) = container else {
        return Err("Only arrays support index assignment".to_string());
    };
    let Value::Number(raw) = index else {
        return Err("Index must be a number".to_string());
    };
    let index = *raw as i64;
    let mut inner = array.borrow_mut();
    if index < 0 || index >= inner.elements.len() as i64 {
        return Err("Index out of bounds".to_string());
    }
    inner.elements[index as usize] = value;
    Ok(())
}

use std::{
    collections::{hash_map::Entry, HashMap},
    fmt::{self, Write},
    rc::Rc,
};

use crate::{
    chunk::{Chunk, ConstantId, OpCode},
    compiler::compile,
    config::Config,
    debug::{disassemble_instruction, write_value},
    memory::Memory,
    string_intern::StrId,
    value::{FunctionId, Value},
};

const MAX_FRAMES: usize = 64;

pub fn interpret(source: &str, config: Config) -> InterpretResult {
    match compile(Rc::from(source), config) {
        Some(mut vm) => vm.run(),
        None => InterpretResult::CompileError,
    }
}

pub struct VM {
    pub config: Config,
    pub frames: Vec<CallFrame>,
    pub stack: Vec<Value>,
    pub globals: HashMap<StrId, Value>,
    pub memory: Memory,
    pub script: FunctionId,
}

impl VM {
    pub fn new(memory: Memory, script: FunctionId, config: Config) -> Self {
        Self {
            config,
            frames: vec![CallFrame {
                function: script,
                ip: InstructionPointer(0),
                slot_start: 0,
            }],
            stack: Vec::new(),
            globals: HashMap::new(),
            memory,
            script,
        }
    }

    fn read_byte(&mut self) -> u8 {
        let byte = self.chunk().byte(self.frame().ip.0);
        self.frame_mut().ip.increment(1);
        byte
    }

    fn read_short(&mut self) -> usize {
        let hi = self.read_byte() as usize;
        let lo = self.read_byte() as usize;
        (hi << 8) | lo
    }

    fn read_constant(&mut self) -> Value {
        let constant = ConstantId(self.read_byte() as usize);
        self.chunk().constant(constant)
    }

    fn binary_op<F: Fn(f64, f64) -> Value>(&mut self, f: F) -> bool {
        let b = self.pop();
        let a = self.pop();

        match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => {
                self.push(f(a, b));
                true
            }
            _ => {
                self.runtime_error("Operands must be numbers.");
                false
            }
        }
    }

    pub fn run(&mut self) -> InterpretResult {
        loop {
            if log::log_enabled!(log::Level::Trace) {
                let mut trace = String::new();
                for value in self.stack.iter() {
                    let _ = write!(trace, "[ ");
                    write_value(value, &self.memory, &mut trace);
                    let _ = write!(trace, " ]");
                }
                let _ = write!(trace, " @ ");
                disassemble_instruction(self.chunk(), self.frame().ip.0, &self.memory, &mut trace);
                log::trace!("{}", trace.trim_end());
            }

            let op = match OpCode::try_from(self.read_byte()) {
                Ok(op) => op,
                Err(err) => {
                    self.runtime_error(&err.to_string());
                    return InterpretResult::RuntimeError;
                }
            };

            match op {
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().unwrap();
                    if self.frames.is_empty() {
                        return InterpretResult::Ok(result);
                    }

                    // Drop the arguments and the callee itself.
                    self.stack.truncate(frame.slot_start - 1);
                    self.push(result);
                }

                OpCode::Pop => {
                    self.pop();
                }

                OpCode::Constant => {
                    let constant = self.read_constant();
                    self.push(constant);
                }

                OpCode::Null => self.push(Value::Null),

                OpCode::True => self.push(Value::Bool(true)),

                OpCode::False => self.push(Value::Bool(false)),

                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }

                OpCode::Greater => {
                    if !self.binary_op(|a, b| Value::Bool(a > b)) {
                        return InterpretResult::RuntimeError;
                    }
                }

                OpCode::Less => {
                    if !self.binary_op(|a, b| Value::Bool(a < b)) {
                        return InterpretResult::RuntimeError;
                    }
                }

                OpCode::Add => {
                    let b = self.pop();
                    let a = self.pop();

                    match (&a, &b) {
                        (Value::Number(a), Value::Number(b)) => self.push(Value::Number(a + b)),
                        (Value::String(a), Value::String(b)) => {
                            let concat =
                                format!("{}{}", self.memory.get_string(*a), self.memory.get_string(*b));
                            let id = self.memory.intern(&concat);
                            self.push(Value::String(id));
                        }
                        _ => {
                            self.runtime_error("Operands must be strings or numbers.");
                            return InterpretResult::RuntimeError;
                        }
                    }
                }

                OpCode::Subtract => {
                    if !self.binary_op(|a, b| Value::Number(a - b)) {
                        return InterpretResult::RuntimeError;
                    }
                }

                OpCode::Multiply => {
                    if !self.binary_op(|a, b| Value::Number(a * b)) {
                        return InterpretResult::RuntimeError;
                    }
                }

                OpCode::Divide => {
                    if !self.binary_op(|a, b| Value::Number(a / b)) {
                        return InterpretResult::RuntimeError;
                    }
                }

                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(is_falsey(&value)));
                }

                OpCode::Negate => {
                    let value = self.pop();

                    match value {
                        Value::Number(n) => self.push(Value::Number(-n)),
                        _ => {
                            self.runtime_error("Operand must be a number.");
                            return InterpretResult::RuntimeError;
                        }
                    }
                }

                OpCode::DefineGlobal => {
                    let Some(name) = self.read_constant().as_string() else {
                        self.runtime_error("Global name must be a string constant.");
                        return InterpretResult::RuntimeError;
                    };
                    let value = self.pop();
                    self.globals.insert(name, value);
                }

                OpCode::GetGlobal => {
                    let Some(name) = self.read_constant().as_string() else {
                        self.runtime_error("Global name must be a string constant.");
                        return InterpretResult::RuntimeError;
                    };
                    match self.globals.get(&name) {
                        Some(value) => {
                            let value = value.clone();
                            self.push(value);
                        }
                        None => {
                            let text = self.memory.get_string(name).to_owned();
                            self.runtime_error(&format!("Undefined variable '{text}'."));
                            return InterpretResult::RuntimeError;
                        }
                    }
                }

                OpCode::SetGlobal => {
                    let Some(name) = self.read_constant().as_string() else {
                        self.runtime_error("Global name must be a string constant.");
                        return InterpretResult::RuntimeError;
                    };
                    let value = self.peek(0);
                    match self.globals.entry(name) {
                        Entry::Occupied(mut entry) => {
                            entry.insert(value);
                        }
                        Entry::Vacant(_) => {
                            let text = self.memory.get_string(name).to_owned();
                            self.runtime_error(&format!("Undefined variable '{text}'."));
                            return InterpretResult::RuntimeError;
                        }
                    }
                }

                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let slot = self.frame().slot_start + slot;
                    let value = self.stack[slot].clone();
                    self.push(value);
                }

                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let slot = self.frame().slot_start + slot;
                    self.stack[slot] = self.peek(0);
                }

                OpCode::Jump => {
                    let offset = self.read_short();
                    self.frame_mut().ip.increment(offset);
                }

                OpCode::JumpIfFalse => {
                    let offset = self.read_short();
                    if is_falsey(&self.peek(0)) {
                        self.frame_mut().ip.increment(offset);
                    }
                }

                OpCode::Loop => {
                    let offset = self.read_short();
                    self.frame_mut().ip.decrement(offset);
                }

                op @ (OpCode::Call0
                | OpCode::Call1
                | OpCode::Call2
                | OpCode::Call3
                | OpCode::Call4
                | OpCode::Call5
                | OpCode::Call6
                | OpCode::Call7
                | OpCode::Call8) => {
                    let arg_count = (op as u8 - OpCode::Call0 as u8) as usize;
                    if !self.call_value(self.peek(arg_count), arg_count) {
                        return InterpretResult::RuntimeError;
                    }
                }
            }
        }
    }

    fn call_value(&mut self, callee: Value, arg_count: usize) -> bool {
        match callee.as_function() {
            Some(function) => self.call(function, arg_count),
            None => {
                self.runtime_error("Can only call functions.");
                false
            }
        }
    }

    fn call(&mut self, function: FunctionId, arg_count: usize) -> bool {
        let arity = self.memory.function(function).arity;
        if arg_count != arity {
            self.runtime_error(&format!(
                "Expected {arity} arguments but got {arg_count}."
            ));
            return false;
        }

        if self.frames.len() == MAX_FRAMES {
            self.runtime_error("Stack overflow.");
            return false;
        }

        self.frames.push(CallFrame {
            function,
            ip: InstructionPointer(0),
            slot_start: self.stack.len() - arg_count,
        });
        true
    }

    fn frame(&self) -> &CallFrame {
        self.frames.last().unwrap()
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().unwrap()
    }

    fn chunk(&self) -> &Chunk {
        &self.memory.function(self.frame().function).chunk
    }

    fn reset_stack(&mut self) {
        self.stack.clear();
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap()
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack.iter().rev().nth(distance).unwrap().clone()
    }

    fn runtime_error(&mut self, message: &str) {
        let _ = writeln!(self.config.vm_error, "Runtime error: {message}");

        for frame in self.frames.iter().rev() {
            let function = self.memory.function(frame.function);
            let line = function.chunk.line(frame.ip.0.saturating_sub(1));
            let name = self.memory.get_string(function.name);
            let _ = writeln!(self.config.vm_error, "[line {line}] in {name}");
        }

        self.reset_stack();
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct InstructionPointer(pub usize);

impl InstructionPointer {
    pub fn increment(&mut self, offset: usize) {
        self.0 += offset;
    }

    pub fn decrement(&mut self, offset: usize) {
        self.0 -= offset;
    }
}

impl fmt::Display for InstructionPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0>4}", self.0)
    }
}

pub struct CallFrame {
    pub function: FunctionId,
    pub ip: InstructionPointer,
    pub slot_start: usize,
}

#[derive(Debug, PartialEq)]
pub enum InterpretResult {
    Ok(Value),
    CompileError,
    RuntimeError,
}

fn is_falsey(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        _ => false,
    }
}

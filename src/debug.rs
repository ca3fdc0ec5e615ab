use std::fmt::Write;

use crate::{
    chunk::{Chunk, ConstantId, OpCode},
    memory::Memory,
    value::Value,
};

pub fn disassemble_chunk(chunk: &Chunk, name: &str, memory: &Memory, out: &mut impl Write) {
    let _ = writeln!(out, "== {name} ==");

    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset, memory, out);
    }
}

pub fn disassemble_instruction(
    chunk: &Chunk,
    offset: usize,
    memory: &Memory,
    out: &mut impl Write,
) -> usize {
    let _ = write!(out, "{offset:0>4} ");
    let line = chunk.line(offset);
    if offset > 0 && line == chunk.line(offset - 1) {
        let _ = write!(out, "   | ");
    } else {
        let _ = write!(out, "{line:>4} ");
    }

    let op: OpCode = match chunk.byte(offset).try_into() {
        Ok(op) => op,
        Err(err) => {
            let _ = writeln!(out, "{err}");
            return offset + 1;
        }
    };

    match op {
        OpCode::Loop => jump_instruction(op, -1, chunk, offset, out),

        OpCode::Jump | OpCode::JumpIfFalse => jump_instruction(op, 1, chunk, offset, out),

        OpCode::Constant | OpCode::DefineGlobal | OpCode::GetGlobal | OpCode::SetGlobal => {
            constant_instruction(op, chunk, offset, memory, out)
        }

        OpCode::GetLocal | OpCode::SetLocal => byte_instruction(op, chunk, offset, out),

        _ => simple_instruction(op, offset, out),
    }
}

fn jump_instruction(
    op: OpCode,
    sign: i32,
    chunk: &Chunk,
    offset: usize,
    out: &mut impl Write,
) -> usize {
    let hi = chunk.byte(offset + 1) as u16;
    let lo = chunk.byte(offset + 2) as u16;
    let jump = (hi << 8) | lo;
    let name = format!("{op:?}");
    let target = (offset as i32 + 3) + sign * jump as i32;
    let _ = writeln!(out, "{name:<16} {offset:0>4} -> {target:0>4}");
    offset + 3
}

fn constant_instruction(
    op: OpCode,
    chunk: &Chunk,
    offset: usize,
    memory: &Memory,
    out: &mut impl Write,
) -> usize {
    let constant = chunk.byte(offset + 1);
    let name = format!("{op:?}");
    let _ = write!(out, "{name:<16} {constant:>4} ");
    write_value(&chunk.constant(ConstantId(constant as usize)), memory, out);
    let _ = writeln!(out);
    offset + 2
}

fn byte_instruction(op: OpCode, chunk: &Chunk, offset: usize, out: &mut impl Write) -> usize {
    let slot = chunk.byte(offset + 1);
    let name = format!("{op:?}");
    let _ = writeln!(out, "{name:<16} {slot:0>4}");
    offset + 2
}

fn simple_instruction(op: OpCode, offset: usize, out: &mut impl Write) -> usize {
    let _ = writeln!(out, "{op:?}");
    offset + 1
}

pub fn write_value(value: &Value, memory: &Memory, out: &mut impl Write) {
    let _ = match value {
        Value::Null => write!(out, "null"),
        Value::Bool(b) => write!(out, "{b}"),
        Value::Number(n) => write!(out, "{n}"),
        Value::String(id) => write!(out, "{}", memory.get_string(*id)),
        Value::Function(id) => {
            let function = memory.function(*id);
            write!(out, "<fn {}>", memory.get_string(function.name))
        }
    };
}

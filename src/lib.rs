pub mod chunk;
pub mod compiler;
pub mod config;
pub mod debug;
pub mod memory;
pub mod scanner;
pub mod span;
pub mod string_intern;
pub mod value;
pub mod vm;

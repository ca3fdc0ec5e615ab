use std::{cell::RefCell, fmt::Write, rc::Rc};

/// Where a stream of output lines ends up. `Str` appends into a shared
/// buffer, which is how tests capture diagnostics without touching stderr.
pub enum PrintOutput {
    Null,
    StdOut,
    StdErr,
    Str(Rc<RefCell<String>>),
}

impl PrintOutput {
    pub fn redirect(&mut self, target: Rc<RefCell<String>>) {
        *self = PrintOutput::Str(target);
    }
}

impl Write for PrintOutput {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        match self {
            PrintOutput::Null => (),
            PrintOutput::StdOut => print!("{s}"),
            PrintOutput::StdErr => eprint!("{s}"),
            PrintOutput::Str(buffer) => buffer.borrow_mut().push_str(s),
        }
        Ok(())
    }
}

pub struct Config {
    /// Sink for compile diagnostics, one `[line N] Error: message` per line.
    pub compiler_error: PrintOutput,
    /// Sink for the disassembly dump of each successfully compiled function.
    pub compiler_debug: PrintOutput,
    /// Sink for runtime errors and their call traces.
    pub vm_error: PrintOutput,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compiler_error: PrintOutput::StdErr,
            compiler_debug: PrintOutput::Null,
            vm_error: PrintOutput::StdErr,
        }
    }
}

impl Config {
    /// A config that swallows all output.
    pub fn quiet() -> Config {
        Config {
            compiler_error: PrintOutput::Null,
            compiler_debug: PrintOutput::Null,
            vm_error: PrintOutput::Null,
        }
    }

    /// A config whose error sinks append to the returned buffer.
    pub fn capture() -> (Config, Rc<RefCell<String>>) {
        let buffer = Rc::new(RefCell::new(String::new()));
        let config = Config {
            compiler_error: PrintOutput::Str(buffer.clone()),
            compiler_debug: PrintOutput::Null,
            vm_error: PrintOutput::Str(buffer.clone()),
        };
        (config, buffer)
    }
}

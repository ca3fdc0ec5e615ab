use std::fmt::Write as _;
use std::rc::Rc;

use crate::{
    chunk::OpCode,
    config::Config,
    debug::disassemble_chunk,
    memory::Memory,
    scanner::{Scanner, Token, TokenKind},
    value::{FunctionId, Value},
    vm::VM,
};

const MAX_LOCALS: usize = 256;
const MAX_ARITY: u8 = 8;

/// Compiles Ember source into a VM primed with the top-level script
/// function. Returns `None` if any diagnostic was reported; every error has
/// already been written to `config.compiler_error` as a `[line N] Error:`
/// line by the time this returns.
pub fn compile(source: Rc<str>, config: Config) -> Option<VM> {
    let scanner = Scanner::new(source);
    Parser::new(scanner, config).compile()
}

/// A block-scoped variable. Resolution scans the containing frame's locals
/// from the end, so the innermost declaration of a name wins.
struct Local {
    name: Token,
    depth: i32,
}

/// One function under construction. Frames form a stack: the top frame is
/// the function currently receiving bytecode, the rest are its enclosing
/// functions, paused mid-body.
struct Frame {
    function: FunctionId,
    locals: Vec<Local>,
    /// -1 while at global scope, 0 in a function's outermost scope,
    /// increasing with block nesting.
    scope_depth: i32,
}

struct Parser {
    scanner: Scanner,
    memory: Memory,
    frames: Vec<Frame>,
    current: Option<Token>,
    previous: Option<Token>,
    had_error: bool,
    config: Config,
}

impl Parser {
    fn new(scanner: Scanner, config: Config) -> Parser {
        Parser {
            scanner,
            memory: Memory::new(),
            frames: Vec::new(),
            current: None,
            previous: None,
            had_error: false,
            config,
        }
    }

    fn compile(mut self) -> Option<VM> {
        self.begin_frame("script");
        self.advance();

        while !self.match_token(TokenKind::Eof) {
            self.statement();
        }

        let script = self.end_frame();

        if self.had_error {
            None
        } else {
            Some(VM::new(self.memory, script, self.config))
        }
    }

    // ----- token cursor -----

    fn advance(&mut self) {
        self.previous = self.current.take();

        loop {
            let token = self.scanner.token();

            if token.kind != TokenKind::Error {
                self.current = Some(token);
                break;
            }

            let message = token.text().to_owned();
            self.error_at(token.line, &message);
        }
    }

    /// Reports a mismatch and advances either way, so every caller makes
    /// progress through the token stream even on malformed input.
    fn consume(&mut self, kind: TokenKind, message: &str) {
        if !self.check(kind) {
            self.error_at_current(message);
        }
        self.advance();
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        let matched = self.check(kind);
        if matched {
            self.advance();
        }
        matched
    }

    fn current(&self) -> Token {
        self.current.as_ref().unwrap().clone()
    }

    fn previous(&self) -> Token {
        self.previous.as_ref().unwrap().clone()
    }

    // ----- statements -----

    fn statement(&mut self) {
        if self.match_token(TokenKind::Fun) {
            self.fun_statement();
        } else if self.match_token(TokenKind::If) {
            self.if_statement();
        } else if self.match_token(TokenKind::Return) {
            self.return_statement();
        } else if self.match_token(TokenKind::Var) {
            self.var_statement();
        } else if self.match_token(TokenKind::While) {
            self.while_statement();
        } else if self.check(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::SemiColon, "Expect ';' after expression.");
        }
    }

    fn fun_statement(&mut self) {
        let (name, constant) = self.parse_variable("Expect function name.");

        self.begin_frame(name.text());
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");

        if !self.check(TokenKind::RightParen) {
            loop {
                let (param, param_constant) = self.parse_variable("Expect parameter name.");
                self.declare_variable(&param, param_constant);

                let function = self.frame().function;
                let arity = {
                    let function = self.memory.function_mut(function);
                    function.arity += 1;
                    function.arity
                };
                if arity > MAX_ARITY as usize {
                    self.error("Cannot have more than 8 parameters.");
                }

                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");

        self.block();

        self.end_scope();
        let function = self.end_frame();
        self.emit_constant(Value::Function(function));

        self.declare_variable(&name, constant);
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        self.begin_scope();

        let else_jump = self.emit_jump(OpCode::JumpIfFalse);

        // Then branch, with its copy of the condition discarded.
        self.emit_op(OpCode::Pop);
        self.statement();
        let end_jump = self.emit_jump(OpCode::Jump);

        // Else branch, ditto.
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        if self.match_token(TokenKind::Else) {
            self.statement();
        }

        self.patch_jump(end_jump);
        self.end_scope();
    }

    fn return_statement(&mut self) {
        if self.match_token(TokenKind::SemiColon) {
            self.emit_op(OpCode::Null);
        } else {
            self.expression();
            self.consume(TokenKind::SemiColon, "Expect ';' after return value.");
        }

        self.emit_op(OpCode::Return);
    }

    fn var_statement(&mut self) {
        let (name, constant) = self.parse_variable("Expect variable name.");

        self.consume(TokenKind::Equal, "Expect '=' after variable name.");
        self.expression();
        self.consume(TokenKind::SemiColon, "Expect ';' after initializer.");

        // Declared only now, so the initializer still sees any outer binding
        // of the same name.
        self.declare_variable(&name, constant);
    }

    fn while_statement(&mut self) {
        let loop_start = self.code_len();

        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        self.begin_scope();

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);

        self.emit_op(OpCode::Pop);
        self.statement();

        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.end_scope();
    }

    fn block(&mut self) {
        self.consume(TokenKind::LeftBrace, "Expect '{' before block.");

        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.statement();
        }

        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    // ----- variables and scope -----

    /// Consumes an identifier. At global scope the name is also interned
    /// into the current constant pool right away, before any initializer
    /// runs, and its slot returned.
    fn parse_variable(&mut self, message: &str) -> (Token, u8) {
        self.consume(TokenKind::Identifier, message);
        let name = self.previous();

        let constant = if self.frame().scope_depth == -1 {
            self.name_constant(&name)
        } else {
            0
        };

        (name, constant)
    }

    fn declare_variable(&mut self, name: &Token, constant: u8) {
        let depth = self.frame().scope_depth;
        if depth == -1 {
            self.emit_bytes(OpCode::DefineGlobal as u8, constant);
            return;
        }

        // Only a collision at the same depth is a redeclaration; anything
        // shallower is legitimately shadowed.
        let redeclared = self
            .frame()
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth >= depth)
            .any(|local| local.name.lexeme_eq(name));
        if redeclared {
            self.error_at(
                name.line,
                "Variable with this name already declared in this scope.",
            );
        }

        if self.frame().locals.len() == MAX_LOCALS {
            self.error_at(name.line, "Too many local variables in function.");
            return;
        }

        self.frame_mut().locals.push(Local {
            name: name.clone(),
            depth,
        });
    }

    fn resolve_local(&self, name: &Token) -> Option<u8> {
        self.frame()
            .locals
            .iter()
            .enumerate()
            .rev()
            .find(|(_, local)| local.name.lexeme_eq(name))
            .map(|(slot, _)| slot as u8)
    }

    fn name_constant(&mut self, name: &Token) -> u8 {
        let id = self.memory.intern(name.text());
        self.make_constant(Value::String(id))
    }

    fn begin_scope(&mut self) {
        self.frame_mut().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.frame_mut().scope_depth -= 1;

        let depth = self.frame().scope_depth;
        while self
            .frame()
            .locals
            .last()
            .is_some_and(|local| local.depth > depth)
        {
            self.emit_op(OpCode::Pop);
            self.frame_mut().locals.pop();
        }
    }

    // ----- expressions -----

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();

        let Some(prefix) = self.get_rule(self.previous().kind).prefix else {
            self.error("Expect expression.");
            return;
        };

        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while self.get_rule(self.current().kind).precedence >= precedence {
            self.advance();
            if let Some(infix) = self.get_rule(self.previous().kind).infix {
                infix(self);
            }
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn get_rule(&self, kind: TokenKind) -> ParseRule {
        use Precedence as P;
        use TokenKind::*;

        match kind {
            LeftParen => ParseRule::prec(P::Call)
                .prefix(|p, _| p.grouping())
                .infix(|p| p.call()),
            Minus => ParseRule::prec(P::Term)
                .prefix(|p, _| p.unary())
                .infix(|p| p.binary()),
            Plus => ParseRule::prec(P::Term).infix(|p| p.binary()),
            Slash | Star => ParseRule::prec(P::Factor).infix(|p| p.binary()),
            Bang => ParseRule::new().prefix(|p, _| p.unary()),
            BangEqual | EqualEqual => ParseRule::prec(P::Equality).infix(|p| p.binary()),
            Greater | GreaterEqual | Less | LessEqual => {
                ParseRule::prec(P::Comparison).infix(|p| p.binary())
            }
            Identifier => ParseRule::new().prefix(|p, can_assign| p.variable(can_assign)),
            String => ParseRule::new().prefix(|p, _| p.string()),
            Number => ParseRule::new().prefix(|p, _| p.number()),
            And => ParseRule::prec(P::And).infix(|p| p.and()),
            Or => ParseRule::prec(P::Or).infix(|p| p.or()),
            False | Null | True => ParseRule::new().prefix(|p, _| p.literal()),
            RightParen | LeftBracket | RightBracket | LeftBrace | RightBrace | Comma | Dot
            | SemiColon | Equal | Class | Else | For | Fun | If | Return | This | Var | While
            | Error | Eof => ParseRule::new(),
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn number(&mut self) {
        match self.previous().text().parse::<f64>() {
            Ok(value) => self.emit_constant(Value::Number(value)),
            Err(_) => self.error("Invalid number literal."),
        }
    }

    fn string(&mut self) {
        let token = self.previous();
        let lexeme = token.text();
        let id = self.memory.intern(&lexeme[1..lexeme.len() - 1]);
        self.emit_constant(Value::String(id));
    }

    fn literal(&mut self) {
        match self.previous().kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::Null => self.emit_op(OpCode::Null),
            TokenKind::True => self.emit_op(OpCode::True),
            _ => (),
        }
    }

    fn unary(&mut self) {
        let operator = self.previous().kind;

        self.parse_precedence(Precedence::Unary);

        match operator {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            _ => (),
        }
    }

    fn binary(&mut self) {
        let operator = self.previous().kind;
        let rule = self.get_rule(operator);

        self.parse_precedence(rule.precedence.next());

        match operator {
            TokenKind::BangEqual => self.emit_bytes(OpCode::Equal as u8, OpCode::Not as u8),
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => self.emit_bytes(OpCode::Less as u8, OpCode::Not as u8),
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => self.emit_bytes(OpCode::Greater as u8, OpCode::Not as u8),
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            _ => (),
        }
    }

    fn and(&mut self) {
        // A falsy left operand short-circuits past the right operand and
        // stays on the stack as the result.
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);

        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);

        self.patch_jump(end_jump);
    }

    fn or(&mut self) {
        // A truthy left operand jumps over both the pop and the right
        // operand; only a falsy one falls through to be replaced.
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);

        self.patch_jump(end_jump);
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous();
        self.named_variable(name, can_assign);
    }

    fn named_variable(&mut self, name: Token, can_assign: bool) {
        let (arg, get, set) = match self.resolve_local(&name) {
            Some(slot) => (slot, OpCode::GetLocal, OpCode::SetLocal),
            None => (
                self.name_constant(&name),
                OpCode::GetGlobal,
                OpCode::SetGlobal,
            ),
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_bytes(set as u8, arg);
        } else {
            self.emit_bytes(get as u8, arg);
        }
    }

    fn call(&mut self) {
        let mut arg_count: u8 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if arg_count == MAX_ARITY {
                    self.error("Cannot have more than 8 arguments.");
                } else {
                    arg_count += 1;
                }

                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        self.emit_byte(OpCode::Call0 as u8 + arg_count);
    }

    // ----- compiler frames -----

    fn begin_frame(&mut self, name: &str) -> FunctionId {
        let function = self.memory.new_function(name);
        self.frames.push(Frame {
            function,
            locals: Vec::new(),
            scope_depth: -1,
        });
        function
    }

    fn end_frame(&mut self) -> FunctionId {
        // Falling off the end of any body returns null.
        self.emit_bytes(OpCode::Null as u8, OpCode::Return as u8);

        let frame = self.frames.pop().unwrap();

        if !self.had_error {
            let function = self.memory.function(frame.function);
            let name = self.memory.get_string(function.name).to_owned();
            log::debug!(
                "compiled <fn {name}>: {} bytes, {} constants",
                function.chunk.code.len(),
                function.chunk.constants.len()
            );
            disassemble_chunk(
                &function.chunk,
                &name,
                &self.memory,
                &mut self.config.compiler_debug,
            );
        }

        frame.function
    }

    fn frame(&self) -> &Frame {
        self.frames.last().unwrap()
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().unwrap()
    }

    /// Every function still being compiled, innermost first. Anything that
    /// scans live objects must include these alongside finished heap data:
    /// an enclosing pool is the only path to nested functions that have not
    /// been bound to a name yet.
    fn open_functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.frames.iter().rev().map(|frame| frame.function)
    }

    // ----- bytecode emission -----

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous().line;
        let function = self.frame().function;
        self.memory.function_mut(function).chunk.write(byte, line);
    }

    fn emit_bytes(&mut self, a: u8, b: u8) {
        self.emit_byte(a);
        self.emit_byte(b);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    fn emit_short(&mut self, value: u16) {
        self.emit_byte(((value >> 8) & 0xff) as u8);
        self.emit_byte((value & 0xff) as u8);
    }

    fn emit_constant(&mut self, value: Value) {
        let constant = self.make_constant(value);
        self.emit_bytes(OpCode::Constant as u8, constant);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        log::trace!(
            "pool grow with {} open functions",
            self.open_functions().count()
        );

        let function = self.frame().function;
        let index = self.memory.function_mut(function).chunk.add_constant(value);
        match u8::try_from(index) {
            Ok(index) => index,
            Err(_) => {
                self.error("Too many constants in one chunk.");
                0
            }
        }
    }

    fn code_len(&self) -> usize {
        self.memory.function(self.frame().function).chunk.code.len()
    }

    // ----- jumps -----

    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.code_len() - 2
    }

    fn patch_jump(&mut self, offset: usize) {
        // The jump lands relative to the first byte after the operand.
        let jump = self.code_len() - offset - 2;

        if jump > u16::MAX as usize {
            self.error("Too much code to jump over.");
        }

        let function = self.frame().function;
        let code = &mut self.memory.function_mut(function).chunk.code;
        code[offset] = ((jump >> 8) & 0xff) as u8;
        code[offset + 1] = (jump & 0xff) as u8;
    }

    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);

        let offset = self.code_len() - loop_start + 2;
        if offset > u16::MAX as usize {
            self.error("Loop body too large.");
        }

        self.emit_short(offset as u16);
    }

    // ----- diagnostics -----

    fn error_at(&mut self, line: usize, message: &str) {
        let _ = writeln!(self.config.compiler_error, "[line {line}] Error: {message}");
        self.had_error = true;
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous().line, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current().line, message);
    }
}

#[derive(PartialEq, Eq, Copy, Clone, Debug, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

type PrefixFn = fn(&mut Parser, bool);
type InfixFn = fn(&mut Parser);

struct ParseRule {
    prefix: Option<PrefixFn>,
    infix: Option<InfixFn>,
    precedence: Precedence,
}

impl ParseRule {
    fn new() -> ParseRule {
        ParseRule::prec(Precedence::None)
    }

    fn prec(precedence: Precedence) -> ParseRule {
        ParseRule {
            prefix: None,
            infix: None,
            precedence,
        }
    }

    fn prefix(self, prefix: PrefixFn) -> ParseRule {
        ParseRule {
            prefix: Some(prefix),
            ..self
        }
    }

    fn infix(self, infix: InfixFn) -> ParseRule {
        ParseRule {
            infix: Some(infix),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(source: &str) -> VM {
        let (config, errors) = Config::capture();
        match compile(Rc::from(source), config) {
            Some(vm) => vm,
            None => panic!("compile failed:\n{}", errors.borrow()),
        }
    }

    fn compile_errors(source: &str) -> String {
        let (config, errors) = Config::capture();
        assert!(
            compile(Rc::from(source), config).is_none(),
            "expected a compile error"
        );
        let msg = errors.borrow().clone();
        msg
    }

    fn script_code(vm: &VM) -> &[u8] {
        &vm.memory.function(vm.script).chunk.code
    }

    /// Decodes a chunk's instruction stream into opcodes, skipping operands.
    fn ops(code: &[u8]) -> Vec<OpCode> {
        let mut ops = Vec::new();
        let mut offset = 0;
        while offset < code.len() {
            let op = OpCode::try_from(code[offset]).unwrap();
            ops.push(op);
            offset += match op {
                OpCode::Constant
                | OpCode::DefineGlobal
                | OpCode::GetGlobal
                | OpCode::SetGlobal
                | OpCode::GetLocal
                | OpCode::SetLocal => 2,
                OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => 3,
                _ => 1,
            };
        }
        ops
    }

    #[test]
    fn multiplication_is_emitted_before_addition() {
        let vm = compiled("return 1 + 2 * 3;");

        assert_eq!(
            ops(script_code(&vm)),
            vec![
                OpCode::Constant,
                OpCode::Constant,
                OpCode::Constant,
                OpCode::Multiply,
                OpCode::Add,
                OpCode::Return,
                OpCode::Null,
                OpCode::Return,
            ]
        );
    }

    #[test]
    fn comparison_operators_are_derived_pairs() {
        let vm = compiled("1 >= 2;");

        assert_eq!(
            ops(script_code(&vm)),
            vec![
                OpCode::Constant,
                OpCode::Constant,
                OpCode::Less,
                OpCode::Not,
                OpCode::Pop,
                OpCode::Null,
                OpCode::Return,
            ]
        );
    }

    #[test]
    fn branch_locals_are_discarded_at_scope_end() {
        let vm = compiled("if (false) { var x = 1; } else { var y = 2; }");

        // One Pop per branch for the condition, one per branch-local, and a
        // balanced stack on both paths.
        assert_eq!(
            ops(script_code(&vm)),
            vec![
                OpCode::False,
                OpCode::JumpIfFalse,
                OpCode::Pop,
                OpCode::Constant,
                OpCode::Pop,
                OpCode::Jump,
                OpCode::Pop,
                OpCode::Constant,
                OpCode::Pop,
                OpCode::Null,
                OpCode::Return,
            ]
        );
    }

    #[test]
    fn if_jump_targets_land_on_the_branch_boundaries() {
        let vm = compiled("if (false) { var x = 1; } else { var y = 2; }");
        let code = script_code(&vm);

        // JumpIfFalse operand starts at 2; the else branch's condition Pop
        // sits just past the unconditional Jump.
        let else_distance = ((code[2] as usize) << 8) | code[3] as usize;
        assert_eq!(OpCode::try_from(code[4 + else_distance]), Ok(OpCode::Pop));

        // The Jump at the end of the then branch lands one past the else
        // branch's final Pop.
        let jump_at = 4 + else_distance - 3;
        assert_eq!(OpCode::try_from(code[jump_at]), Ok(OpCode::Jump));
        let end_distance = ((code[jump_at + 1] as usize) << 8) | code[jump_at + 2] as usize;
        assert_eq!(
            OpCode::try_from(code[jump_at + 3 + end_distance]),
            Ok(OpCode::Null)
        );
    }

    #[test]
    fn while_loop_jumps_back_to_the_condition() {
        let vm = compiled("while (false) { 1; }");
        let code = script_code(&vm);

        // Find the Loop instruction and walk its offset backwards; it must
        // land on the first byte of the condition, which is byte 0 here.
        let decoded = ops(code);
        assert!(decoded.contains(&OpCode::Loop));

        let mut offset = 0;
        while OpCode::try_from(code[offset]).unwrap() != OpCode::Loop {
            offset += match OpCode::try_from(code[offset]).unwrap() {
                OpCode::Constant => 2,
                OpCode::Jump | OpCode::JumpIfFalse => 3,
                _ => 1,
            };
        }
        let distance = ((code[offset + 1] as usize) << 8) | code[offset + 2] as usize;
        assert_eq!(offset + 3 - distance, 0);
    }

    #[test]
    fn same_scope_redeclaration_is_an_error() {
        let errors = compile_errors("{ var a = 1; var a = 2; }");
        assert!(errors.contains("already declared in this scope"), "{errors}");
    }

    #[test]
    fn shadowing_an_outer_scope_is_allowed() {
        compiled("{ var a = 1; { var a = 2; } }");
    }

    #[test]
    fn shadowing_reads_the_outer_binding_in_its_initializer() {
        let vm = compiled("{ var a = 1; { var a = a; } }");

        // The inner initializer resolves to the outer local's slot.
        assert_eq!(
            ops(script_code(&vm)),
            vec![
                OpCode::Constant,
                OpCode::GetLocal,
                OpCode::Pop,
                OpCode::Pop,
                OpCode::Null,
                OpCode::Return,
            ]
        );
    }

    #[test]
    fn parameters_take_the_first_slots() {
        let vm = compiled("fun f(a, b) { var c = 1; return b; }");

        let function = (0..vm.memory.function_count())
            .map(crate::value::FunctionId)
            .find(|&id| vm.memory.get_string(vm.memory.function(id).name) == "f")
            .unwrap();
        let function = vm.memory.function(function);
        assert_eq!(function.arity, 2);

        // `return b;` reads slot 1 no matter how many locals follow.
        let code = &function.chunk.code;
        let get = code
            .windows(2)
            .find(|pair| pair[0] == OpCode::GetLocal as u8)
            .unwrap();
        assert_eq!(get[1], 1);
    }

    #[test]
    fn global_functions_define_a_global() {
        let vm = compiled("fun f() { return 1; }");

        assert_eq!(
            ops(script_code(&vm)),
            vec![
                OpCode::Constant,
                OpCode::DefineGlobal,
                OpCode::Null,
                OpCode::Return,
            ]
        );
    }

    #[test]
    fn calls_encode_their_argument_count_in_the_opcode() {
        let vm = compiled("f(1, 2, 3);");

        let decoded = ops(script_code(&vm));
        assert!(decoded.contains(&OpCode::Call3));
    }

    #[test]
    fn assignment_to_a_non_variable_is_an_error() {
        let errors = compile_errors("1 + 2 = 3;");
        assert!(errors.contains("Invalid assignment target"), "{errors}");
    }

    #[test]
    fn missing_expression_is_reported_with_its_line() {
        let errors = compile_errors("var a = ;\n");
        assert!(errors.contains("[line 1] Error: Expect expression."), "{errors}");
    }

    #[test]
    fn var_requires_an_initializer() {
        let errors = compile_errors("var a;");
        assert!(errors.contains("Expect '=' after variable name."), "{errors}");
    }

    #[test]
    fn errors_accumulate_without_resynchronization() {
        let errors = compile_errors("var = 1;\nvar b 2;\n");
        assert!(errors.lines().count() >= 2, "{errors}");
    }

    #[test]
    fn too_many_constants_in_one_function() {
        let mut source = String::new();
        for i in 0..300 {
            source.push_str(&format!("{i};\n"));
        }
        let errors = compile_errors(&source);
        assert!(errors.contains("Too many constants in one chunk."), "{errors}");
    }

    #[test]
    fn too_many_locals_in_one_function() {
        let mut source = String::from("{\n");
        for i in 0..257 {
            source.push_str(&format!("var v{i} = 0;\n"));
        }
        source.push('}');
        let errors = compile_errors(&source);
        assert!(errors.contains("Too many local variables in function."), "{errors}");
    }

    #[test]
    fn jump_distance_overflow_is_reported() {
        let mut source = String::from("if (true) {\n");
        for _ in 0..33000 {
            source.push_str("null;\n");
        }
        source.push('}');
        let errors = compile_errors(&source);
        assert!(errors.contains("Too much code to jump over."), "{errors}");
    }

    #[test]
    fn argument_and_parameter_limits_are_explicit() {
        let errors = compile_errors("f(1, 2, 3, 4, 5, 6, 7, 8, 9);");
        assert!(errors.contains("Cannot have more than 8 arguments."), "{errors}");

        let errors = compile_errors("fun f(a, b, c, d, e, g, h, i, j) { return 0; }");
        assert!(errors.contains("Cannot have more than 8 parameters."), "{errors}");
    }

    #[test]
    fn open_functions_cover_the_whole_chain() {
        let scanner = Scanner::new(Rc::from(""));
        let mut parser = Parser::new(scanner, Config::quiet());

        let outer = parser.begin_frame("outer");
        let inner = parser.begin_frame("inner");

        assert_eq!(
            parser.open_functions().collect::<Vec<_>>(),
            vec![inner, outer]
        );
    }

    #[test]
    fn malformed_input_always_reaches_end_of_input() {
        // Nothing here parses, but consume() advances on every failure, so
        // compilation must terminate with diagnostics rather than loop.
        let errors = compile_errors("var var var = ;;; @ # fun ) ( }");
        assert!(!errors.is_empty());
    }

    #[test]
    fn inert_keywords_have_no_parse_rules() {
        let errors = compile_errors("class;");
        assert!(errors.contains("Expect expression."), "{errors}");
    }
}

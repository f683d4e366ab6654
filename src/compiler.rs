// File: src/compiler.rs
//
// Bytecode compiler for Carblang. A single pre-order walk over the AST that
// emits opcodes as it visits. Variables resolve against a stack of locals
// scoped by depth; anything not found there is a global. Forward jumps are
// emitted with placeholder offsets and patched once the target is known.

use std::rc::Rc;

use crate::ast::{Expr, LiteralValue, Stmt};
use crate::bytecode::{Chunk, OpCode};
use crate::errors::CarbError;
use crate::lexer::TokenType;
use crate::value::{Function, Value};

struct Local {
    name: String,
    depth: usize,
}

pub struct Compiler {
    chunk: Chunk,
    locals: Vec<Local>,
    scope_depth: usize,
}

/// Compiles a program into its root chunk. Function bodies compile into
/// nested chunks stored in the enclosing constant pool.
pub fn compile(statements: &[Stmt]) -> Result<Chunk, CarbError> {
    let mut compiler = Compiler::new();
    for stmt in statements {
        compiler.compile_stmt(stmt)?;
    }
    // The program falls off the end: leave null for the halting RETURN
    compiler.emit(OpCode::Null);
    compiler.emit(OpCode::Return);
    Ok(compiler.chunk)
}

impl Compiler {
    fn new() -> Self {
        Compiler { chunk: Chunk::new(), locals: Vec::new(), scope_depth: 0 }
    }

    /// Compiler state for a function body: parameters occupy the first
    /// locals slots, and depth starts above zero so `var` always binds
    /// locally inside a function.
    fn for_function(params: &[String]) -> Self {
        Compiler {
            chunk: Chunk::new(),
            locals: params.iter().map(|p| Local { name: p.clone(), depth: 1 }).collect(),
            scope_depth: 1,
        }
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CarbError> {
        match stmt {
            Stmt::Expression(expr) => {
                self.compile_expr(expr)?;
                self.emit(OpCode::Pop);
            }

            Stmt::Print(expr) => {
                self.compile_expr(expr)?;
                self.emit(OpCode::Print);
            }

            Stmt::PrintLn(expr) => {
                self.compile_expr(expr)?;
                self.emit(OpCode::PrintLn);
            }

            Stmt::Var { name, initializer } => {
                match initializer {
                    Some(expr) => self.compile_expr(expr)?,
                    None => self.emit(OpCode::Null),
                }
                if self.scope_depth > 0 {
                    self.add_local(&name.lexeme)?;
                } else {
                    let index = self.make_constant(Value::string(name.lexeme.clone()))?;
                    self.emit(OpCode::DefineGlobal);
                    self.emit_byte(index);
                }
            }

            Stmt::If { condition, then_branch, else_branch } => {
                self.compile_expr(condition)?;
                let else_jump = self.emit_jump(OpCode::JumpIfFalse);
                self.emit(OpCode::Pop);
                self.compile_stmt(then_branch)?;
                let end_jump = self.emit_jump(OpCode::Jump);

                self.patch_jump(else_jump)?;
                self.emit(OpCode::Pop);
                if let Some(else_branch) = else_branch {
                    self.compile_stmt(else_branch)?;
                }
                self.patch_jump(end_jump)?;
            }

            Stmt::While { condition, body } => {
                let loop_start = self.chunk.code.len();
                self.compile_expr(condition)?;
                let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
                self.emit(OpCode::Pop);
                self.compile_stmt(body)?;
                self.emit_loop(loop_start)?;
                self.patch_jump(exit_jump)?;
                self.emit(OpCode::Pop);
            }

            Stmt::Block(statements) => {
                self.begin_scope();
                for stmt in statements {
                    self.compile_stmt(stmt)?;
                }
                self.end_scope();
            }

            Stmt::Function { name, params, body } => {
                let param_names: Vec<String> = params.iter().map(|p| p.lexeme.clone()).collect();
                let function = compile_function(&name.lexeme, &param_names, body)?;
                let index = self.make_constant(function)?;
                self.emit(OpCode::Closure);
                self.emit_byte(index);

                if self.scope_depth > 0 {
                    self.add_local(&name.lexeme)?;
                } else {
                    let name_index = self.make_constant(Value::string(name.lexeme.clone()))?;
                    self.emit(OpCode::DefineGlobal);
                    self.emit_byte(name_index);
                }
            }

            Stmt::Return { value, .. } => {
                match value {
                    Some(expr) => self.compile_expr(expr)?,
                    None => self.emit(OpCode::Null),
                }
                self.emit(OpCode::Return);
            }
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CarbError> {
        match expr {
            Expr::Literal(value) => match value {
                LiteralValue::Null => self.emit(OpCode::Null),
                LiteralValue::Bool(true) => self.emit(OpCode::True),
                LiteralValue::Bool(false) => self.emit(OpCode::False),
                LiteralValue::Number(n) => self.emit_constant(Value::Number(*n))?,
                LiteralValue::Str(s) => self.emit_constant(Value::string(s.clone()))?,
            },

            Expr::Grouping(inner) => self.compile_expr(inner)?,

            Expr::Unary { operator, right } => {
                self.compile_expr(right)?;
                match operator.token_type {
                    TokenType::Minus => self.emit(OpCode::Negate),
                    TokenType::Bang => self.emit(OpCode::Not),
                    _ => return Err(CarbError::compile("Invalid unary operator")),
                }
            }

            Expr::Binary { left, operator, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                match operator.token_type {
                    TokenType::Plus => self.emit(OpCode::Add),
                    TokenType::Minus => self.emit(OpCode::Subtract),
                    TokenType::Star => self.emit(OpCode::Multiply),
                    TokenType::Slash => self.emit(OpCode::Divide),
                    TokenType::EqualEqual => self.emit(OpCode::Equal),
                    TokenType::Greater => self.emit(OpCode::Greater),
                    TokenType::Less => self.emit(OpCode::Less),
                    // The remaining comparisons lower to their complement
                    TokenType::BangEqual => {
                        self.emit(OpCode::Equal);
                        self.emit(OpCode::Not);
                    }
                    TokenType::GreaterEqual => {
                        self.emit(OpCode::Less);
                        self.emit(OpCode::Not);
                    }
                    TokenType::LessEqual => {
                        self.emit(OpCode::Greater);
                        self.emit(OpCode::Not);
                    }
                    _ => return Err(CarbError::compile("Unsupported binary operator")),
                }
            }

            Expr::Logical { left, operator, right } => {
                // JumpIfFalse peeks, so the short-circuit result is whatever
                // survives on the stack; the taken path pops before the rhs.
                self.compile_expr(left)?;
                if operator.token_type == TokenType::And {
                    let end_jump = self.emit_jump(OpCode::JumpIfFalse);
                    self.emit(OpCode::Pop);
                    self.compile_expr(right)?;
                    self.patch_jump(end_jump)?;
                } else {
                    let rhs_jump = self.emit_jump(OpCode::JumpIfFalse);
                    let end_jump = self.emit_jump(OpCode::Jump);
                    self.patch_jump(rhs_jump)?;
                    self.emit(OpCode::Pop);
                    self.compile_expr(right)?;
                    self.patch_jump(end_jump)?;
                }
            }

            Expr::Variable(name) => match self.resolve_local(&name.lexeme) {
                Some(slot) => {
                    self.emit(OpCode::GetLocal);
                    self.emit_byte(slot);
                }
                None => {
                    let index = self.make_constant(Value::string(name.lexeme.clone()))?;
                    self.emit(OpCode::GetGlobal);
                    self.emit_byte(index);
                }
            },

            Expr::Assign { name, value } => {
                self.compile_expr(value)?;
                match self.resolve_local(&name.lexeme) {
                    Some(slot) => {
                        self.emit(OpCode::SetLocal);
                        self.emit_byte(slot);
                    }
                    None => {
                        let index = self.make_constant(Value::string(name.lexeme.clone()))?;
                        self.emit(OpCode::SetGlobal);
                        self.emit_byte(index);
                    }
                }
            }

            Expr::Call { callee, args, .. } => {
                self.compile_expr(callee)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.emit(OpCode::Call);
                self.emit_byte(args.len() as u8);
            }

            Expr::ArrayLiteral(elements) => {
                if elements.len() > 255 {
                    return Err(CarbError::compile("Too many elements in array literal"));
                }
                for element in elements {
                    self.compile_expr(element)?;
                }
                self.emit(OpCode::Array);
                self.emit_byte(elements.len() as u8);
            }

            Expr::Index { array, index } => {
                self.compile_expr(array)?;
                self.compile_expr(index)?;
                self.emit(OpCode::GetIndex);
            }

            Expr::IndexAssign { array, index, value } => {
                self.compile_expr(array)?;
                self.compile_expr(index)?;
                self.compile_expr(value)?;
                self.emit(OpCode::SetIndex);
            }

            Expr::Get { object, name } => {
                self.compile_expr(object)?;
                let index = self.make_constant(Value::string(name.lexeme.clone()))?;
                self.emit(OpCode::GetProperty);
                self.emit_byte(index);
            }
        }
        Ok(())
    }

    // === Scope handling ===

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while self.locals.last().map_or(false, |l| l.depth > self.scope_depth) {
            self.emit(OpCode::Pop);
            self.locals.pop();
        }
    }

    fn add_local(&mut self, name: &str) -> Result<(), CarbError> {
        if self.locals.len() >= 255 {
            return Err(CarbError::compile("Too many local variables in function"));
        }
        self.locals.push(Local { name: name.to_string(), depth: self.scope_depth });
        Ok(())
    }

    /// Scans from the innermost local outwards; the first name match wins,
    /// so shadowing works without any extra bookkeeping.
    fn resolve_local(&self, name: &str) -> Option<u8> {
        self.locals.iter().rposition(|l| l.name == name).map(|slot| slot as u8)
    }

    // === Emission helpers ===

    fn emit(&mut self, op: OpCode) {
        self.chunk.write_op(op);
    }

    fn emit_byte(&mut self, byte: u8) {
        self.chunk.write(byte);
    }

    fn make_constant(&mut self, value: Value) -> Result<u8, CarbError> {
        let index = self.chunk.add_constant(value);
        if index > u8::MAX as usize {
            return Err(CarbError::compile("Too many constants in one chunk"));
        }
        Ok(index as u8)
    }

    fn emit_constant(&mut self, value: Value) -> Result<(), CarbError> {
        let index = self.make_constant(value)?;
        self.emit(OpCode::Constant);
        self.emit_byte(index);
        Ok(())
    }

    /// Emits a jump with a placeholder offset; returns the offset position
    /// for later patching.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk.code.len() - 2
    }

    fn patch_jump(&mut self, offset: usize) -> Result<(), CarbError> {
        // Distance from just past the offset bytes to the current position
        let jump = self.chunk.code.len() - offset - 2;
        if jump > u16::MAX as usize {
            return Err(CarbError::compile("Jump too large"));
        }
        self.chunk.code[offset] = ((jump >> 8) & 0xff) as u8;
        self.chunk.code[offset + 1] = (jump & 0xff) as u8;
        Ok(())
    }

    fn emit_loop(&mut self, loop_start: usize) -> Result<(), CarbError> {
        let offset = self.chunk.code.len() - loop_start + 3;
        if offset > u16::MAX as usize {
            return Err(CarbError::compile("Loop too large"));
        }
        self.emit(OpCode::Loop);
        self.emit_byte(((offset >> 8) & 0xff) as u8);
        self.emit_byte((offset & 0xff) as u8);
        Ok(())
    }
}

fn compile_function(name: &str, params: &[String], body: &[Stmt]) -> Result<Value, CarbError> {
    let mut compiler = Compiler::for_function(params);
    for stmt in body {
        compiler.compile_stmt(stmt)?;
    }
    // Implicit return for bodies that fall off the end
    compiler.emit(OpCode::Null);
    compiler.emit(OpCode::Return);

    Ok(Value::Function(Rc::new(Function {
        name: name.to_string(),
        arity: params.len(),
        chunk: Rc::new(compiler.chunk),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::parser::Parser;

    fn compile_source(source: &str) -> Result<Chunk, CarbError> {
        let (tokens, scan_errors) = lexer::scan(source);
        assert!(scan_errors.is_empty(), "scan errors: {:?}", scan_errors);
        let (stmts, parse_errors) = Parser::new(tokens).parse();
        assert!(parse_errors.is_empty(), "parse errors: {:?}", parse_errors);
        compile(&stmts)
    }

    fn ops(chunk: &Chunk) -> Vec<u8> {
        chunk.code.clone()
    }

    #[test]
    fn program_ends_with_null_return() {
        let chunk = compile_source("1;").unwrap();
        let code = ops(&chunk);
        assert_eq!(code[code.len() - 2], OpCode::Null as u8);
        assert_eq!(code[code.len() - 1], OpCode::Return as u8);
    }

    #[test]
    fn top_level_var_defines_a_global() {
        let chunk = compile_source("var x = 1;").unwrap();
        assert!(chunk.code.contains(&(OpCode::DefineGlobal as u8)));
        assert!(chunk.constants.iter().any(|c| matches!(c, Value::Str(s) if s.as_str() == "x")));
    }

    #[test]
    fn block_var_resolves_to_local_slots() {
        let chunk = compile_source("{ var a = 1; var b = 2; b = a; }").unwrap();
        let code = ops(&chunk);
        // `b = a` reads slot 0 and writes slot 1
        let get = code
            .windows(2)
            .position(|w| w[0] == OpCode::GetLocal as u8 && w[1] == 0)
            .expect("GetLocal 0 emitted");
        assert_eq!(code[get + 2], OpCode::SetLocal as u8);
        assert_eq!(code[get + 3], 1);
        // One pop for the expression statement, two for the scope's locals
        assert_eq!(code.iter().filter(|&&b| b == OpCode::Pop as u8).count(), 3);
    }

    #[test]
    fn shadowed_name_resolves_to_innermost_slot() {
        let chunk = compile_source("{ var a = 1; { var a = 2; a = 3; } }").unwrap();
        let code = ops(&chunk);
        let set = code
            .windows(2)
            .position(|w| w[0] == OpCode::SetLocal as u8)
            .expect("SetLocal emitted");
        assert_eq!(code[set + 1], 1);
    }

    #[test]
    fn if_jump_lands_after_then_branch() {
        let chunk = compile_source("if (true) print(1);").unwrap();
        let code = ops(&chunk);
        let jif = code
            .iter()
            .position(|&b| b == OpCode::JumpIfFalse as u8)
            .expect("JumpIfFalse emitted");
        let offset = ((code[jif + 1] as usize) << 8) | code[jif + 2] as usize;
        let target = jif + 3 + offset;
        // The else path starts with the Pop of the peeked condition
        assert_eq!(code[target], OpCode::Pop as u8);
    }

    #[test]
    fn while_loop_jumps_back_to_condition_start() {
        let chunk = compile_source("while (false) print(1);").unwrap();
        let code = ops(&chunk);
        let loop_op = code.iter().position(|&b| b == OpCode::Loop as u8).expect("Loop emitted");
        let offset = ((code[loop_op + 1] as usize) << 8) | code[loop_op + 2] as usize;
        // ip sits after the two offset bytes when the subtraction happens
        assert_eq!(loop_op + 3 - offset, 0);
    }

    #[test]
    fn comparison_sugar_lowers_to_complement_plus_not() {
        let chunk = compile_source("1 <= 2;").unwrap();
        let code = ops(&chunk);
        let greater = code.iter().position(|&b| b == OpCode::Greater as u8).unwrap();
        assert_eq!(code[greater + 1], OpCode::Not as u8);
    }

    #[test]
    fn function_declaration_stores_nested_chunk() {
        let chunk = compile_source("function add(a, b) { return a + b; }").unwrap();
        let function = chunk
            .constants
            .iter()
            .find_map(|c| match c {
                Value::Function(f) => Some(f.clone()),
                _ => None,
            })
            .expect("function constant present");
        assert_eq!(function.name, "add");
        assert_eq!(function.arity, 2);
        // Parameters occupy the first local slots
        let body = &function.chunk.code;
        assert!(body.windows(2).any(|w| w[0] == OpCode::GetLocal as u8 && w[1] == 0));
        assert!(body.windows(2).any(|w| w[0] == OpCode::GetLocal as u8 && w[1] == 1));
        assert!(chunk.code.contains(&(OpCode::Closure as u8)));
    }

    #[test]
    fn var_in_function_body_is_local_not_global() {
        let chunk = compile_source("function f() { var x = 1; return x; }").unwrap();
        let function = chunk
            .constants
            .iter()
            .find_map(|c| match c {
                Value::Function(f) => Some(f.clone()),
                _ => None,
            })
            .unwrap();
        assert!(!function.chunk.code.contains(&(OpCode::DefineGlobal as u8)));
        assert!(function.chunk.code.contains(&(OpCode::GetLocal as u8)));
    }

    #[test]
    fn too_many_constants_is_a_compile_error() {
        let mut source = String::new();
        for i in 0..300 {
            source.push_str(&format!("print({}.5);", i));
        }
        let err = compile_source(&source).unwrap_err();
        assert!(err.message.contains("Too many constants"));
    }

    #[test]
    fn too_many_locals_is_a_compile_error() {
        fn function_with_locals(count: usize) -> String {
            let mut body = String::new();
            for i in 0..count {
                body.push_str(&format!("var v{};", i));
            }
            format!("function f() {{ {} }}", body)
        }

        // 255 locals fill every slot a one-byte operand can address
        assert!(compile_source(&function_with_locals(255)).is_ok());
        let err = compile_source(&function_with_locals(256)).unwrap_err();
        assert!(err.message.contains("Too many local variables"));
    }

    #[test]
    fn string_constants_are_deduplicated() {
        let chunk = compile_source("var x = 1; x = 2; x = 3;").unwrap();
        let names = chunk
            .constants
            .iter()
            .filter(|c| matches!(c, Value::Str(s) if s.as_str() == "x"))
            .count();
        assert_eq!(names, 1);
    }
}

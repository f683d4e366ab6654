// File: src/parser.rs
//
// Recursive-descent parser for Carblang. Builds the AST consumed by the
// bytecode compiler. On a syntax error the parser enters panic mode,
// discards tokens until a statement boundary, and resumes, so a single pass
// can report every error in the file.

use crate::ast::{Expr, LiteralValue, Stmt};
use crate::errors::CarbError;
use crate::lexer::{Literal, Token, TokenType};

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<CarbError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, current: 0, errors: Vec::new() }
    }

    /// Parses the whole token stream. Statements that failed to parse are
    /// skipped; the caller must refuse to execute when any errors came back.
    pub fn parse(mut self) -> (Vec<Stmt>, Vec<CarbError>) {
        let mut statements = Vec::new();
        while !self.at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        (statements, self.errors)
    }

    fn declaration(&mut self) -> Option<Stmt> {
        let result = if self.match_token(TokenType::Var) {
            self.var_declaration()
        } else if self.match_token(TokenType::Function) {
            self.function_declaration()
        } else {
            self.statement()
        };

        match result {
            Ok(stmt) => Some(stmt),
            Err(error) => {
                self.errors.push(error);
                self.synchronize();
                None
            }
        }
    }

    fn var_declaration(&mut self) -> Result<Stmt, CarbError> {
        let name = self.consume(TokenType::Identifier, "Expected a variable name")?;

        let initializer = if self.match_token(TokenType::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::Semicolon, "Expected ';' after variable declaration.")?;
        Ok(Stmt::Var { name, initializer })
    }

    fn function_declaration(&mut self) -> Result<Stmt, CarbError> {
        let name = self.consume(TokenType::Identifier, "Expected function name.")?;
        self.consume(TokenType::LeftParen, "Expected '(' after function name.")?;

        let mut params = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if params.len() >= 255 {
                    return Err(self.error_at_peek("Can't have more than 255 parameters."));
                }
                params.push(self.consume(TokenType::Identifier, "Expected parameter name.")?);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expected ')' after parameters.")?;

        self.consume(TokenType::LeftBrace, "Expected '{' before function body.")?;
        let body = self.block()?;
        Ok(Stmt::Function { name, params, body })
    }

    fn statement(&mut self) -> Result<Stmt, CarbError> {
        if self.match_token(TokenType::Print) {
            return self.print_statement(false);
        }
        if self.match_token(TokenType::PrintLn) {
            return self.print_statement(true);
        }
        if self.match_token(TokenType::If) {
            return self.if_statement();
        }
        if self.match_token(TokenType::While) {
            return self.while_statement();
        }
        if self.match_token(TokenType::For) {
            return self.for_statement();
        }
        if self.match_token(TokenType::Return) {
            return self.return_statement();
        }
        if self.match_token(TokenType::LeftBrace) {
            return Ok(Stmt::Block(self.block()?));
        }
        self.expression_statement()
    }

    fn print_statement(&mut self, newline: bool) -> Result<Stmt, CarbError> {
        let keyword = if newline { "println" } else { "print" };
        self.consume(TokenType::LeftParen, &format!("Expected '(' after '{}'.", keyword))?;
        let value = self.expression()?;
        self.consume(TokenType::RightParen, "Expected ')' after value.")?;
        self.consume(TokenType::Semicolon, "Expected ';' after value.")?;
        Ok(if newline { Stmt::PrintLn(value) } else { Stmt::Print(value) })
    }

    fn if_statement(&mut self) -> Result<Stmt, CarbError> {
        self.consume(TokenType::LeftParen, "Expected '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expected ')' after if condition.")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_token(TokenType::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If { condition, then_branch, else_branch })
    }

    fn while_statement(&mut self) -> Result<Stmt, CarbError> {
        self.consume(TokenType::LeftParen, "Expected '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expected ')' after condition.")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { condition, body })
    }

    /// `for` is sugar: `{ init; while (cond) { body; incr; } }` with the
    /// condition defaulting to `true` when absent.
    fn for_statement(&mut self) -> Result<Stmt, CarbError> {
        self.consume(TokenType::LeftParen, "Expected '(' after 'for'.")?;

        let initializer = if self.match_token(TokenType::Semicolon) {
            None
        } else if self.match_token(TokenType::Var) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::Semicolon, "Expected ';' after loop condition.")?;

        let increment = if !self.check(TokenType::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::RightParen, "Expected ')' after for clauses.")?;

        let mut body = self.statement()?;

        if let Some(increment) = increment {
            body = Stmt::Block(vec![body, Stmt::Expression(increment)]);
        }

        let condition = condition.unwrap_or(Expr::Literal(LiteralValue::Bool(true)));
        body = Stmt::While { condition, body: Box::new(body) };

        if let Some(initializer) = initializer {
            body = Stmt::Block(vec![initializer, body]);
        }

        Ok(body)
    }

    fn return_statement(&mut self) -> Result<Stmt, CarbError> {
        let keyword = self.previous();
        let value = if !self.check(TokenType::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::Semicolon, "Expected ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn expression_statement(&mut self) -> Result<Stmt, CarbError> {
        let expr = self.expression()?;
        self.consume(TokenType::Semicolon, "Expected ';' after expression.")?;
        Ok(Stmt::Expression(expr))
    }

    fn block(&mut self) -> Result<Vec<Stmt>, CarbError> {
        let mut statements = Vec::new();
        while !self.check(TokenType::RightBrace) && !self.at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }
        self.consume(TokenType::RightBrace, "Expected '}' after block.")?;
        Ok(statements)
    }

    fn expression(&mut self) -> Result<Expr, CarbError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, CarbError> {
        let expr = self.or_expression()?;

        if self.match_token(TokenType::Equal) {
            let equals = self.previous();
            let value = self.assignment()?;

            return match expr {
                Expr::Variable(name) => Ok(Expr::Assign { name, value: Box::new(value) }),
                Expr::Index { array, index } => {
                    Ok(Expr::IndexAssign { array, index, value: Box::new(value) })
                }
                _ => Err(CarbError::parse("Invalid assignment target.", equals.line, equals.lexeme)),
            };
        }
        Ok(expr)
    }

    fn or_expression(&mut self) -> Result<Expr, CarbError> {
        let mut expr = self.and_expression()?;
        while self.match_token(TokenType::Or) {
            let operator = self.previous();
            let right = self.and_expression()?;
            expr = Expr::Logical { left: Box::new(expr), operator, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn and_expression(&mut self) -> Result<Expr, CarbError> {
        let mut expr = self.equality()?;
        while self.match_token(TokenType::And) {
            let operator = self.previous();
            let right = self.equality()?;
            expr = Expr::Logical { left: Box::new(expr), operator, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, CarbError> {
        let mut expr = self.comparison()?;
        while self.match_any(&[TokenType::BangEqual, TokenType::EqualEqual]) {
            let operator = self.previous();
            let right = self.comparison()?;
            expr = Expr::Binary { left: Box::new(expr), operator, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, CarbError> {
        let mut expr = self.term()?;
        while self.match_any(&[
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Less,
            TokenType::LessEqual,
        ]) {
            let operator = self.previous();
            let right = self.term()?;
            expr = Expr::Binary { left: Box::new(expr), operator, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, CarbError> {
        let mut expr = self.factor()?;
        while self.match_any(&[TokenType::Minus, TokenType::Plus]) {
            let operator = self.previous();
            let right = self.factor()?;
            expr = Expr::Binary { left: Box::new(expr), operator, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, CarbError> {
        let mut expr = self.unary()?;
        while self.match_any(&[TokenType::Slash, TokenType::Star]) {
            let operator = self.previous();
            let right = self.unary()?;
            expr = Expr::Binary { left: Box::new(expr), operator, right: Box::new(right) };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, CarbError> {
        if self.match_any(&[TokenType::Bang, TokenType::Minus]) {
            let operator = self.previous();
            let right = self.unary()?;
            return Ok(Expr::Unary { operator, right: Box::new(right) });
        }
        self.call()
    }

    /// Postfix chains: calls, index access and property access bind tighter
    /// than any operator and can be mixed freely, e.g. `a[0].upper()(1)`.
    fn call(&mut self) -> Result<Expr, CarbError> {
        let mut expr = self.primary()?;

        loop {
            if self.match_token(TokenType::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.match_token(TokenType::LeftBracket) {
                let index = self.expression()?;
                self.consume(TokenType::RightBracket, "Expected ']' after index.")?;
                expr = Expr::Index { array: Box::new(expr), index: Box::new(index) };
            } else if self.match_token(TokenType::Dot) {
                let name = self.consume(TokenType::Identifier, "Expected property name after '.'.")?;
                expr = Expr::Get { object: Box::new(expr), name };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, CarbError> {
        let mut args = Vec::new();
        if !self.check(TokenType::RightParen) {
            loop {
                if args.len() >= 255 {
                    return Err(self.error_at_peek("Can't have more than 255 arguments."));
                }
                args.push(self.expression()?);
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        let paren = self.consume(TokenType::RightParen, "Expected ')' after arguments.")?;
        Ok(Expr::Call { callee: Box::new(callee), paren, args })
    }

    fn primary(&mut self) -> Result<Expr, CarbError> {
        if self.match_token(TokenType::False) {
            return Ok(Expr::Literal(LiteralValue::Bool(false)));
        }
        if self.match_token(TokenType::True) {
            return Ok(Expr::Literal(LiteralValue::Bool(true)));
        }
        if self.match_token(TokenType::Null) {
            return Ok(Expr::Literal(LiteralValue::Null));
        }

        if self.match_token(TokenType::Number) {
            let token = self.previous();
            if let Some(Literal::Number(n)) = token.literal {
                return Ok(Expr::Literal(LiteralValue::Number(n)));
            }
        }
        if self.match_token(TokenType::String) {
            let token = self.previous();
            if let Some(Literal::Str(s)) = token.literal {
                return Ok(Expr::Literal(LiteralValue::Str(s)));
            }
        }

        if self.match_token(TokenType::Identifier) {
            return Ok(Expr::Variable(self.previous()));
        }

        if self.match_token(TokenType::LeftParen) {
            let expr = self.expression()?;
            self.consume(TokenType::RightParen, "Expected a \")\" after expression")?;
            return Ok(Expr::Grouping(Box::new(expr)));
        }

        if self.match_token(TokenType::LeftBracket) {
            let mut elements = Vec::new();
            if !self.check(TokenType::RightBracket) {
                loop {
                    elements.push(self.expression()?);
                    if !self.match_token(TokenType::Comma) {
                        break;
                    }
                }
            }
            self.consume(TokenType::RightBracket, "Expected ']' after array elements.")?;
            return Ok(Expr::ArrayLiteral(elements));
        }

        Err(self.error_at_peek("Expected expression"))
    }

    fn match_token(&mut self, token_type: TokenType) -> bool {
        if self.check(token_type) {
            self.advance();
            return true;
        }
        false
    }

    fn match_any(&mut self, types: &[TokenType]) -> bool {
        for &token_type in types {
            if self.check(token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<Token, CarbError> {
        if self.check(token_type) {
            return Ok(self.advance());
        }
        Err(self.error_at_peek(message))
    }

    fn check(&self, token_type: TokenType) -> bool {
        !self.at_end() && self.peek().token_type == token_type
    }

    fn advance(&mut self) -> Token {
        if !self.at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> Token {
        self.tokens[self.current - 1].clone()
    }

    fn error_at_peek(&self, message: &str) -> CarbError {
        let token = self.peek();
        if token.token_type == TokenType::Eof {
            CarbError::parse_at_end(message, token.line)
        } else {
            CarbError::parse(message, token.line, token.lexeme.clone())
        }
    }

    /// Panic-mode recovery: skip ahead to the next statement boundary so one
    /// bad token does not drown the rest of the file in follow-on errors.
    fn synchronize(&mut self) {
        self.advance();

        while !self.at_end() {
            if self.previous().token_type == TokenType::Semicolon {
                return;
            }
            match self.peek().token_type {
                TokenType::Class
                | TokenType::Function
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::PrintLn
                | TokenType::Return => return,
                _ => {}
            }
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;

    fn parse_source(source: &str) -> (Vec<Stmt>, Vec<CarbError>) {
        let (tokens, scan_errors) = lexer::scan(source);
        assert!(scan_errors.is_empty(), "scan errors: {:?}", scan_errors);
        Parser::new(tokens).parse()
    }

    fn parse_ok(source: &str) -> Vec<Stmt> {
        let (stmts, errors) = parse_source(source);
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        stmts
    }

    #[test]
    fn parses_var_declaration_with_initializer() {
        let stmts = parse_ok("var x = 1 + 2;");
        assert!(matches!(&stmts[0], Stmt::Var { initializer: Some(Expr::Binary { .. }), .. }));
    }

    #[test]
    fn parses_precedence_mul_over_add() {
        let stmts = parse_ok("print(1 + 2 * 3);");
        let Stmt::Print(Expr::Binary { operator, right, .. }) = &stmts[0] else {
            panic!("expected print of binary expression");
        };
        assert_eq!(operator.lexeme, "+");
        assert!(matches!(right.as_ref(), Expr::Binary { .. }));
    }

    #[test]
    fn parses_call_index_and_property_chains() {
        let stmts = parse_ok("a[0].upper();");
        let Stmt::Expression(Expr::Call { callee, .. }) = &stmts[0] else {
            panic!("expected call statement");
        };
        let Expr::Get { object, name } = callee.as_ref() else {
            panic!("expected property access callee");
        };
        assert_eq!(name.lexeme, "upper");
        assert!(matches!(object.as_ref(), Expr::Index { .. }));
    }

    #[test]
    fn index_assignment_becomes_index_assign_node() {
        let stmts = parse_ok("a[1] = 5;");
        assert!(matches!(&stmts[0], Stmt::Expression(Expr::IndexAssign { .. })));
    }

    #[test]
    fn property_assignment_is_rejected() {
        let (_, errors) = parse_source("a.b = 1;");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Invalid assignment target"));
    }

    #[test]
    fn for_desugars_to_while_in_a_block() {
        let stmts = parse_ok("for (var i = 0; i < 3; i = i + 1) { print(i); }");
        let Stmt::Block(parts) = &stmts[0] else { panic!("expected block") };
        assert!(matches!(parts[0], Stmt::Var { .. }));
        assert!(matches!(parts[1], Stmt::While { .. }));
    }

    #[test]
    fn for_without_condition_defaults_to_true() {
        let stmts = parse_ok("for (;;) { }");
        let Stmt::While { condition, .. } = &stmts[0] else { panic!("expected while") };
        assert!(matches!(condition, Expr::Literal(LiteralValue::Bool(true))));
    }

    #[test]
    fn synchronizes_and_reports_multiple_errors() {
        let (stmts, errors) = parse_source("var = 1;\nprint(2);\nvar y 3;\nprint(4);");
        assert_eq!(errors.len(), 2);
        // The two well-formed prints survive recovery
        assert_eq!(stmts.iter().filter(|s| matches!(s, Stmt::Print(_))).count(), 2);
    }

    #[test]
    fn error_at_end_of_input() {
        let (_, errors) = parse_source("print(1;");
        assert!(!errors.is_empty());
    }

    #[test]
    fn parses_function_and_return() {
        let stmts = parse_ok("function add(a, b) { return a + b; }");
        let Stmt::Function { name, params, body } = &stmts[0] else {
            panic!("expected function declaration");
        };
        assert_eq!(name.lexeme, "add");
        assert_eq!(params.len(), 2);
        assert!(matches!(&body[0], Stmt::Return { value: Some(_), .. }));
    }
}

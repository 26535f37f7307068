//! Recursive descent parser producing the AST
//!
//! Errors raised while looking at the end of input are flagged as premature
//! so interactive front ends can keep reading lines.

use bytecode_system::BinaryOp;
use core_types::SyntaxError;

use crate::ast::*;
use crate::error::{premature_end, syntax_error};
use crate::lexer::{Keyword, Lexeme, Lexer, Punctuator, Token};

/// Priority of unary operators
const UNARY_PRIORITY: u8 = 8;

/// Lua parser
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    /// Span of the most recently consumed token
    last_span: Span,
}

impl<'a> Parser<'a> {
    /// Create a new parser for the given source code
    pub fn new(source: &str, chunk_name: &'a str) -> Self {
        Self {
            lexer: Lexer::new(source, chunk_name),
            last_span: Span {
                line: 1,
                column: 1,
                end_line: 1,
                end_column: 1,
            },
        }
    }

    /// Parse a whole chunk
    pub fn parse(&mut self) -> Result<Block, SyntaxError> {
        let block = self.parse_block()?;
        let next = self.peek()?;
        if next.token != Token::EOF {
            let next = next.clone();
            return Err(self.error_at(&next, format!("'<eof>' expected near '{}'", next.token.describe())));
        }
        Ok(block)
    }

    // ------------------------------------------------------------------
    // token helpers
    // ------------------------------------------------------------------

    fn peek(&mut self) -> Result<&Lexeme, SyntaxError> {
        self.lexer.peek_token()
    }

    fn advance(&mut self) -> Result<Lexeme, SyntaxError> {
        let lexeme = self.lexer.next_token()?;
        self.last_span = span_of(&lexeme);
        Ok(lexeme)
    }

    fn check_keyword(&mut self, keyword: Keyword) -> Result<bool, SyntaxError> {
        Ok(self.peek()?.token == Token::Keyword(keyword))
    }

    fn check_punctuator(&mut self, p: Punctuator) -> Result<bool, SyntaxError> {
        Ok(self.peek()?.token == Token::Punctuator(p))
    }

    fn accept_keyword(&mut self, keyword: Keyword) -> Result<bool, SyntaxError> {
        if self.check_keyword(keyword)? {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn accept_punctuator(&mut self, p: Punctuator) -> Result<bool, SyntaxError> {
        if self.check_punctuator(p)? {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<Span, SyntaxError> {
        if self.check_keyword(keyword)? {
            return Ok(span_of(&self.advance()?));
        }
        Err(self.expected(&format!("'{}'", keyword.as_str()))?)
    }

    fn expect_punctuator(&mut self, p: Punctuator) -> Result<Span, SyntaxError> {
        if self.check_punctuator(p)? {
            return Ok(span_of(&self.advance()?));
        }
        Err(self.expected(&format!("'{}'", p.as_str()))?)
    }

    /// Expect the keyword closing a construct opened at `open_line`
    fn expect_match(
        &mut self,
        keyword: Keyword,
        opener: Keyword,
        open_line: usize,
    ) -> Result<Span, SyntaxError> {
        if self.check_keyword(keyword)? {
            return Ok(span_of(&self.advance()?));
        }
        let next = self.peek()?.clone();
        let message = if next.line == open_line {
            format!("'{}' expected near '{}'", keyword.as_str(), next.token.describe())
        } else {
            format!(
                "'{}' expected (to close '{}' at line {}) near '{}'",
                keyword.as_str(),
                opener.as_str(),
                open_line,
                next.token.describe()
            )
        };
        Err(self.error_at(&next, message))
    }

    fn expect_name(&mut self) -> Result<String, SyntaxError> {
        if let Token::Identifier(_) = self.peek()?.token {
            if let Token::Identifier(name) = self.advance()?.token {
                return Ok(name);
            }
        }
        Err(self.expected("<name>")?)
    }

    fn expected(&mut self, what: &str) -> Result<SyntaxError, SyntaxError> {
        let next = self.peek()?.clone();
        Ok(self.error_at(&next, format!("{} expected near '{}'", what, next.token.describe())))
    }

    fn unexpected(&mut self) -> Result<SyntaxError, SyntaxError> {
        let next = self.peek()?.clone();
        Ok(self.error_at(&next, format!("unexpected symbol near '{}'", next.token.describe())))
    }

    fn error_at(&self, at: &Lexeme, message: String) -> SyntaxError {
        if at.token == Token::EOF {
            premature_end(self.lexer.chunk_name(), at.line, at.column, message)
        } else {
            syntax_error(self.lexer.chunk_name(), at.line, at.column, message)
        }
    }

    // ------------------------------------------------------------------
    // statements
    // ------------------------------------------------------------------

    fn block_follows(&mut self) -> Result<bool, SyntaxError> {
        Ok(matches!(
            self.peek()?.token,
            Token::EOF
                | Token::Keyword(Keyword::End)
                | Token::Keyword(Keyword::Else)
                | Token::Keyword(Keyword::ElseIf)
                | Token::Keyword(Keyword::Until)
        ))
    }

    fn parse_block(&mut self) -> Result<Block, SyntaxError> {
        let mut statements = Vec::new();
        loop {
            if self.block_follows()? {
                break;
            }
            if self.check_keyword(Keyword::Return)? {
                statements.push(self.parse_return()?);
                break;
            }
            if self.accept_punctuator(Punctuator::Semicolon)? {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, SyntaxError> {
        let start = span_of(self.peek()?);
        let token = self.peek()?.token.clone();
        match token {
            Token::Keyword(Keyword::If) => self.parse_if(),
            Token::Keyword(Keyword::While) => self.parse_while(),
            Token::Keyword(Keyword::Do) => {
                self.advance()?;
                let body = self.parse_block()?;
                self.expect_match(Keyword::End, Keyword::Do, start.line)?;
                Ok(Statement::Do {
                    body,
                    span: start,
                })
            }
            Token::Keyword(Keyword::For) => self.parse_for(),
            Token::Keyword(Keyword::Repeat) => self.parse_repeat(),
            Token::Keyword(Keyword::Function) => self.parse_function_statement(),
            Token::Keyword(Keyword::Local) => {
                self.advance()?;
                if self.accept_keyword(Keyword::Function)? {
                    self.parse_local_function(start)
                } else {
                    self.parse_local(start)
                }
            }
            Token::Keyword(Keyword::Break) => {
                self.advance()?;
                Ok(Statement::Break { span: start })
            }
            Token::Keyword(Keyword::Goto) | Token::Punctuator(Punctuator::DoubleColon) => {
                let next = self.peek()?.clone();
                Err(self.error_at(&next, "goto and labels are not supported".to_string()))
            }
            _ => self.parse_expression_statement(start),
        }
    }

    fn parse_return(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect_keyword(Keyword::Return)?;
        let values = if self.block_follows()? || self.check_punctuator(Punctuator::Semicolon)? {
            Vec::new()
        } else {
            self.parse_expression_list()?
        };
        self.accept_punctuator(Punctuator::Semicolon)?;
        Ok(Statement::Return {
            values,
            span: start.to(self.last_span),
        })
    }

    fn parse_if(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect_keyword(Keyword::If)?;
        let mut clauses = Vec::new();

        let condition = self.parse_expression()?;
        self.expect_keyword(Keyword::Then)?;
        let header = start.to(self.last_span);
        let body = self.parse_block()?;
        clauses.push((condition, body, header));

        let mut else_block = None;
        loop {
            if self.check_keyword(Keyword::ElseIf)? {
                let clause_start = span_of(&self.advance()?);
                let condition = self.parse_expression()?;
                self.expect_keyword(Keyword::Then)?;
                let header = clause_start.to(self.last_span);
                let body = self.parse_block()?;
                clauses.push((condition, body, header));
            } else if self.accept_keyword(Keyword::Else)? {
                else_block = Some(self.parse_block()?);
                self.expect_match(Keyword::End, Keyword::If, start.line)?;
                break;
            } else {
                self.expect_match(Keyword::End, Keyword::If, start.line)?;
                break;
            }
        }

        let span = clauses[0].2;
        Ok(Statement::If {
            clauses,
            else_block,
            span,
        })
    }

    fn parse_while(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect_keyword(Keyword::While)?;
        let condition = self.parse_expression()?;
        self.expect_keyword(Keyword::Do)?;
        let span = start.to(self.last_span);
        let body = self.parse_block()?;
        let end_span = self.expect_match(Keyword::End, Keyword::While, start.line)?;
        Ok(Statement::While {
            condition,
            body,
            span,
            end_span,
        })
    }

    fn parse_repeat(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect_keyword(Keyword::Repeat)?;
        let body = self.parse_block()?;
        let until = self.expect_match(Keyword::Until, Keyword::Repeat, start.line)?;
        let condition = self.parse_expression()?;
        Ok(Statement::Repeat {
            body,
            condition,
            span: until.to(self.last_span),
        })
    }

    fn parse_for(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect_keyword(Keyword::For)?;
        let first = self.expect_name()?;

        if self.accept_punctuator(Punctuator::Assign)? {
            let from = self.parse_expression()?;
            self.expect_punctuator(Punctuator::Comma)?;
            let limit = self.parse_expression()?;
            let step = if self.accept_punctuator(Punctuator::Comma)? {
                Some(self.parse_expression()?)
            } else {
                None
            };
            self.expect_keyword(Keyword::Do)?;
            let span = start.to(self.last_span);
            let body = self.parse_block()?;
            let end_span = self.expect_match(Keyword::End, Keyword::For, start.line)?;
            return Ok(Statement::NumericFor {
                var: first,
                start: from,
                limit,
                step,
                body,
                span,
                end_span,
            });
        }

        let mut names = vec![first];
        while self.accept_punctuator(Punctuator::Comma)? {
            names.push(self.expect_name()?);
        }
        if !self.check_keyword(Keyword::In)? {
            return Err(self.expected("'=' or 'in'")?);
        }
        self.advance()?;
        let exprs = self.parse_expression_list()?;
        self.expect_keyword(Keyword::Do)?;
        let span = start.to(self.last_span);
        let body = self.parse_block()?;
        let end_span = self.expect_match(Keyword::End, Keyword::For, start.line)?;
        Ok(Statement::GenericFor {
            names,
            exprs,
            body,
            span,
            end_span,
        })
    }

    fn parse_function_statement(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect_keyword(Keyword::Function)?;
        let mut path = vec![self.expect_name()?];
        while self.accept_punctuator(Punctuator::Dot)? {
            path.push(self.expect_name()?);
        }
        let method = if self.accept_punctuator(Punctuator::Colon)? {
            Some(self.expect_name()?)
        } else {
            None
        };

        let mut name = path.join(".");
        if let Some(m) = &method {
            name.push(':');
            name.push_str(m);
        }
        let func = self.parse_function_body(start, name, method.is_some())?;
        Ok(Statement::Function {
            path,
            method,
            span: func.span,
            func,
        })
    }

    fn parse_local_function(&mut self, start: Span) -> Result<Statement, SyntaxError> {
        let name = self.expect_name()?;
        let func = self.parse_function_body(start, name.clone(), false)?;
        Ok(Statement::LocalFunction {
            name,
            span: func.span,
            func,
        })
    }

    fn parse_local(&mut self, start: Span) -> Result<Statement, SyntaxError> {
        let mut names = Vec::new();
        loop {
            names.push(self.expect_name()?);
            // attribs such as <const> are accepted and ignored
            if self.accept_punctuator(Punctuator::Lt)? {
                self.expect_name()?;
                self.expect_punctuator(Punctuator::Gt)?;
            }
            if !self.accept_punctuator(Punctuator::Comma)? {
                break;
            }
        }
        let values = if self.accept_punctuator(Punctuator::Assign)? {
            self.parse_expression_list()?
        } else {
            Vec::new()
        };
        Ok(Statement::Local {
            names,
            values,
            span: start.to(self.last_span),
        })
    }

    fn parse_expression_statement(&mut self, start: Span) -> Result<Statement, SyntaxError> {
        let first = self.parse_suffixed_expression()?;

        if self.check_punctuator(Punctuator::Assign)? || self.check_punctuator(Punctuator::Comma)? {
            let mut targets = vec![first];
            while self.accept_punctuator(Punctuator::Comma)? {
                targets.push(self.parse_suffixed_expression()?);
            }
            if targets.iter().any(|t| !t.is_assignable()) {
                return Err(self.syntax_error_near()?);
            }
            self.expect_punctuator(Punctuator::Assign)?;
            let values = self.parse_expression_list()?;
            return Ok(Statement::Assign {
                targets,
                values,
                span: start.to(self.last_span),
            });
        }

        match first {
            Expression::Call { .. } | Expression::MethodCall { .. } => Ok(Statement::Call {
                call: first,
                span: start.to(self.last_span),
            }),
            _ => Err(self.syntax_error_near()?),
        }
    }

    fn syntax_error_near(&mut self) -> Result<SyntaxError, SyntaxError> {
        let next = self.peek()?.clone();
        Ok(self.error_at(&next, format!("syntax error near '{}'", next.token.describe())))
    }

    // ------------------------------------------------------------------
    // functions
    // ------------------------------------------------------------------

    /// Parse `(params) body end`; `start` is the span of the `function`
    /// keyword
    fn parse_function_body(
        &mut self,
        start: Span,
        name: String,
        is_method: bool,
    ) -> Result<FunctionBody, SyntaxError> {
        let mut params = Vec::new();
        if is_method {
            params.push("self".to_string());
        }
        let mut is_vararg = false;

        self.expect_punctuator(Punctuator::LParen)?;
        if !self.check_punctuator(Punctuator::RParen)? {
            loop {
                if self.accept_punctuator(Punctuator::Ellipsis)? {
                    is_vararg = true;
                    break;
                }
                params.push(self.expect_name()?);
                if !self.accept_punctuator(Punctuator::Comma)? {
                    break;
                }
            }
        }
        self.expect_punctuator(Punctuator::RParen)?;
        let span = start.to(self.last_span);

        let body = self.parse_block()?;
        let end_span = self.expect_match(Keyword::End, Keyword::Function, start.line)?;

        Ok(FunctionBody {
            name,
            params,
            is_vararg,
            body,
            span,
            end_span,
        })
    }

    // ------------------------------------------------------------------
    // expressions
    // ------------------------------------------------------------------

    fn parse_expression_list(&mut self) -> Result<Vec<Expression>, SyntaxError> {
        let mut exprs = vec![self.parse_expression()?];
        while self.accept_punctuator(Punctuator::Comma)? {
            exprs.push(self.parse_expression()?);
        }
        Ok(exprs)
    }

    /// Parse an expression
    pub fn parse_expression(&mut self) -> Result<Expression, SyntaxError> {
        self.parse_subexpression(0)
    }

    /// Precedence climbing: parse operators binding tighter than `limit`
    fn parse_subexpression(&mut self, limit: u8) -> Result<Expression, SyntaxError> {
        let unary = match self.peek()?.token {
            Token::Keyword(Keyword::Not) => Some(UnaryOp::Not),
            Token::Punctuator(Punctuator::Minus) => Some(UnaryOp::Neg),
            Token::Punctuator(Punctuator::Hash) => Some(UnaryOp::Len),
            _ => None,
        };

        let mut left = if let Some(op) = unary {
            self.advance()?;
            let operand = self.parse_subexpression(UNARY_PRIORITY)?;
            fold_unary(op, operand)
        } else {
            self.parse_simple_expression()?
        };

        loop {
            let op = match binary_operator(&self.peek()?.token) {
                Some(op) => op,
                None => break,
            };
            let (left_priority, right_priority) = op.priority();
            if left_priority <= limit {
                break;
            }
            self.advance()?;
            let right = self.parse_subexpression(right_priority)?;
            left = op.build(left, right);
        }
        Ok(left)
    }

    fn parse_simple_expression(&mut self) -> Result<Expression, SyntaxError> {
        let token = self.peek()?.token.clone();
        let expr = match token {
            Token::Number(n) => Expression::Number(n),
            Token::String(s) => Expression::String(s),
            Token::Keyword(Keyword::Nil) => Expression::Nil,
            Token::Keyword(Keyword::True) => Expression::Boolean(true),
            Token::Keyword(Keyword::False) => Expression::Boolean(false),
            Token::Punctuator(Punctuator::Ellipsis) => Expression::VarArgs,
            Token::Punctuator(Punctuator::LBrace) => return self.parse_table(),
            Token::Keyword(Keyword::Function) => {
                let start = span_of(&self.advance()?);
                let name = format!("function@{}", start.line);
                let body = self.parse_function_body(start, name, false)?;
                return Ok(Expression::Function(Box::new(body)));
            }
            _ => return self.parse_suffixed_expression(),
        };
        self.advance()?;
        Ok(expr)
    }

    fn parse_primary_expression(&mut self) -> Result<Expression, SyntaxError> {
        let token = self.peek()?.token.clone();
        match token {
            Token::Identifier(name) => {
                self.advance()?;
                Ok(Expression::Name(name))
            }
            Token::Punctuator(Punctuator::LParen) => {
                let open = span_of(&self.advance()?);
                let inner = self.parse_expression()?;
                if !self.check_punctuator(Punctuator::RParen)? {
                    let next = self.peek()?.clone();
                    let message = if next.line == open.line {
                        format!("')' expected near '{}'", next.token.describe())
                    } else {
                        format!(
                            "')' expected (to close '(' at line {}) near '{}'",
                            open.line,
                            next.token.describe()
                        )
                    };
                    return Err(self.error_at(&next, message));
                }
                self.advance()?;
                Ok(Expression::Paren(Box::new(inner)))
            }
            _ => Err(self.unexpected()?),
        }
    }

    fn parse_suffixed_expression(&mut self) -> Result<Expression, SyntaxError> {
        let primary = self.parse_primary_expression()?;
        self.continue_suffixed(primary)
    }

    fn parse_call_arguments(&mut self) -> Result<Vec<Expression>, SyntaxError> {
        let token = self.peek()?.token.clone();
        match token {
            Token::String(s) => {
                self.advance()?;
                Ok(vec![Expression::String(s)])
            }
            Token::Punctuator(Punctuator::LBrace) => Ok(vec![self.parse_table()?]),
            Token::Punctuator(Punctuator::LParen) => {
                self.advance()?;
                let args = if self.check_punctuator(Punctuator::RParen)? {
                    Vec::new()
                } else {
                    self.parse_expression_list()?
                };
                self.expect_punctuator(Punctuator::RParen)?;
                Ok(args)
            }
            _ => Err(self.expected("function arguments")?),
        }
    }

    fn parse_table(&mut self) -> Result<Expression, SyntaxError> {
        let open = self.expect_punctuator(Punctuator::LBrace)?;
        let mut fields = Vec::new();

        loop {
            if self.check_punctuator(Punctuator::RBrace)? {
                break;
            }
            fields.push(self.parse_table_field()?);
            if !self.accept_punctuator(Punctuator::Comma)?
                && !self.accept_punctuator(Punctuator::Semicolon)?
            {
                break;
            }
        }

        if !self.check_punctuator(Punctuator::RBrace)? {
            let next = self.peek()?.clone();
            let message = if next.line == open.line {
                format!("'}}' expected near '{}'", next.token.describe())
            } else {
                format!(
                    "'}}' expected (to close '{{' at line {}) near '{}'",
                    open.line,
                    next.token.describe()
                )
            };
            return Err(self.error_at(&next, message));
        }
        self.advance()?;
        Ok(Expression::Table(fields))
    }

    fn parse_table_field(&mut self) -> Result<TableField, SyntaxError> {
        if self.accept_punctuator(Punctuator::LBracket)? {
            let key = self.parse_expression()?;
            self.expect_punctuator(Punctuator::RBracket)?;
            self.expect_punctuator(Punctuator::Assign)?;
            let value = self.parse_expression()?;
            return Ok(TableField::Keyed(key, value));
        }

        if let Token::Identifier(name) = self.peek()?.token.clone() {
            // `name = value` needs one token of extra lookahead; the lexer
            // only buffers one, so consume the name and rebuild the
            // expression when it turns out to be positional.
            self.advance()?;
            if self.accept_punctuator(Punctuator::Assign)? {
                let value = self.parse_expression()?;
                return Ok(TableField::Named(name, value));
            }
            let expr = self.continue_from_name(name)?;
            return Ok(TableField::Positional(expr));
        }

        Ok(TableField::Positional(self.parse_expression()?))
    }

    /// Finish parsing an expression whose leading identifier was already
    /// consumed
    fn continue_from_name(&mut self, name: String) -> Result<Expression, SyntaxError> {
        let mut left = self.continue_suffixed(Expression::Name(name))?;
        loop {
            let op = match binary_operator(&self.peek()?.token) {
                Some(op) => op,
                None => break,
            };
            let (_, right_priority) = op.priority();
            self.advance()?;
            let right = self.parse_subexpression(right_priority)?;
            left = op.build(left, right);
        }
        Ok(left)
    }

    fn continue_suffixed(&mut self, mut expr: Expression) -> Result<Expression, SyntaxError> {
        loop {
            let token = self.peek()?.token.clone();
            match token {
                Token::Punctuator(Punctuator::Dot) => {
                    self.advance()?;
                    let key = self.expect_name()?;
                    expr = Expression::Index {
                        object: Box::new(expr),
                        key: Box::new(Expression::String(key)),
                    };
                }
                Token::Punctuator(Punctuator::LBracket) => {
                    self.advance()?;
                    let key = self.parse_expression()?;
                    self.expect_punctuator(Punctuator::RBracket)?;
                    expr = Expression::Index {
                        object: Box::new(expr),
                        key: Box::new(key),
                    };
                }
                Token::Punctuator(Punctuator::Colon) => {
                    self.advance()?;
                    let method = self.expect_name()?;
                    let args = self.parse_call_arguments()?;
                    expr = Expression::MethodCall {
                        object: Box::new(expr),
                        method,
                        args,
                    };
                }
                Token::Punctuator(Punctuator::LParen)
                | Token::Punctuator(Punctuator::LBrace)
                | Token::String(_) => {
                    let args = self.parse_call_arguments()?;
                    expr = Expression::Call {
                        func: Box::new(expr),
                        args,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }
}

/// Binary operators as seen by the precedence climber
#[derive(Debug, Clone, Copy)]
enum InfixOp {
    Arith(BinaryOp),
    Logic(LogicalOp),
}

impl InfixOp {
    /// Left and right binding priorities
    fn priority(self) -> (u8, u8) {
        match self {
            InfixOp::Logic(LogicalOp::Or) => (1, 1),
            InfixOp::Logic(LogicalOp::And) => (2, 2),
            InfixOp::Arith(op) => match op {
                BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge => (3, 3),
                BinaryOp::Concat => (5, 4),
                BinaryOp::Add | BinaryOp::Sub => (6, 6),
                BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => (7, 7),
                BinaryOp::Pow => (10, 9),
            },
        }
    }

    fn build(self, left: Expression, right: Expression) -> Expression {
        match self {
            InfixOp::Arith(op) => Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            InfixOp::Logic(op) => Expression::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        }
    }
}

fn binary_operator(token: &Token) -> Option<InfixOp> {
    let op = match token {
        Token::Keyword(Keyword::And) => return Some(InfixOp::Logic(LogicalOp::And)),
        Token::Keyword(Keyword::Or) => return Some(InfixOp::Logic(LogicalOp::Or)),
        Token::Punctuator(p) => match p {
            Punctuator::Plus => BinaryOp::Add,
            Punctuator::Minus => BinaryOp::Sub,
            Punctuator::Star => BinaryOp::Mul,
            Punctuator::Slash => BinaryOp::Div,
            Punctuator::Percent => BinaryOp::Mod,
            Punctuator::Caret => BinaryOp::Pow,
            Punctuator::Concat => BinaryOp::Concat,
            Punctuator::EqEq => BinaryOp::Eq,
            Punctuator::NotEq => BinaryOp::Ne,
            Punctuator::Lt => BinaryOp::Lt,
            Punctuator::LtEq => BinaryOp::Le,
            Punctuator::Gt => BinaryOp::Gt,
            Punctuator::GtEq => BinaryOp::Ge,
            _ => return None,
        },
        _ => return None,
    };
    Some(InfixOp::Arith(op))
}

/// Negative numeric literals are folded so `-1` is a constant
fn fold_unary(op: UnaryOp, operand: Expression) -> Expression {
    match (op, operand) {
        (UnaryOp::Neg, Expression::Number(n)) => Expression::Number(-n),
        (op, operand) => Expression::Unary {
            op,
            operand: Box::new(operand),
        },
    }
}

fn span_of(lexeme: &Lexeme) -> Span {
    Span {
        line: lexeme.line,
        column: lexeme.column,
        end_line: lexeme.end_line,
        end_column: lexeme.end_column,
    }
}

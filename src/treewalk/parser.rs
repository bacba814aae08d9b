use std::mem;
use std::rc::Rc;

use tracing::trace;

use crate::error::ErrorSink;
use crate::scanner::{Token, TokenType};

use super::expr::{Expr, ExprIds, LiteralValue};
use super::stmt::{FunctionDecl, Stmt};

const MAX_ARGUMENTS: usize = 255;

// The error itself has already been reported by the time this is returned.
#[derive(Debug)]
struct ParseError;

type StmtResult = Result<Stmt, ParseError>;
type ExprResult = Result<Expr, ParseError>;

/// Parse a token stream into statements. Statements that fail to parse are reported
/// and dropped; parsing picks up again at the next statement boundary.
pub fn parse(tokens: &[Token], ids: &mut ExprIds, errors: &mut ErrorSink) -> Vec<Stmt> {
    let mut cursor = TokenCursor::new(tokens, ids, errors);
    let mut statements = Vec::new();

    while !cursor.at_end() {
        if let Some(statement) = declaration(&mut cursor) {
            statements.push(statement);
        }
    }

    trace!(count = statements.len(), "parsed statements");
    statements
}

fn declaration(cursor: &mut TokenCursor) -> Option<Stmt> {
    let result = if cursor.advance_if_match(TokenType::Fun).is_some() {
        function_declaration(cursor)
    } else if cursor.advance_if_match(TokenType::Store).is_some() {
        var_declaration(cursor)
    } else {
        statement(cursor)
    };

    match result {
        Ok(statement) => Some(statement),
        Err(ParseError) => {
            cursor.synchronize();
            None
        }
    }
}

fn function_declaration(cursor: &mut TokenCursor) -> StmtResult {
    let name = cursor.consume(TokenType::Identifier, "Expect function name.")?;
    cursor.consume(TokenType::LeftParen, "Expect '(' after function name.")?;

    let mut params = Vec::new();
    if !cursor.check(TokenType::RightParen) {
        loop {
            if params.len() >= MAX_ARGUMENTS {
                cursor.error_at_current("Can't have more than 255 parameters.");
            }
            params.push(cursor.consume(TokenType::Identifier, "Expect parameter name.")?);
            if cursor.advance_if_match(TokenType::Comma).is_none() {
                break;
            }
        }
    }
    cursor.consume(TokenType::RightParen, "Expect ')' after parameters.")?;
    cursor.consume(TokenType::LeftBrace, "Expect '{' before function body.")?;

    // loops around a declaration don't extend into its body
    let enclosing_depth = mem::replace(&mut cursor.loop_depth, 0);
    let body = block(cursor);
    cursor.loop_depth = enclosing_depth;

    Ok(Stmt::Function(Rc::new(FunctionDecl {
        name,
        params,
        body: body?,
    })))
}

fn var_declaration(cursor: &mut TokenCursor) -> StmtResult {
    let name = cursor.consume(TokenType::Identifier, "Expect variable name.")?;

    let initializer = if cursor.advance_if_match(TokenType::Equal).is_some() {
        Some(expression(cursor)?)
    } else {
        None
    };

    cursor.consume(TokenType::Semicolon, "Expect ';' after variable declaration.")?;
    Ok(Stmt::Var { name, initializer })
}

fn statement(cursor: &mut TokenCursor) -> StmtResult {
    let starters = [
        TokenType::If,
        TokenType::Break,
        TokenType::Continue,
        TokenType::While,
        TokenType::For,
        TokenType::Print,
        TokenType::Return,
        TokenType::LeftBrace,
    ];

    if let Some(token) = cursor.advance_if_any_match(&starters) {
        match token.token_type {
            TokenType::If => if_statement(cursor),
            TokenType::Break => break_statement(token, cursor),
            TokenType::Continue => continue_statement(token, cursor),
            TokenType::While => while_statement(cursor),
            TokenType::For => for_statement(cursor),
            TokenType::Print => print_statement(cursor),
            TokenType::Return => return_statement(token, cursor),
            _ => Ok(Stmt::Block {
                statements: block(cursor)?,
            }),
        }
    } else {
        expression_statement(cursor)
    }
}

fn if_statement(cursor: &mut TokenCursor) -> StmtResult {
    cursor.consume(TokenType::LeftParen, "Expect '(' after 'if'.")?;
    let condition = expression(cursor)?;
    cursor.consume(TokenType::RightParen, "Expect ')' after if condition.")?;

    let then_branch = Box::new(statement(cursor)?);
    let else_branch = if cursor.advance_if_match(TokenType::Else).is_some() {
        Some(Box::new(statement(cursor)?))
    } else {
        None
    };

    Ok(Stmt::If {
        condition,
        then_branch,
        else_branch,
    })
}

fn break_statement(keyword: Token, cursor: &mut TokenCursor) -> StmtResult {
    if cursor.loop_depth == 0 {
        cursor.error(&keyword, "Cannot use 'break' outside of a loop.");
    }
    cursor.consume(TokenType::Semicolon, "Expect ';' after 'break'.")?;
    Ok(Stmt::Break { keyword })
}

fn continue_statement(keyword: Token, cursor: &mut TokenCursor) -> StmtResult {
    if cursor.loop_depth == 0 {
        cursor.error(&keyword, "Cannot use 'continue' outside of a loop.");
    }
    cursor.consume(TokenType::Semicolon, "Expect ';' after 'continue'.")?;
    Ok(Stmt::Continue { keyword })
}

fn while_statement(cursor: &mut TokenCursor) -> StmtResult {
    cursor.consume(TokenType::LeftParen, "Expect '(' after 'while'.")?;
    let condition = expression(cursor)?;
    cursor.consume(TokenType::RightParen, "Expect ')' after condition.")?;

    let body = loop_body(cursor)?;

    Ok(Stmt::While {
        condition,
        body: Box::new(body),
        increment: false,
    })
}

// for (initializer; condition; increment) body
// becomes
// { initializer; while (condition) { body; increment; } }
fn for_statement(cursor: &mut TokenCursor) -> StmtResult {
    cursor.consume(TokenType::LeftParen, "Expect '(' after 'for'.")?;

    let initializer = if cursor.advance_if_match(TokenType::Semicolon).is_some() {
        None
    } else if cursor.advance_if_match(TokenType::Store).is_some() {
        Some(var_declaration(cursor)?)
    } else {
        Some(expression_statement(cursor)?)
    };

    let condition = if cursor.check(TokenType::Semicolon) {
        None
    } else {
        Some(expression(cursor)?)
    };
    cursor.consume(TokenType::Semicolon, "Expect ';' after loop condition.")?;

    let increment = if cursor.check(TokenType::RightParen) {
        None
    } else {
        Some(expression(cursor)?)
    };
    cursor.consume(TokenType::RightParen, "Expect ')' after for clauses.")?;

    let body = loop_body(cursor)?;

    let (body, has_increment) = match increment {
        Some(increment) => (
            Stmt::Block {
                statements: vec![body, Stmt::Expression { expression: increment }],
            },
            true,
        ),
        None => (body, false),
    };

    let condition = condition.unwrap_or(Expr::Literal {
        value: LiteralValue::Boolean(true),
    });

    let while_loop = Stmt::While {
        condition,
        body: Box::new(body),
        increment: has_increment,
    };

    Ok(match initializer {
        Some(initializer) => Stmt::Block {
            statements: vec![initializer, while_loop],
        },
        None => while_loop,
    })
}

fn loop_body(cursor: &mut TokenCursor) -> StmtResult {
    cursor.loop_depth += 1;
    let body = statement(cursor);
    cursor.loop_depth -= 1;
    body
}

fn print_statement(cursor: &mut TokenCursor) -> StmtResult {
    let expression = expression(cursor)?;
    cursor.consume(TokenType::Semicolon, "Expect ';' after value.")?;
    Ok(Stmt::Print { expression })
}

fn return_statement(keyword: Token, cursor: &mut TokenCursor) -> StmtResult {
    let value = if cursor.check(TokenType::Semicolon) {
        None
    } else {
        Some(expression(cursor)?)
    };
    cursor.consume(TokenType::Semicolon, "Expect ';' after return value.")?;
    Ok(Stmt::Return { keyword, value })
}

fn expression_statement(cursor: &mut TokenCursor) -> StmtResult {
    let expression = expression(cursor)?;
    cursor.consume(TokenType::Semicolon, "Expect ';' after expression.")?;
    Ok(Stmt::Expression { expression })
}

fn block(cursor: &mut TokenCursor) -> Result<Vec<Stmt>, ParseError> {
    let mut statements = Vec::new();
    while !cursor.check(TokenType::RightBrace) && !cursor.at_end() {
        if let Some(statement) = declaration(cursor) {
            statements.push(statement);
        }
    }
    cursor.consume(TokenType::RightBrace, "Expect '}' after block.")?;
    Ok(statements)
}

fn expression(cursor: &mut TokenCursor) -> ExprResult {
    assignment(cursor)
}

fn assignment(cursor: &mut TokenCursor) -> ExprResult {
    let expr = logic_or(cursor)?;

    if let Some(equals) = cursor.advance_if_match(TokenType::Equal) {
        let value = assignment(cursor)?;

        return match expr {
            Expr::Variable { name, .. } => Ok(Expr::Assign {
                id: cursor.ids.next_id(),
                name,
                value: Box::new(value),
            }),
            _ => {
                // reported, but not worth synchronizing over
                cursor.error(&equals, "Invalid assignment target.");
                Ok(value)
            }
        };
    }

    Ok(expr)
}

fn logic_or(cursor: &mut TokenCursor) -> ExprResult {
    left_associative(cursor, logic_and, &[TokenType::Or], logical_expr)
}

fn logic_and(cursor: &mut TokenCursor) -> ExprResult {
    left_associative(cursor, ternary, &[TokenType::And], logical_expr)
}

fn ternary(cursor: &mut TokenCursor) -> ExprResult {
    let condition = equality(cursor)?;

    if cursor.advance_if_match(TokenType::Question).is_some() {
        let then_branch = equality(cursor)?;
        cursor.consume(TokenType::Colon, "Expect ':' after expression.")?;
        let else_branch = equality(cursor)?;
        return Ok(Expr::Ternary {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        });
    }

    Ok(condition)
}

fn equality(cursor: &mut TokenCursor) -> ExprResult {
    left_associative(
        cursor,
        comparison,
        &[TokenType::BangEqual, TokenType::EqualEqual],
        binary_expr,
    )
}

fn comparison(cursor: &mut TokenCursor) -> ExprResult {
    left_associative(
        cursor,
        term,
        &[
            TokenType::Greater,
            TokenType::GreaterEqual,
            TokenType::Less,
            TokenType::LessEqual,
        ],
        binary_expr,
    )
}

fn term(cursor: &mut TokenCursor) -> ExprResult {
    left_associative(cursor, factor, &[TokenType::Minus, TokenType::Plus], binary_expr)
}

fn factor(cursor: &mut TokenCursor) -> ExprResult {
    left_associative(cursor, unary, &[TokenType::Slash, TokenType::Star], binary_expr)
}

// Parse a left associative expression as long as the current token matches one of the given types
fn left_associative(
    cursor: &mut TokenCursor,
    higher_precedence: fn(&mut TokenCursor) -> ExprResult,
    types: &[TokenType],
    build: fn(Expr, Token, Expr) -> Expr,
) -> ExprResult {
    let mut expr = higher_precedence(cursor)?;

    while let Some(operator) = cursor.advance_if_any_match(types) {
        let right = higher_precedence(cursor)?;
        expr = build(expr, operator, right);
    }

    Ok(expr)
}

fn binary_expr(left: Expr, operator: Token, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        operator,
        right: Box::new(right),
    }
}

fn logical_expr(left: Expr, operator: Token, right: Expr) -> Expr {
    Expr::Logical {
        left: Box::new(left),
        operator,
        right: Box::new(right),
    }
}

fn unary(cursor: &mut TokenCursor) -> ExprResult {
    if let Some(operator) = cursor.advance_if_any_match(&[TokenType::Bang, TokenType::Minus]) {
        let right = unary(cursor)?;
        return Ok(Expr::Unary {
            operator,
            right: Box::new(right),
        });
    }

    call(cursor)
}

fn call(cursor: &mut TokenCursor) -> ExprResult {
    let mut expr = primary(cursor)?;

    while cursor.advance_if_match(TokenType::LeftParen).is_some() {
        expr = finish_call(expr, cursor)?;
    }

    Ok(expr)
}

fn finish_call(callee: Expr, cursor: &mut TokenCursor) -> ExprResult {
    let mut arguments = Vec::new();
    if !cursor.check(TokenType::RightParen) {
        loop {
            if arguments.len() >= MAX_ARGUMENTS {
                cursor.error_at_current("Can't have more than 255 arguments.");
            }
            arguments.push(expression(cursor)?);
            if cursor.advance_if_match(TokenType::Comma).is_none() {
                break;
            }
        }
    }

    let paren = cursor.consume(TokenType::RightParen, "Expect ')' after arguments.")?;

    Ok(Expr::Call {
        callee: Box::new(callee),
        paren,
        arguments,
    })
}

fn primary(cursor: &mut TokenCursor) -> ExprResult {
    let current = cursor.peek().clone();

    let expr = match current.token_type {
        TokenType::False => Expr::Literal {
            value: LiteralValue::Boolean(false),
        },
        TokenType::True => Expr::Literal {
            value: LiteralValue::Boolean(true),
        },
        TokenType::Nil => Expr::Literal {
            value: LiteralValue::Nil,
        },
        TokenType::Number | TokenType::String => Expr::Literal {
            value: current.literal.clone().unwrap_or(LiteralValue::Nil),
        },
        TokenType::Identifier => Expr::Variable {
            id: cursor.ids.next_id(),
            name: current,
        },
        TokenType::LeftParen => {
            cursor.advance();
            let expr = expression(cursor)?;
            cursor.consume(TokenType::RightParen, "Expect ')' after expression.")?;
            return Ok(Expr::Grouping {
                expression: Box::new(expr),
            });
        }
        _ => return Err(cursor.error_at_current("Expect expression.")),
    };

    cursor.advance();
    Ok(expr)
}

struct TokenCursor<'a, 'r> {
    tokens: &'a [Token],
    index: usize,
    ids: &'a mut ExprIds,
    errors: &'a mut ErrorSink<'r>,
    loop_depth: usize,
}

impl<'a, 'r> TokenCursor<'a, 'r> {
    fn new(tokens: &'a [Token], ids: &'a mut ExprIds, errors: &'a mut ErrorSink<'r>) -> TokenCursor<'a, 'r> {
        TokenCursor {
            tokens,
            index: 0,
            ids,
            errors,
            loop_depth: 0,
        }
    }

    // A stream without a trailing EOF ends on its last token.
    fn peek(&self) -> &Token {
        let index = self.index.min(self.tokens.len().saturating_sub(1));
        &self.tokens[index]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.index.saturating_sub(1)]
    }

    fn advance(&mut self) -> Token {
        if !self.at_end() {
            self.index += 1;
        }
        self.previous().clone()
    }

    fn at_end(&self) -> bool {
        // a well formed stream ends in EOF, running off the end counts as well
        self.tokens
            .get(self.index)
            .map_or(true, |token| token.token_type == TokenType::EOF)
    }

    fn check(&self, token_type: TokenType) -> bool {
        !self.at_end() && self.peek().token_type == token_type
    }

    fn advance_if_match(&mut self, token_type: TokenType) -> Option<Token> {
        if self.check(token_type) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn advance_if_any_match(&mut self, types: &[TokenType]) -> Option<Token> {
        if !self.at_end() && types.contains(&self.peek().token_type) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<Token, ParseError> {
        self.advance_if_match(token_type)
            .ok_or_else(|| self.error_at_current(message))
    }

    fn error(&mut self, token: &Token, message: &str) -> ParseError {
        self.errors.error_at(token, message);
        ParseError
    }

    fn error_at_current(&mut self, message: &str) -> ParseError {
        let tokens = self.tokens;
        let index = self.index.min(tokens.len().saturating_sub(1));
        match tokens.get(index) {
            Some(token) => self.errors.error_at(token, message),
            None => self.errors.error(0, message),
        }
        ParseError
    }

    // Skip tokens until something that looks like the start of a new statement.
    fn synchronize(&mut self) {
        self.advance();

        while !self.at_end() {
            if self.previous().token_type == TokenType::Semicolon {
                return;
            }

            match self.peek().token_type {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Store
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => {
                    self.advance();
                }
            }
        }
    }
}

//! Pratt parser producing the statement list for a snippet.

use super::ExecutionFault;
use super::lexer::{Spanned, Token, line_of, tokenize};
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtEq => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtEq => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// A comparison chain such as `a < b <= c`.
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Assign(String, Expr),
    /// `name op= value`
    Update(String, BinOp, Expr),
}

// Binding powers, loosest first.
const BP_OR: u8 = 2;
const BP_AND: u8 = 4;
const BP_NOT: u8 = 6;
const BP_CMP: u8 = 8;
const BP_SUM: u8 = 10;
const BP_PRODUCT: u8 = 12;
const BP_UNARY: u8 = 14;
const BP_POW: u8 = 16;
const BP_POSTFIX: u8 = 18;

/// Maximum expression nesting, keeping recursion well inside a thread's stack.
const MAX_DEPTH: usize = 200;

/// Parse a complete source text into statements.
pub fn parse(source: &str) -> Result<Vec<Stmt>, ExecutionFault> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        depth: 0,
    };
    parser.program()
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(token, _)| token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(token, _)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl AsRef<str>) -> ExecutionFault {
        let line = match self.tokens.get(self.pos) {
            Some((_, span)) => line_of(self.source, span.start),
            None => line_of(self.source, self.source.len()),
        };
        ExecutionFault::syntax(format!("{} (line {line})", message.as_ref()))
    }

    fn unexpected(&self) -> ExecutionFault {
        match self.peek() {
            Some(token) => self.error(format!("unexpected {}", token.describe())),
            None => self.error("unexpected end of input"),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExecutionFault> {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn at_separator(&self) -> bool {
        matches!(self.peek(), Some(Token::Newline | Token::Semicolon))
    }

    fn program(&mut self) -> Result<Vec<Stmt>, ExecutionFault> {
        let mut stmts = Vec::new();
        loop {
            while self.at_separator() {
                self.pos += 1;
            }
            if self.peek().is_none() {
                return Ok(stmts);
            }
            stmts.push(self.statement()?);
            if self.peek().is_some() && !self.at_separator() {
                return Err(self.unexpected());
            }
        }
    }

    fn statement(&mut self) -> Result<Stmt, ExecutionFault> {
        if let Some(Token::Name(name)) = self.peek() {
            let name = name.clone();
            let update = match self.peek_at(1) {
                Some(Token::Assign) => None,
                Some(Token::PlusAssign) => Some(BinOp::Add),
                Some(Token::MinusAssign) => Some(BinOp::Sub),
                Some(Token::StarAssign) => Some(BinOp::Mul),
                Some(Token::SlashAssign) => Some(BinOp::Div),
                _ => return Ok(Stmt::Expr(self.expr(0)?)),
            };
            if name.contains('.') {
                return Err(self.error(format!("cannot assign to package member '{name}'")));
            }
            self.pos += 2;
            let value = self.expr(0)?;
            return Ok(match update {
                None => Stmt::Assign(name, value),
                Some(op) => Stmt::Update(name, op, value),
            });
        }
        Ok(Stmt::Expr(self.expr(0)?))
    }

    fn expr(&mut self, min_bp: u8) -> Result<Expr, ExecutionFault> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        let result = self.expr_bp(min_bp);
        self.depth -= 1;
        result
    }

    fn expr_bp(&mut self, min_bp: u8) -> Result<Expr, ExecutionFault> {
        let mut lhs = self.prefix()?;

        loop {
            let Some(token) = self.peek() else { break };

            if let Some(op) = comparison(token) {
                if BP_CMP < min_bp {
                    break;
                }
                self.pos += 1;
                let mut chain = vec![(op, self.expr(BP_CMP + 1)?)];
                while let Some(op) = self.peek().and_then(comparison) {
                    self.pos += 1;
                    chain.push((op, self.expr(BP_CMP + 1)?));
                }
                lhs = Expr::Compare(Box::new(lhs), chain);
                continue;
            }

            match token {
                Token::Or | Token::And => {
                    let is_or = *token == Token::Or;
                    let bp = if is_or { BP_OR } else { BP_AND };
                    if bp < min_bp {
                        break;
                    }
                    self.pos += 1;
                    let rhs = self.expr(bp + 1)?;
                    lhs = if is_or {
                        Expr::Or(Box::new(lhs), Box::new(rhs))
                    } else {
                        Expr::And(Box::new(lhs), Box::new(rhs))
                    };
                }
                Token::LParen => {
                    if BP_POSTFIX < min_bp {
                        break;
                    }
                    let Expr::Name(callee) = lhs else {
                        return Err(self.error("only named functions can be called"));
                    };
                    self.pos += 1;
                    let args = self.sequence(Token::RParen)?;
                    lhs = Expr::Call(callee, args);
                }
                Token::LBracket => {
                    if BP_POSTFIX < min_bp {
                        break;
                    }
                    self.pos += 1;
                    let index = self.expr(0)?;
                    self.expect(Token::RBracket)?;
                    lhs = Expr::Index(Box::new(lhs), Box::new(index));
                }
                other => {
                    let Some((op, l_bp, r_bp)) = arithmetic(other) else { break };
                    if l_bp < min_bp {
                        break;
                    }
                    self.pos += 1;
                    let rhs = self.expr(r_bp)?;
                    lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
                }
            }
        }

        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr, ExecutionFault> {
        let Some(token) = self.advance() else {
            return Err(self.unexpected());
        };
        let expr = match token {
            Token::Int(i) => Expr::Literal(Value::Int(i)),
            Token::Float(f) => Expr::Literal(Value::Float(f)),
            Token::Str(s) => Expr::Literal(Value::Str(s)),
            Token::Bool(b) => Expr::Literal(Value::Bool(b)),
            Token::NoneLit => Expr::Literal(Value::None),
            Token::Name(name) => Expr::Name(name),
            Token::Minus => Expr::Unary(UnaryOp::Neg, Box::new(self.expr(BP_UNARY)?)),
            Token::Plus => Expr::Unary(UnaryOp::Pos, Box::new(self.expr(BP_UNARY)?)),
            Token::Not => Expr::Unary(UnaryOp::Not, Box::new(self.expr(BP_NOT)?)),
            Token::LParen => {
                let inner = self.expr(0)?;
                self.expect(Token::RParen)?;
                inner
            }
            Token::LBracket => Expr::List(self.sequence(Token::RBracket)?),
            _ => {
                self.pos -= 1;
                return Err(self.unexpected());
            }
        };
        Ok(expr)
    }

    /// Comma separated expressions up to `close`, allowing a trailing comma.
    fn sequence(&mut self, close: Token) -> Result<Vec<Expr>, ExecutionFault> {
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(&close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.expr(0)?);
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(token) if *token == close => {}
                _ => return Err(self.unexpected()),
            }
        }
    }
}

fn comparison(token: &Token) -> Option<CmpOp> {
    Some(match token {
        Token::Eq => CmpOp::Eq,
        Token::NotEq => CmpOp::NotEq,
        Token::Lt => CmpOp::Lt,
        Token::LtEq => CmpOp::LtEq,
        Token::Gt => CmpOp::Gt,
        Token::GtEq => CmpOp::GtEq,
        _ => return None,
    })
}

/// Operator with its left and right binding power.
fn arithmetic(token: &Token) -> Option<(BinOp, u8, u8)> {
    Some(match token {
        Token::Plus => (BinOp::Add, BP_SUM, BP_SUM + 1),
        Token::Minus => (BinOp::Sub, BP_SUM, BP_SUM + 1),
        Token::Star => (BinOp::Mul, BP_PRODUCT, BP_PRODUCT + 1),
        Token::Slash => (BinOp::Div, BP_PRODUCT, BP_PRODUCT + 1),
        Token::FloorDiv => (BinOp::FloorDiv, BP_PRODUCT, BP_PRODUCT + 1),
        Token::Percent => (BinOp::Mod, BP_PRODUCT, BP_PRODUCT + 1),
        // Right associative; the operand may carry a unary sign.
        Token::Power => (BinOp::Pow, BP_POW, BP_UNARY),
        _ => return None,
    })
}

//! Restricted script language used at runtime.
//!
//! Method bodies, data initializers and inline `onclick` handlers are parsed
//! into this small AST and interpreted by [`crate::eval`]. Nothing outside
//! the grammar below is ever executed:
//!
//! - literals (number, string, template, boolean, `null`, `undefined`),
//!   array and object literals, identifiers and `this`
//! - member access (`a.b`, `a?.b`, `a[b]`) and calls
//! - unary `! - + typeof`, arithmetic, comparison, equality, `&& || ??`,
//!   `?:`, assignment (`= += -= *= /= %=`) and `++`/`--`
//! - statements: expressions, `let`/`const`/`var`, `if`/`else`, blocks,
//!   `return`
//!
//! Loops, functions, `new` and everything else are parse errors.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        ParseError {
            message: message.into(),
            offset,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AST
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberProperty {
    Static(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl AssignOp {
    /// Binary operator applied by a compound assignment.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Rem => Some(BinaryOp::Rem),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Template(Vec<TemplatePart>),
    Ident(String),
    This,
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Member {
        object: Box<Expr>,
        property: MemberProperty,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
}

impl Expr {
    pub fn is_assignable(&self) -> bool {
        matches!(self, Expr::Ident(_) | Expr::Member { optional: false, .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Let(Vec<(String, Option<Expr>)>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    Return(Option<Expr>),
    Empty,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEXER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Str(String),
    /// Cooked text chunks and `${}` expression sources with their offsets.
    Template(Vec<String>, Vec<(String, usize)>),
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    start: usize,
    newline_before: bool,
}

const PUNCTUATORS: &[&str] = &[
    "===", "!==", "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=",
    "*=", "/=", "%=", "+", "-", "*", "/", "%", "<", ">", "=", "!", "?", ":", ".", ",", ";", "(",
    ")", "[", "]", "{", "}",
];

struct Lexer<'s> {
    src: &'s str,
    pos: usize,
    base: usize,
}

impl<'s> Lexer<'s> {
    fn tokenize(src: &'s str, base: usize) -> Result<Vec<Token>, ParseError> {
        let mut lexer = Lexer { src, pos: 0, base };
        let mut tokens = Vec::new();
        loop {
            let newline_before = lexer.skip_trivia()?;
            let start = lexer.pos;
            let tok = lexer.next_tok()?;
            let done = tok == Tok::Eof;
            tokens.push(Token {
                tok,
                start: base + start,
                newline_before,
            });
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.base + self.pos)
    }

    /// Skips whitespace and comments, reporting whether a line break was seen.
    fn skip_trivia(&mut self) -> Result<bool, ParseError> {
        let mut newline = false;
        loop {
            match self.peek() {
                Some('\n') | Some('\r') | Some('\u{2028}') | Some('\u{2029}') => {
                    newline = true;
                    self.bump();
                }
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let rest = &self.src[self.pos + 2..];
                    let end = rest.find("*/").ok_or_else(|| self.error("unterminated comment"))?;
                    if rest[..end].contains('\n') {
                        newline = true;
                    }
                    self.pos += 2 + end + 2;
                }
                _ => return Ok(newline),
            }
        }
    }

    fn next_tok(&mut self) -> Result<Tok, ParseError> {
        let Some(c) = self.peek() else {
            return Ok(Tok::Eof);
        };

        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.number();
        }
        if c == '"' || c == '\'' {
            self.bump();
            return Ok(Tok::Str(self.string_body(c)?));
        }
        if c == '`' {
            self.bump();
            return self.template();
        }
        if is_ident_start(c) {
            let start = self.pos;
            while self.peek().is_some_and(is_ident_part) {
                self.bump();
            }
            return Ok(Tok::Ident(self.src[start..self.pos].to_string()));
        }

        let rest = &self.src[self.pos..];
        for punct in PUNCTUATORS {
            if rest.starts_with(punct) {
                // `a?.5:b` is a conditional, not optional chaining.
                if *punct == "?." && rest[2..].starts_with(|d: char| d.is_ascii_digit()) {
                    continue;
                }
                self.pos += punct.len();
                return Ok(Tok::Punct(punct));
            }
        }
        Err(self.error(format!("unexpected character '{}'", c)))
    }

    fn number(&mut self) -> Result<Tok, ParseError> {
        let start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
            }
            let digits = &self.src[digits_start..self.pos];
            return u64::from_str_radix(digits, 16)
                .map(|n| Tok::Num(n as f64))
                .map_err(|_| ParseError::new("invalid hex literal", self.base + start));
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let save = self.pos;
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.bump();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            } else {
                self.pos = save;
            }
        }
        if self.peek().is_some_and(is_ident_start) {
            return Err(self.error("identifier directly after number"));
        }
        self.src[start..self.pos]
            .parse::<f64>()
            .map(Tok::Num)
            .map_err(|_| ParseError::new("invalid number", self.base + start))
    }

    fn escape(&mut self) -> Result<Option<char>, ParseError> {
        let Some(c) = self.bump() else {
            return Err(self.error("unterminated escape"));
        };
        let ch = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0' => '\0',
            '\n' => return Ok(None),
            'x' => self.hex_escape(2)?,
            'u' => {
                if self.peek() == Some('{') {
                    self.bump();
                    let start = self.pos;
                    while self.peek().is_some_and(|c| c != '}') {
                        self.bump();
                    }
                    let digits = &self.src[start..self.pos];
                    self.bump();
                    u32::from_str_radix(digits, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| self.error("invalid unicode escape"))?
                } else {
                    self.hex_escape(4)?
                }
            }
            other => other,
        };
        Ok(Some(ch))
    }

    fn hex_escape(&mut self, len: usize) -> Result<char, ParseError> {
        let start = self.pos;
        for _ in 0..len {
            self.bump();
        }
        self.src
            .get(start..self.pos)
            .and_then(|digits| u32::from_str_radix(digits, 16).ok())
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("invalid escape sequence"))
    }

    fn string_body(&mut self, quote: char) -> Result<String, ParseError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error("unterminated string")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => {
                    if let Some(ch) = self.escape()? {
                        out.push(ch);
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn template(&mut self) -> Result<Tok, ParseError> {
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        let mut current = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated template literal")),
                Some('`') => {
                    quasis.push(current);
                    return Ok(Tok::Template(quasis, exprs));
                }
                Some('\\') => {
                    if let Some(ch) = self.escape()? {
                        current.push(ch);
                    }
                }
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    quasis.push(std::mem::take(&mut current));
                    let start = self.pos;
                    let end = self.template_expr_end()?;
                    exprs.push((self.src[start..end].to_string(), self.base + start));
                    self.pos = end + 1;
                }
                Some(c) => current.push(c),
            }
        }
    }

    /// Finds the `}` closing a `${` substitution, skipping nested braces and
    /// string literals.
    fn template_expr_end(&self) -> Result<usize, ParseError> {
        let bytes = self.src.as_bytes();
        let mut depth = 0usize;
        let mut i = self.pos;
        while i < bytes.len() {
            match bytes[i] {
                q @ (b'"' | b'\'' | b'`') => {
                    i += 1;
                    while i < bytes.len() && bytes[i] != q {
                        if bytes[i] == b'\\' {
                            i += 1;
                        }
                        i += 1;
                    }
                }
                b'{' => depth += 1,
                b'}' if depth == 0 => return Ok(i),
                b'}' => depth -= 1,
                _ => {}
            }
            i += 1;
        }
        Err(self.error("unterminated template substitution"))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER
// ═══════════════════════════════════════════════════════════════════════════════

const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "for", "while", "do", "switch", "function", "class", "try", "catch", "throw", "new",
    "delete", "void", "break", "continue", "await", "yield", "async", "import", "export",
    "with", "instanceof", "in", "debugger",
];

/// Parses a statement list (method body or event handler).
pub fn parse_program(src: &str) -> Result<Vec<Stmt>, ParseError> {
    let mut parser = Parser::new(src, 0)?;
    let mut stmts = Vec::new();
    while !parser.at_eof() {
        stmts.push(parser.statement()?);
    }
    Ok(stmts)
}

/// Parses a single expression; trailing input is an error.
pub fn parse_expression(src: &str) -> Result<Expr, ParseError> {
    parse_expression_at(src, 0)
}

fn parse_expression_at(src: &str, base: usize) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(src, base)?;
    let expr = parser.expression()?;
    if !parser.at_eof() {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(src: &str, base: usize) -> Result<Self, ParseError> {
        Ok(Parser {
            tokens: Lexer::tokenize(src, base)?,
            pos: 0,
        })
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.current().tok == Tok::Eof
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(&self.current().tok, Tok::Punct(q) if *q == p)
    }

    fn is_ident(&self, name: &str) -> bool {
        matches!(&self.current().tok, Tok::Ident(n) if n == name)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), ParseError> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(ParseError::new(
                format!("expected '{}' but found {}", p, describe(&self.current().tok)),
                self.current().start,
            ))
        }
    }

    fn unexpected(&self) -> ParseError {
        ParseError::new(
            format!("unexpected {}", describe(&self.current().tok)),
            self.current().start,
        )
    }

    fn identifier(&mut self) -> Result<String, ParseError> {
        match &self.current().tok {
            Tok::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    // ─── statements ───────────────────────────────────────────────────────────

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        if self.eat_punct("{") {
            let mut body = Vec::new();
            while !self.is_punct("}") {
                if self.at_eof() {
                    return Err(self.unexpected());
                }
                body.push(self.statement()?);
            }
            self.advance();
            return Ok(Stmt::Block(body));
        }

        if let Tok::Ident(word) = self.current().tok.clone() {
            match word.as_str() {
                "let" | "const" | "var" => {
                    self.advance();
                    let mut decls = Vec::new();
                    loop {
                        let name = self.identifier()?;
                        let init = if self.eat_punct("=") {
                            Some(self.assignment()?)
                        } else {
                            None
                        };
                        decls.push((name, init));
                        if !self.eat_punct(",") {
                            break;
                        }
                    }
                    self.end_statement()?;
                    return Ok(Stmt::Let(decls));
                }
                "if" => {
                    self.advance();
                    self.expect_punct("(")?;
                    let test = self.expression()?;
                    self.expect_punct(")")?;
                    let consequent = Box::new(self.statement()?);
                    let alternate = if self.is_ident("else") {
                        self.advance();
                        Some(Box::new(self.statement()?))
                    } else {
                        None
                    };
                    return Ok(Stmt::If {
                        test,
                        consequent,
                        alternate,
                    });
                }
                "return" => {
                    self.advance();
                    let value = if self.is_punct(";")
                        || self.is_punct("}")
                        || self.at_eof()
                        || self.current().newline_before
                    {
                        None
                    } else {
                        Some(self.expression()?)
                    };
                    self.end_statement()?;
                    return Ok(Stmt::Return(value));
                }
                w if UNSUPPORTED_KEYWORDS.contains(&w) => {
                    return Err(ParseError::new(
                        format!("unsupported statement '{}'", w),
                        self.current().start,
                    ));
                }
                _ => {}
            }
        }

        let expr = self.expression()?;
        self.end_statement()?;
        Ok(Stmt::Expr(expr))
    }

    /// `;`, or an automatically inserted one before `}`, end of input or a
    /// line break.
    fn end_statement(&mut self) -> Result<(), ParseError> {
        if self.eat_punct(";") || self.is_punct("}") || self.at_eof() {
            return Ok(());
        }
        if self.current().newline_before {
            return Ok(());
        }
        Err(self.unexpected())
    }

    // ─── expressions ──────────────────────────────────────────────────────────

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let start = self.current().start;
        let target = self.conditional()?;
        let op = match &self.current().tok {
            Tok::Punct("=") => AssignOp::Assign,
            Tok::Punct("+=") => AssignOp::Add,
            Tok::Punct("-=") => AssignOp::Sub,
            Tok::Punct("*=") => AssignOp::Mul,
            Tok::Punct("/=") => AssignOp::Div,
            Tok::Punct("%=") => AssignOp::Rem,
            Tok::Punct("=>") => {
                return Err(ParseError::new(
                    "arrow functions are not supported",
                    self.current().start,
                ))
            }
            _ => return Ok(target),
        };
        if !target.is_assignable() {
            return Err(ParseError::new("invalid assignment target", start));
        }
        self.advance();
        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn conditional(&mut self) -> Result<Expr, ParseError> {
        let test = self.binary(0)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.assignment()?;
        self.expect_punct(":")?;
        let alternate = self.assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let Tok::Punct(p) = self.current().tok else {
                break;
            };
            let Some((prec, kind)) = binary_operator(p) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.binary(prec + 1)?;
            left = match kind {
                OpKind::Binary(op) => Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                OpKind::Logical(op) => Expr::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match &self.current().tok {
            Tok::Punct("!") => Some(UnaryOp::Not),
            Tok::Punct("-") => Some(UnaryOp::Neg),
            Tok::Punct("+") => Some(UnaryOp::Plus),
            Tok::Ident(w) if w == "typeof" => Some(UnaryOp::TypeOf),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let arg = self.unary()?;
            return Ok(Expr::Unary {
                op,
                arg: Box::new(arg),
            });
        }

        if self.is_punct("++") || self.is_punct("--") {
            let increment = self.is_punct("++");
            let start = self.advance().start;
            let target = self.unary()?;
            if !target.is_assignable() {
                return Err(ParseError::new("invalid update target", start));
            }
            return Ok(Expr::Update {
                increment,
                prefix: true,
                target: Box::new(target),
            });
        }

        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let start = self.current().start;
        let expr = self.call_member()?;
        if (self.is_punct("++") || self.is_punct("--")) && !self.current().newline_before {
            let increment = self.is_punct("++");
            if !expr.is_assignable() {
                return Err(ParseError::new("invalid update target", start));
            }
            self.advance();
            return Ok(Expr::Update {
                increment,
                prefix: false,
                target: Box::new(expr),
            });
        }
        Ok(expr)
    }

    fn call_member(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_punct(".") {
                let name = self.identifier()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberProperty::Static(name),
                    optional: false,
                };
            } else if self.eat_punct("?.") {
                let property = if self.eat_punct("[") {
                    let index = self.expression()?;
                    self.expect_punct("]")?;
                    MemberProperty::Computed(Box::new(index))
                } else {
                    MemberProperty::Static(self.identifier()?)
                };
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional: true,
                };
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberProperty::Computed(Box::new(index)),
                    optional: false,
                };
            } else if self.eat_punct("(") {
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            args.push(self.assignment()?);
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance();
        match token.tok {
            Tok::Num(n) => Ok(Expr::Literal(Literal::Number(n))),
            Tok::Str(s) => Ok(Expr::Literal(Literal::String(s))),
            Tok::Template(quasis, exprs) => {
                let mut parts = Vec::new();
                let mut exprs = exprs.into_iter();
                for text in quasis {
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(text));
                    }
                    if let Some((src, offset)) = exprs.next() {
                        parts.push(TemplatePart::Expr(parse_expression_at(&src, offset)?));
                    }
                }
                Ok(Expr::Template(parts))
            }
            Tok::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Literal(Literal::Bool(true))),
                "false" => Ok(Expr::Literal(Literal::Bool(false))),
                "null" => Ok(Expr::Literal(Literal::Null)),
                "undefined" => Ok(Expr::Literal(Literal::Undefined)),
                "this" => Ok(Expr::This),
                w if UNSUPPORTED_KEYWORDS.contains(&w) => Err(ParseError::new(
                    format!("unsupported expression '{}'", w),
                    token.start,
                )),
                _ => Ok(Expr::Ident(word)),
            },
            Tok::Punct("(") => {
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Tok::Punct("[") => {
                let mut items = Vec::new();
                while !self.eat_punct("]") {
                    items.push(self.assignment()?);
                    if !self.eat_punct(",") {
                        self.expect_punct("]")?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            Tok::Punct("{") => {
                let mut props = Vec::new();
                while !self.eat_punct("}") {
                    let key_token = self.advance();
                    let key = match key_token.tok {
                        Tok::Ident(name) => name,
                        Tok::Str(s) => s,
                        Tok::Num(n) => crate::eval::format_number(n),
                        other => {
                            return Err(ParseError::new(
                                format!("unexpected {} in object literal", describe(&other)),
                                key_token.start,
                            ))
                        }
                    };
                    let value = if self.eat_punct(":") {
                        self.assignment()?
                    } else {
                        Expr::Ident(key.clone())
                    };
                    props.push((key, value));
                    if !self.eat_punct(",") {
                        self.expect_punct("}")?;
                        break;
                    }
                }
                Ok(Expr::Object(props))
            }
            other => Err(ParseError::new(
                format!("unexpected {}", describe(&other)),
                token.start,
            )),
        }
    }
}

enum OpKind {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

fn binary_operator(p: &str) -> Option<(u8, OpKind)> {
    let entry = match p {
        "??" => (1, OpKind::Logical(LogicalOp::Nullish)),
        "||" => (2, OpKind::Logical(LogicalOp::Or)),
        "&&" => (3, OpKind::Logical(LogicalOp::And)),
        "==" => (6, OpKind::Binary(BinaryOp::Eq)),
        "!=" => (6, OpKind::Binary(BinaryOp::NotEq)),
        "===" => (6, OpKind::Binary(BinaryOp::StrictEq)),
        "!==" => (6, OpKind::Binary(BinaryOp::StrictNotEq)),
        "<" => (7, OpKind::Binary(BinaryOp::Lt)),
        ">" => (7, OpKind::Binary(BinaryOp::Gt)),
        "<=" => (7, OpKind::Binary(BinaryOp::LtEq)),
        ">=" => (7, OpKind::Binary(BinaryOp::GtEq)),
        "+" => (9, OpKind::Binary(BinaryOp::Add)),
        "-" => (9, OpKind::Binary(BinaryOp::Sub)),
        "*" => (10, OpKind::Binary(BinaryOp::Mul)),
        "/" => (10, OpKind::Binary(BinaryOp::Div)),
        "%" => (10, OpKind::Binary(BinaryOp::Rem)),
        _ => return None,
    };
    Some(entry)
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Num(n) => format!("number {}", n),
        Tok::Str(_) => "string".to_string(),
        Tok::Template(..) => "template literal".to_string(),
        Tok::Ident(name) => format!("'{}'", name),
        Tok::Punct(p) => format!("'{}'", p),
        Tok::Eof => "end of input".to_string(),
    }
}

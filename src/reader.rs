//! S-expression reader.
//!
//! [`InputPort`] buffers one line of input at a time and splits it into tokens with
//! nom combinators; [`Reader`] assembles tokens into expression trees, one complete
//! datum per call. Quote markers become two-element lists (`'x` => `(quote x)`).

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::char,
    combinator::{map, rest, value},
    sequence::preceded,
};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

use crate::ast::Value;
use crate::symbol::SymbolTable;
use crate::{Error, MAX_PARSE_DEPTH, SyntaxError, SyntaxErrorKind};

/// Characters that end a raw atom
const DELIMITERS: &str = "('\"`,;)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QuoteMarker {
    Quote,
    Quasiquote,
    Unquote,
    UnquoteSplicing,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Open,
    Close,
    Marker(QuoteMarker),
    /// String literal with escapes already decoded
    Str(String),
    Atom(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Lexeme<'a> {
    Token(Token),
    Atom(&'a str),
    Comment,
}

impl Lexeme<'_> {
    fn into_token(self) -> Option<Token> {
        match self {
            Lexeme::Token(token) => Some(token),
            Lexeme::Atom(text) => Some(Token::Atom(text.to_owned())),
            Lexeme::Comment => None,
        }
    }
}

fn is_atom_char(c: char) -> bool {
    !c.is_whitespace() && !DELIMITERS.contains(c)
}

/// Parse a string literal, decoding `\"`, `\\`, `\n`, `\t` and `\r`.
/// Unknown escapes are kept verbatim.
fn parse_string(input: &str) -> IResult<&str, String> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut chars = remaining.chars();
        match chars.next() {
            Some('"') => return Ok((chars.as_str(), text)),
            Some('\\') => {
                match chars.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                    None => {
                        return Err(nom::Err::Error(nom::error::Error::new(
                            remaining,
                            nom::error::ErrorKind::Char,
                        )));
                    }
                }
                remaining = chars.as_str();
            }
            Some(ch) => {
                text.push(ch);
                remaining = chars.as_str();
            }
            None => {
                // Closing quote missing on this line
                return Err(nom::Err::Error(nom::error::Error::new(
                    remaining,
                    nom::error::ErrorKind::Char,
                )));
            }
        }
    }
}

/// Lex the next token (or comment) from the start of `input`
fn lex(input: &str) -> IResult<&str, Lexeme<'_>> {
    preceded(
        take_while(char::is_whitespace),
        alt((
            value(
                Lexeme::Token(Token::Marker(QuoteMarker::UnquoteSplicing)),
                tag(",@"),
            ),
            value(Lexeme::Token(Token::Open), char('(')),
            value(Lexeme::Token(Token::Close), char(')')),
            value(Lexeme::Token(Token::Marker(QuoteMarker::Quote)), char('\'')),
            value(
                Lexeme::Token(Token::Marker(QuoteMarker::Quasiquote)),
                char('`'),
            ),
            value(Lexeme::Token(Token::Marker(QuoteMarker::Unquote)), char(',')),
            map(parse_string, |s| Lexeme::Token(Token::Str(s))),
            value(Lexeme::Comment, preceded(char(';'), rest)),
            map(take_while1(is_atom_char), Lexeme::Atom),
        )),
    )
    .parse(input)
}

/// A character source read one line at a time.
pub struct InputPort {
    source: Box<dyn BufRead>,
    line: String,
    line_number: usize,
}

impl InputPort {
    pub fn new(source: impl BufRead + 'static) -> Self {
        InputPort {
            source: Box::new(source),
            line: String::new(),
            line_number: 0,
        }
    }

    /// Port over in-memory text
    pub fn from_source(text: &str) -> Self {
        Self::new(Cursor::new(text.to_owned().into_bytes()))
    }

    pub fn open(path: &Path) -> Result<Self, Error> {
        let file =
            File::open(path).map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
        Ok(Self::new(BufReader::new(file)))
    }

    /// Number of lines consumed so far
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Return the next token, reading new lines as needed. `None` at end of input.
    pub(crate) fn next_token(&mut self) -> Result<Option<Token>, Error> {
        loop {
            if self.line.trim().is_empty() {
                self.line.clear();
                let read = self
                    .source
                    .read_line(&mut self.line)
                    .map_err(|e| Error::Io(e.to_string()))?;
                if read == 0 {
                    return Ok(None);
                }
                self.line_number += 1;
                continue;
            }

            let lexed = lex(&self.line)
                .map(|(remaining, lexeme)| (self.line.len() - remaining.len(), lexeme.into_token()))
                .ok();

            match lexed {
                Some((consumed, token)) => {
                    self.line.drain(..consumed);
                    if token.is_some() {
                        return Ok(token);
                    }
                }
                None => {
                    let found = self.line.trim().to_owned();
                    self.line.clear();
                    let message = if found.starts_with('"') {
                        "unterminated string literal"
                    } else {
                        "unreadable input"
                    };
                    return Err(Error::Syntax(SyntaxError::new(
                        SyntaxErrorKind::InvalidToken,
                        format!("{message} on line {}", self.line_number),
                        Some(found),
                    )));
                }
            }
        }
    }
}

/// Does the token start like a number (and so may be parsed as a float)?
fn looks_numeric(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('+' | '-' | '.') => matches!(chars.next(), Some(c) if c.is_ascii_digit() || c == '.'),
        _ => false,
    }
}

/// Classify a raw token: booleans, then integers, then floats, otherwise a symbol
pub(crate) fn atom(text: &str, symbols: &mut SymbolTable) -> Value {
    match text {
        "#t" => return Value::Bool(true),
        "#f" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = text.parse::<i64>() {
        return Value::Integer(n);
    }
    if looks_numeric(text)
        && let Ok(x) = text.parse::<f64>()
    {
        return Value::Float(x);
    }
    Value::Symbol(symbols.intern(text))
}

/// Assembles tokens from a port into expression trees.
pub struct Reader<'a> {
    port: &'a mut InputPort,
    symbols: &'a mut SymbolTable,
    max_depth: usize,
}

impl<'a> Reader<'a> {
    pub fn new(port: &'a mut InputPort, symbols: &'a mut SymbolTable, max_depth: usize) -> Self {
        Reader {
            port,
            symbols,
            max_depth,
        }
    }

    /// Read the next complete expression, or `None` at end of input
    pub fn read(&mut self) -> Result<Option<Value>, Error> {
        match self.port.next_token()? {
            None => Ok(None),
            Some(token) => self.read_ahead(token, 0).map(Some),
        }
    }

    fn read_ahead(&mut self, token: Token, depth: usize) -> Result<Value, Error> {
        if depth >= self.max_depth {
            return Err(Error::syntax(
                SyntaxErrorKind::TooDeeplyNested,
                format!("expression too deeply nested (max depth: {})", self.max_depth),
            ));
        }

        match token {
            Token::Open => {
                let mut items = Vec::new();
                loop {
                    match self.port.next_token()? {
                        Some(Token::Close) => return Ok(Value::list(items)),
                        Some(token) => items.push(self.read_ahead(token, depth + 1)?),
                        None => {
                            return Err(Error::syntax(
                                SyntaxErrorKind::UnexpectedEof,
                                "unexpected EOF in list",
                            ));
                        }
                    }
                }
            }
            Token::Close => Err(Error::Syntax(SyntaxError::new(
                SyntaxErrorKind::UnexpectedClose,
                "unexpected )",
                Some(")".to_owned()),
            ))),
            Token::Marker(marker) => {
                let Some(next) = self.port.next_token()? else {
                    return Err(Error::syntax(
                        SyntaxErrorKind::UnexpectedEof,
                        "unexpected EOF after quote marker",
                    ));
                };
                let datum = self.read_ahead(next, depth + 1)?;
                let keywords = self.symbols.keywords();
                let head = match marker {
                    QuoteMarker::Quote => keywords.quote,
                    QuoteMarker::Quasiquote => keywords.quasiquote,
                    QuoteMarker::Unquote => keywords.unquote,
                    QuoteMarker::UnquoteSplicing => keywords.unquote_splicing,
                };
                Ok(Value::list(vec![Value::Symbol(head), datum]))
            }
            Token::Str(text) => Ok(Value::String(text)),
            Token::Atom(text) => Ok(atom(&text, self.symbols)),
        }
    }
}

/// Read every expression in `text`
pub fn read_all(text: &str, symbols: &mut SymbolTable) -> Result<Vec<Value>, Error> {
    let mut port = InputPort::from_source(text);
    let mut reader = Reader::new(&mut port, symbols, MAX_PARSE_DEPTH);
    let mut values = Vec::new();
    while let Some(value) = reader.read()? {
        values.push(value);
    }
    Ok(values)
}

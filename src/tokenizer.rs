//! Lua 5.3 lexer.
//!
//! nom recognizers over `&str` produce a flat token vector; every token
//! records the line and column where it starts so the parser and the
//! goto validator can report positions. Short strings handle the full
//! escape set, long-bracket strings and comments handle arbitrary
//! nesting levels (`[==[ ... ]==]`).

use std::rc::Rc;

use nom::{
    bytes::complete::take_while,
    character::complete::satisfy,
    combinator::recognize,
    sequence::pair,
    IResult, Parser,
};
use phf::phf_map;

use crate::error::{LuaError, LuaResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    And,
    Break,
    Do,
    Else,
    Elseif,
    End,
    False,
    For,
    Function,
    Goto,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,
    // Symbols
    Semicolon,
    Assign,
    Comma,
    Dot,
    Colon,
    DoubleColon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Caret,
    Percent,
    Ampersand,
    Tilde,
    Pipe,
    Shl,
    Shr,
    Concat,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Hash,
    Ellipsis,
    // Values
    Name(Rc<str>),
    Number(f64),
    Str(Rc<str>),
}

/// A token plus the position where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Tok {
    pub token: Token,
    pub line: u32,
    pub col: u32,
}

/// Keyword discriminants; `Token` itself holds `Rc` payloads and cannot
/// live in a static table.
#[derive(Debug, Clone, Copy)]
enum Kw {
    And,
    Break,
    Do,
    Else,
    Elseif,
    End,
    False,
    For,
    Function,
    Goto,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    True,
    Until,
    While,
}

static KEYWORDS: phf::Map<&'static str, Kw> = phf_map! {
    "and" => Kw::And,
    "break" => Kw::Break,
    "do" => Kw::Do,
    "else" => Kw::Else,
    "elseif" => Kw::Elseif,
    "end" => Kw::End,
    "false" => Kw::False,
    "for" => Kw::For,
    "function" => Kw::Function,
    "goto" => Kw::Goto,
    "if" => Kw::If,
    "in" => Kw::In,
    "local" => Kw::Local,
    "nil" => Kw::Nil,
    "not" => Kw::Not,
    "or" => Kw::Or,
    "repeat" => Kw::Repeat,
    "return" => Kw::Return,
    "then" => Kw::Then,
    "true" => Kw::True,
    "until" => Kw::Until,
    "while" => Kw::While,
};

fn keyword_token(kw: Kw) -> Token {
    match kw {
        Kw::And => Token::And,
        Kw::Break => Token::Break,
        Kw::Do => Token::Do,
        Kw::Else => Token::Else,
        Kw::Elseif => Token::Elseif,
        Kw::End => Token::End,
        Kw::False => Token::False,
        Kw::For => Token::For,
        Kw::Function => Token::Function,
        Kw::Goto => Token::Goto,
        Kw::If => Token::If,
        Kw::In => Token::In,
        Kw::Local => Token::Local,
        Kw::Nil => Token::Nil,
        Kw::Not => Token::Not,
        Kw::Or => Token::Or,
        Kw::Repeat => Token::Repeat,
        Kw::Return => Token::Return,
        Kw::Then => Token::Then,
        Kw::True => Token::True,
        Kw::Until => Token::Until,
        Kw::While => Token::While,
    }
}

/// Byte offsets of line starts, for offset → (line, column) conversion.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(src: &str) -> Self {
        let mut starts = vec![0usize];
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        LineIndex { starts }
    }

    fn position(&self, offset: usize) -> (u32, u32) {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        ((line + 1) as u32, (offset - self.starts[line] + 1) as u32)
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn name(i: &str) -> IResult<&str, &str> {
    recognize(pair(satisfy(is_name_start), take_while(is_name_char))).parse(i)
}

fn hex_digits(i: &str) -> IResult<&str, &str> {
    take_while(|c: char| c.is_ascii_hexdigit()).parse(i)
}

/// Lex a whole chunk.
pub fn tokenize(src: &str) -> LuaResult<Vec<Tok>> {
    let index = LineIndex::new(src);
    let err_at = |offset: usize, msg: String| {
        let (line, col) = index.position(offset);
        LuaError::parse(msg, line, col)
    };
    let mut out = Vec::new();
    let mut rest = src;
    loop {
        rest = skip_trivia(src, rest, &index)?;
        if rest.is_empty() {
            break;
        }
        let offset = src.len() - rest.len();
        let (line, col) = index.position(offset);
        let (next, token) = lex_token(src, rest, &index)
            .map_err(|msg| err_at(offset, msg))?;
        out.push(Tok { token, line, col });
        rest = next;
    }
    Ok(out)
}

/// Skip whitespace, line comments, and long-bracket comments.
fn skip_trivia<'a>(src: &str, mut rest: &'a str, index: &LineIndex) -> LuaResult<&'a str> {
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
        if let Some(after) = rest.strip_prefix("--") {
            if let Some(level) = long_bracket_level(after) {
                let offset = src.len() - rest.len();
                let (remaining, _) = read_long_bracket(after, level).ok_or_else(|| {
                    let (line, col) = index.position(offset);
                    LuaError::parse("unfinished long comment", line, col)
                })?;
                rest = remaining;
            } else {
                rest = match after.find('\n') {
                    Some(i) => &after[i + 1..],
                    None => "",
                };
            }
            continue;
        }
        return Ok(rest);
    }
}

/// Does `i` open a long bracket (`[`, `[=`, `[==`, …)? Returns the level.
fn long_bracket_level(i: &str) -> Option<usize> {
    let mut bytes = i.bytes();
    if bytes.next() != Some(b'[') {
        return None;
    }
    let mut level = 0usize;
    for b in bytes {
        match b {
            b'=' => level += 1,
            b'[' => return Some(level),
            _ => return None,
        }
    }
    None
}

/// Consume a long-bracket body. `i` starts at the opening `[`. Returns
/// the rest after the closing bracket and the enclosed content.
fn read_long_bracket(i: &str, level: usize) -> Option<(&str, &str)> {
    let body = &i[level + 2..];
    // A newline right after the opening bracket is dropped.
    let body = body
        .strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .or_else(|| body.strip_prefix('\r'))
        .unwrap_or(body);
    let close: String = format!("]{}]", "=".repeat(level));
    let at = body.find(&close)?;
    Some((&body[at + close.len()..], &body[..at]))
}

/// Lex one token from the head of `rest`. Returns a plain message on
/// failure; the caller attaches the position.
fn lex_token<'a>(
    _src: &str,
    rest: &'a str,
    _index: &LineIndex,
) -> Result<(&'a str, Token), String> {
    let first = rest.chars().next().expect("lex_token on empty input");

    if is_name_start(first) {
        let (next, word) = name(rest).map_err(|_| "malformed name".to_string())?;
        let token = match KEYWORDS.get(word) {
            Some(kw) => keyword_token(*kw),
            None => Token::Name(Rc::from(word)),
        };
        return Ok((next, token));
    }

    if first.is_ascii_digit() || (first == '.' && rest[1..].starts_with(|c: char| c.is_ascii_digit()))
    {
        return lex_number(rest);
    }

    if first == '"' || first == '\'' {
        return lex_short_string(rest, first);
    }

    if first == '[' {
        if let Some(level) = long_bracket_level(rest) {
            let (next, content) = read_long_bracket(rest, level)
                .ok_or_else(|| "unfinished long string".to_string())?;
            return Ok((next, Token::Str(Rc::from(content))));
        }
        return Ok((&rest[1..], Token::LBracket));
    }

    // Multi-character symbols first, then single.
    for (text, token) in [
        ("...", Token::Ellipsis),
        ("..", Token::Concat),
        ("==", Token::Eq),
        ("~=", Token::Ne),
        ("<=", Token::Le),
        (">=", Token::Ge),
        ("<<", Token::Shl),
        (">>", Token::Shr),
        ("//", Token::DoubleSlash),
        ("::", Token::DoubleColon),
    ] {
        if let Some(next) = rest.strip_prefix(text) {
            return Ok((next, token));
        }
    }
    let token = match first {
        ';' => Token::Semicolon,
        '=' => Token::Assign,
        ',' => Token::Comma,
        '.' => Token::Dot,
        ':' => Token::Colon,
        '(' => Token::LParen,
        ')' => Token::RParen,
        ']' => Token::RBracket,
        '{' => Token::LBrace,
        '}' => Token::RBrace,
        '+' => Token::Plus,
        '-' => Token::Minus,
        '*' => Token::Star,
        '/' => Token::Slash,
        '^' => Token::Caret,
        '%' => Token::Percent,
        '&' => Token::Ampersand,
        '~' => Token::Tilde,
        '|' => Token::Pipe,
        '<' => Token::Lt,
        '>' => Token::Gt,
        '#' => Token::Hash,
        other => return Err(format!("unexpected symbol near '{}'", other)),
    };
    Ok((&rest[first.len_utf8()..], token))
}

fn lex_number(rest: &str) -> Result<(&str, Token), String> {
    if let Some(after) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        let (next, digits) = hex_digits(after).map_err(|_| "malformed number".to_string())?;
        if digits.is_empty() {
            return Err("malformed number".to_string());
        }
        let mut acc: u64 = 0;
        for b in digits.bytes() {
            let d = (b as char).to_digit(16).unwrap() as u64;
            acc = acc.wrapping_mul(16).wrapping_add(d);
        }
        return Ok((next, Token::Number(acc as i64 as f64)));
    }

    let bytes = rest.as_bytes();
    let mut end = 0usize;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    // A fraction dot, but never the start of a `..` operator.
    if end < bytes.len() && bytes[end] == b'.' && bytes.get(end + 1) != Some(&b'.') {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp = end + 1;
        if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            end = exp;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
    }
    let text = &rest[..end];
    let value: f64 = text
        .parse()
        .map_err(|_| format!("malformed number near '{}'", text))?;
    Ok((&rest[end..], Token::Number(value)))
}

fn lex_short_string(rest: &str, quote: char) -> Result<(&str, Token), String> {
    let mut out = String::new();
    let mut chars = rest[1..].char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => {
                let consumed = 1 + i + c.len_utf8();
                return Ok((&rest[consumed..], Token::Str(Rc::from(out.as_str()))));
            }
            '\n' => return Err("unfinished string".to_string()),
            '\\' => {
                let (_, esc) = chars
                    .next()
                    .ok_or_else(|| "unfinished string".to_string())?;
                match esc {
                    'a' => out.push('\x07'),
                    'b' => out.push('\x08'),
                    'f' => out.push('\x0c'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'v' => out.push('\x0b'),
                    '\\' => out.push('\\'),
                    '"' => out.push('"'),
                    '\'' => out.push('\''),
                    '\n' => out.push('\n'),
                    'x' => {
                        let hi = chars.next().map(|(_, c)| c);
                        let lo = chars.next().map(|(_, c)| c);
                        match (
                            hi.and_then(|c| c.to_digit(16)),
                            lo.and_then(|c| c.to_digit(16)),
                        ) {
                            (Some(h), Some(l)) => out.push((h * 16 + l) as u8 as char),
                            _ => return Err("hexadecimal digit expected".to_string()),
                        }
                    }
                    'z' => {
                        // \z skips following whitespace, newlines included.
                        let mut remaining = chars.clone();
                        while let Some((_, c)) = remaining.next() {
                            if c.is_ascii_whitespace() {
                                chars.next();
                            } else {
                                break;
                            }
                        }
                    }
                    d if d.is_ascii_digit() => {
                        let mut code = d.to_digit(10).unwrap();
                        for _ in 0..2 {
                            let mut peek = chars.clone();
                            match peek.next() {
                                Some((_, c)) if c.is_ascii_digit() => {
                                    code = code * 10 + c.to_digit(10).unwrap();
                                    chars.next();
                                }
                                _ => break,
                            }
                        }
                        if code > 255 {
                            return Err("decimal escape too large".to_string());
                        }
                        out.push(code as u8 as char);
                    }
                    other => {
                        return Err(format!("invalid escape sequence '\\{}'", other));
                    }
                }
            }
            c => out.push(c),
        }
    }
    Err("unfinished string".to_string())
}

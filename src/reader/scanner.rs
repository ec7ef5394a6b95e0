//! Tokenizer. Mirrors `scan.hpp`/`scan.cpp`: a hand-written state machine
//! (no backtracking) over a character buffer, producing located tokens.

use super::token::{SourceLoc, StrTable, Token, TokenData, TokenKind};
use crate::error::{FnError, FnErrorKind};

fn is_delimiter(c: char) -> bool {
    matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | '\'' | '`' | ',' | ';')
}

fn is_symbol_constituent(c: char) -> bool {
    !c.is_whitespace() && !is_delimiter(c)
}

pub struct Scanner<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    file: String,
    sst: &'a mut StrTable,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &str, file: impl Into<String>, sst: &'a mut StrTable) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 0,
            file: file.into(),
            sst,
        }
    }

    pub fn get_loc(&self) -> SourceLoc {
        SourceLoc::new(self.line, self.col)
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn intern(&mut self, s: &str) -> super::token::StrId {
        self.sst.intern(s)
    }

    /// Skip whitespace and `;`-to-newline comments, then report whether
    /// input is exhausted.
    pub fn eof_skip_ws(&mut self) -> bool {
        self.skip_trivia();
        self.eof()
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_char2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn get_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn error(&self, msg: impl Into<String>) -> FnError {
        FnError::new(FnErrorKind::Lex, self.get_loc(), self.file.clone(), msg.into())
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.get_char();
                }
                Some(';') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.get_char();
                    }
                }
                _ => break,
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, FnError> {
        self.skip_trivia();
        let loc = self.get_loc();
        let Some(c) = self.get_char() else {
            return Ok(Token::new(loc, TokenKind::Eof, TokenData::None));
        };
        match c {
            '(' => Ok(Token::new(loc, TokenKind::LParen, TokenData::None)),
            ')' => Ok(Token::new(loc, TokenKind::RParen, TokenData::None)),
            '[' => Ok(Token::new(loc, TokenKind::LBracket, TokenData::None)),
            ']' => Ok(Token::new(loc, TokenKind::RBracket, TokenData::None)),
            '{' => Ok(Token::new(loc, TokenKind::LBrace, TokenData::None)),
            '}' => Ok(Token::new(loc, TokenKind::RBrace, TokenData::None)),
            '\'' => Ok(Token::new(loc, TokenKind::Quote, TokenData::None)),
            '`' => Ok(Token::new(loc, TokenKind::Backtick, TokenData::None)),
            ',' => {
                if self.peek_char() == Some('@') {
                    self.get_char();
                    Ok(Token::new(loc, TokenKind::CommaAt, TokenData::None))
                } else {
                    Ok(Token::new(loc, TokenKind::Comma, TokenData::None))
                }
            }
            '"' => self.scan_string_literal(loc),
            '$' => self.scan_dollar(loc),
            _ => self.scan_atom(loc, c),
        }
    }

    fn scan_dollar(&mut self, loc: SourceLoc) -> Result<Token, FnError> {
        match self.peek_char() {
            Some('(') => {
                self.get_char();
                Ok(Token::new(loc, TokenKind::DollarParen, TokenData::None))
            }
            Some('[') => {
                self.get_char();
                Ok(Token::new(loc, TokenKind::DollarBracket, TokenData::None))
            }
            Some('{') => {
                self.get_char();
                Ok(Token::new(loc, TokenKind::DollarBrace, TokenData::None))
            }
            Some('`') => {
                self.get_char();
                Ok(Token::new(loc, TokenKind::DollarBacktick, TokenData::None))
            }
            _ => self.scan_atom(loc, '$'),
        }
    }

    fn scan_string_literal(&mut self, loc: SourceLoc) -> Result<Token, FnError> {
        let mut buf = String::new();
        loop {
            let Some(c) = self.get_char() else {
                return Err(self.error("unterminated string literal at end of input"));
            };
            match c {
                '"' => break,
                '\\' => self.scan_escape(&mut buf)?,
                other => buf.push(other),
            }
        }
        let id = self.sst.intern(&buf);
        Ok(Token::new(loc, TokenKind::String, TokenData::Str(id)))
    }

    fn scan_escape(&mut self, buf: &mut String) -> Result<(), FnError> {
        let Some(c) = self.get_char() else {
            return Err(self.error("unterminated escape sequence at end of input"));
        };
        match c {
            'n' => buf.push('\n'),
            't' => buf.push('\t'),
            'r' => buf.push('\r'),
            '0' => buf.push('\0'),
            '\\' => buf.push('\\'),
            '"' => buf.push('"'),
            '\'' => buf.push('\''),
            'x' => {
                let hi = self.hex_digit()?;
                let lo = self.hex_digit()?;
                buf.push(((hi << 4) | lo) as u8 as char);
            }
            d if d.is_digit(8) => {
                let mut val = d.to_digit(8).unwrap();
                for _ in 0..2 {
                    match self.peek_char() {
                        Some(nc) if nc.is_digit(8) => {
                            self.get_char();
                            val = val * 8 + nc.to_digit(8).unwrap();
                        }
                        _ => break,
                    }
                }
                buf.push(val as u8 as char);
            }
            other => return Err(self.error(format!("invalid escape sequence '\\{other}'"))),
        }
        Ok(())
    }

    fn hex_digit(&mut self) -> Result<u32, FnError> {
        match self.get_char() {
            Some(c) if c.is_ascii_hexdigit() => Ok(c.to_digit(16).unwrap()),
            _ => Err(self.error("\\x escape requires two hex digits")),
        }
    }

    fn scan_atom(&mut self, loc: SourceLoc, first: char) -> Result<Token, FnError> {
        let mut buf = String::new();
        buf.push(first);
        loop {
            match self.peek_char() {
                Some('\\') => {
                    self.get_char();
                    if let Some(escaped) = self.get_char() {
                        buf.push(escaped);
                    } else {
                        return Err(self.error("dangling '\\' at end of input"));
                    }
                }
                Some(c) if is_symbol_constituent(c) => {
                    self.get_char();
                    buf.push(c);
                }
                _ => break,
            }
        }
        if let Some(num) = try_parse_number(&buf) {
            return Ok(Token::new(loc, TokenKind::Number, TokenData::Num(num)));
        }
        if buf.starts_with('.') || buf.ends_with('.') {
            return Err(self.error(format!("symbol '{buf}' may not begin or end with '.'")));
        }
        let id = self.sst.intern(&buf);
        Ok(Token::new(loc, TokenKind::Symbol, TokenData::Str(id)))
    }
}

fn try_parse_number(text: &str) -> Option<f64> {
    let mut chars = text.chars();
    let mut sign = 1.0;
    let mut rest = text;
    match chars.next() {
        Some('+') => rest = &text[1..],
        Some('-') => {
            sign = -1.0;
            rest = &text[1..];
        }
        _ => {}
    }
    if rest.is_empty() {
        return None;
    }
    if let Some(hex_body) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        parse_hex_float(hex_body).map(|v| sign * v)
    } else {
        parse_decimal(rest).map(|v| sign * v)
    }
}

fn parse_decimal(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }
    if !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse::<f64>().ok()
}

fn parse_hex_float(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut mantissa = 0f64;
    let mut any_digit = false;
    while i < bytes.len() && (bytes[i] as char).is_ascii_hexdigit() {
        mantissa = mantissa * 16.0 + (bytes[i] as char).to_digit(16).unwrap() as f64;
        i += 1;
        any_digit = true;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let mut scale = 1.0 / 16.0;
        while i < bytes.len() && (bytes[i] as char).is_ascii_hexdigit() {
            mantissa += (bytes[i] as char).to_digit(16).unwrap() as f64 * scale;
            scale /= 16.0;
            i += 1;
            any_digit = true;
        }
    }
    if !any_digit {
        return None;
    }
    let mut exp = 0i32;
    if i < bytes.len() && matches!(bytes[i], b'p' | b'P') {
        i += 1;
        let mut esign = 1i32;
        if i < bytes.len() && matches!(bytes[i], b'+' | b'-') {
            if bytes[i] == b'-' {
                esign = -1;
            }
            i += 1;
        }
        let mut edigits = false;
        let mut eval = 0i32;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            eval = eval * 10 + (bytes[i] - b'0') as i32;
            i += 1;
            edigits = true;
        }
        if !edigits {
            return None;
        }
        exp = esign * eval;
    }
    if i != bytes.len() {
        return None;
    }
    Some(mantissa * 2f64.powi(exp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(src: &str) -> Vec<TokenKind> {
        let mut sst = StrTable::new();
        let mut sc = Scanner::new(src, "<test>", &mut sst);
        let mut out = Vec::new();
        loop {
            let t = sc.next_token().unwrap();
            let done = t.kind == TokenKind::Eof;
            out.push(t.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn empty_input_yields_eof() {
        assert_eq!(scan_all(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn parens_and_atoms() {
        let kinds = scan_all("(+ 1 2)");
        assert_eq!(
            kinds,
            vec![
                TokenKind::LParen,
                TokenKind::Symbol,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_lex_error() {
        let mut sst = StrTable::new();
        let mut sc = Scanner::new("\"abc", "<test>", &mut sst);
        assert!(sc.next_token().is_err());
    }

    #[test]
    fn hex_number() {
        let mut sst = StrTable::new();
        let mut sc = Scanner::new("0x1F", "<test>", &mut sst);
        let t = sc.next_token().unwrap();
        assert_eq!(t.kind, TokenKind::Number);
        assert_eq!(t.data, TokenData::Num(31.0));
    }

    #[test]
    fn dollar_forms() {
        assert_eq!(
            scan_all("$(+ $0 $1)"),
            vec![
                TokenKind::DollarParen,
                TokenKind::Symbol,
                TokenKind::Symbol,
                TokenKind::Symbol,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn quote_family() {
        assert_eq!(
            scan_all("'a `b ,c ,@d"),
            vec![
                TokenKind::Quote,
                TokenKind::Symbol,
                TokenKind::Backtick,
                TokenKind::Symbol,
                TokenKind::Comma,
                TokenKind::Symbol,
                TokenKind::CommaAt,
                TokenKind::Symbol,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn symbol_with_leading_dot_is_error() {
        let mut sst = StrTable::new();
        let mut sc = Scanner::new(".foo", "<test>", &mut sst);
        assert!(sc.next_token().is_err());
    }

    #[test]
    fn two_hex_digits_required() {
        let mut sst = StrTable::new();
        let mut sc = Scanner::new("\"\\xG\"", "<test>", &mut sst);
        assert!(sc.next_token().is_err());
    }
}

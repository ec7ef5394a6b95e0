//! Turns a token stream into the AST graph. Mirrors the `parser` class in
//! `parse.hpp`: one lookahead token drives each decision, reader macros
//! (quote family, `$`-forms, `{}`/`[]` sugar) rewrite into ordinary list
//! forms at parse time.

use super::ast::Node;
use super::scanner::Scanner;
use super::token::{SourceLoc, StrTable, Token, TokenData, TokenKind};
use crate::error::{FnError, FnErrorKind};

pub struct Parser<'s> {
    sc: Scanner<'s>,
    file: String,
}

impl<'s> Parser<'s> {
    pub fn new(sc: Scanner<'s>, file: impl Into<String>) -> Self {
        Self {
            sc,
            file: file.into(),
        }
    }

    fn error(&self, loc: SourceLoc, msg: impl Into<String>) -> FnError {
        FnError::new(FnErrorKind::Parse, loc, self.file.clone(), msg.into())
    }

    fn resumable_eof(&self, loc: SourceLoc, msg: impl Into<String>) -> FnError {
        FnError::new(FnErrorKind::ParseResumable, loc, self.file.clone(), msg.into())
    }

    fn wrap_call(&mut self, loc: SourceLoc, head: &str, arg: Node) -> Node {
        let head_id = self.sc.intern(head);
        Node::list(loc, vec![Node::symbol(loc, head_id), arg])
    }

    /// Parse a single top-level form, or `None` at a clean EOF.
    pub fn parse_next_node(&mut self) -> Result<Option<Node>, FnError> {
        let t0 = self.sc.next_token()?;
        if t0.kind == TokenKind::Eof {
            return Ok(None);
        }
        self.parse_la(t0).map(Some)
    }

    fn parse_la(&mut self, t0: Token) -> Result<Node, FnError> {
        match t0.kind {
            TokenKind::Eof => Err(self.resumable_eof(t0.loc, "unexpected end of input, expected an expression")),
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                Err(self.error(t0.loc, "unexpected closing delimiter"))
            }
            TokenKind::LParen => {
                let mut buf = Vec::new();
                self.parse_to_delimiter(&mut buf, TokenKind::RParen)?;
                Ok(Node::list(t0.loc, buf))
            }
            TokenKind::LBracket => {
                let mut buf = Vec::new();
                self.parse_to_delimiter(&mut buf, TokenKind::RBracket)?;
                let head = self.sc.intern("List");
                let mut list = vec![Node::symbol(t0.loc, head)];
                list.extend(buf);
                Ok(Node::list(t0.loc, list))
            }
            TokenKind::LBrace => {
                let mut buf = Vec::new();
                self.parse_to_delimiter(&mut buf, TokenKind::RBrace)?;
                let head = self.sc.intern("Table");
                let mut list = vec![Node::symbol(t0.loc, head)];
                list.extend(buf);
                Ok(Node::list(t0.loc, list))
            }
            TokenKind::DollarParen => {
                let mut buf = Vec::new();
                self.parse_to_delimiter(&mut buf, TokenKind::RParen)?;
                let inner = Node::list(t0.loc, buf);
                Ok(self.wrap_call(t0.loc, "dollar-fn", inner))
            }
            TokenKind::DollarBracket => {
                let mut buf = Vec::new();
                self.parse_to_delimiter(&mut buf, TokenKind::RBracket)?;
                let head = self.sc.intern("List");
                let mut list = vec![Node::symbol(t0.loc, head)];
                list.extend(buf);
                let inner = Node::list(t0.loc, list);
                Ok(self.wrap_call(t0.loc, "dollar-fn", inner))
            }
            TokenKind::DollarBrace => {
                let mut buf = Vec::new();
                self.parse_to_delimiter(&mut buf, TokenKind::RBrace)?;
                let head = self.sc.intern("Table");
                let mut list = vec![Node::symbol(t0.loc, head)];
                list.extend(buf);
                let inner = Node::list(t0.loc, list);
                Ok(self.wrap_call(t0.loc, "dollar-fn", inner))
            }
            TokenKind::DollarBacktick => {
                let next = self.sc.next_token()?;
                let expr = self.parse_la(next)?;
                let quasi = self.wrap_call(t0.loc, "quasiquote", expr);
                Ok(self.wrap_call(t0.loc, "dollar-fn", quasi))
            }
            TokenKind::Quote => {
                let next = self.sc.next_token()?;
                let expr = self.parse_la(next)?;
                Ok(self.wrap_call(t0.loc, "quote", expr))
            }
            TokenKind::Backtick => {
                let next = self.sc.next_token()?;
                let expr = self.parse_la(next)?;
                Ok(self.wrap_call(t0.loc, "quasiquote", expr))
            }
            TokenKind::Comma => {
                let next = self.sc.next_token()?;
                let expr = self.parse_la(next)?;
                Ok(self.wrap_call(t0.loc, "unquote", expr))
            }
            TokenKind::CommaAt => {
                let next = self.sc.next_token()?;
                let expr = self.parse_la(next)?;
                Ok(self.wrap_call(t0.loc, "unquote-splicing", expr))
            }
            TokenKind::Number => {
                let TokenData::Num(n) = t0.data else { unreachable!() };
                Ok(Node::number(t0.loc, n))
            }
            TokenKind::String => {
                let TokenData::Str(id) = t0.data else { unreachable!() };
                Ok(Node::string(t0.loc, id))
            }
            TokenKind::Symbol => {
                let TokenData::Str(id) = t0.data else { unreachable!() };
                Ok(Node::symbol(t0.loc, id))
            }
        }
    }

    fn parse_to_delimiter(&mut self, buf: &mut Vec<Node>, delim: TokenKind) -> Result<(), FnError> {
        loop {
            let t = self.sc.next_token()?;
            if t.kind == delim {
                return Ok(());
            }
            if t.kind == TokenKind::Eof {
                return Err(self.resumable_eof(t.loc, "unexpected end of input inside a delimited form"));
            }
            buf.push(self.parse_la(t)?);
        }
    }
}

/// Parse every top-level form available in `source`.
pub fn parse_string(source: &str, file: impl Into<String>, sst: &mut StrTable) -> Result<Vec<Node>, FnError> {
    let file = file.into();
    let sc = Scanner::new(source, file.clone(), sst);
    let mut forms = Vec::new();
    let mut parser = Parser::new(sc, file);
    while let Some(node) = parser.parse_next_node()? {
        forms.push(node);
    }
    Ok(forms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ast::{AstKind, Datum};

    fn parse_one(src: &str) -> Node {
        let mut sst = StrTable::new();
        let mut forms = parse_string(src, "<test>", &mut sst).unwrap();
        assert_eq!(forms.len(), 1);
        forms.remove(0)
    }

    #[test]
    fn parses_atoms() {
        let n = parse_one("42");
        assert_eq!(n.kind, AstKind::Number);
    }

    #[test]
    fn parses_list() {
        let n = parse_one("(+ 1 2)");
        assert_eq!(n.kind, AstKind::List);
        assert_eq!(n.list_length(), Some(3));
    }

    #[test]
    fn quote_sugar_rewrites_to_quote_form() {
        let mut sst = StrTable::new();
        let forms = parse_string("'x", "<test>", &mut sst).unwrap();
        let n = &forms[0];
        assert!(n.is_form_named("quote", &sst));
        let Datum::List(children) = &n.datum else { panic!() };
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn bracket_sugar_rewrites_to_list_form() {
        let mut sst = StrTable::new();
        let forms = parse_string("[1 2 3]", "<test>", &mut sst).unwrap();
        assert!(forms[0].is_form_named("List", &sst));
    }

    #[test]
    fn brace_sugar_rewrites_to_table_form() {
        let mut sst = StrTable::new();
        let forms = parse_string("{}", "<test>", &mut sst).unwrap();
        assert!(forms[0].is_form_named("Table", &sst));
    }

    #[test]
    fn dollar_fn_sugar() {
        let mut sst = StrTable::new();
        let forms = parse_string("$(+ $0 $1)", "<test>", &mut sst).unwrap();
        assert!(forms[0].is_form_named("dollar-fn", &sst));
    }

    #[test]
    fn mismatched_bracket_is_error() {
        let mut sst = StrTable::new();
        assert!(parse_string("(+ 1 2]", "<test>", &mut sst).is_err());
    }

    #[test]
    fn unfinished_input_is_resumable() {
        let mut sst = StrTable::new();
        let err = parse_string("(+ 1 2", "<test>", &mut sst).unwrap_err();
        assert!(err.is_resumable());
    }

    #[test]
    fn complete_but_wrong_delimiter_is_not_resumable() {
        let mut sst = StrTable::new();
        let err = parse_string(")", "<test>", &mut sst).unwrap_err();
        assert!(!err.is_resumable());
    }
}

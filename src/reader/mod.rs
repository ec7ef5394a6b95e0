//! Scanner + parser front end: turns source text into the untyped AST graph
//! the macro expander and compiler consume. Grounded on `scan.hpp`/
//! `parse.hpp`; the AST lives outside the GC heap, owned by whoever called
//! [`parse_string`], exactly as spec.md §4.6 requires.

pub mod ast;
pub mod parser;
pub mod scanner;
pub mod token;

pub use ast::{AstKind, Datum, Node};
pub use parser::{parse_string, Parser};
pub use scanner::Scanner;
pub use token::{SourceLoc, StrId, StrTable, Token, TokenData, TokenKind};

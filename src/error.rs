//! Error kinds and the user-visible error type.
//!
//! Mirrors `luars::lua_vm::lua_error`: a small `Copy` tag enum plus a richer
//! struct that carries the message and location, implementing `Display`/
//! `std::error::Error` via `thiserror` the same way `LuaFullError` does.

use crate::reader::SourceLoc;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnErrorKind {
    Lex,
    Parse,
    ParseResumable,
    Macroexpansion,
    Compile,
    Runtime,
    Resource,
    Fatal,
}

impl fmt::Display for FnErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FnErrorKind::Lex => "lex",
            FnErrorKind::Parse | FnErrorKind::ParseResumable => "parse",
            FnErrorKind::Macroexpansion => "macroexpansion",
            FnErrorKind::Compile => "compile",
            FnErrorKind::Runtime => "runtime",
            FnErrorKind::Resource => "resource",
            FnErrorKind::Fatal => "fatal",
        };
        write!(f, "{s}")
    }
}

/// A located, user-visible interpreter error.
///
/// Format: `[subsystem] error at line L, col C in FILE: <message>` (spec.md
/// §7), with an optional appended stack trace.
#[derive(Debug, Clone, thiserror::Error)]
pub struct FnError {
    pub kind: FnErrorKind,
    pub loc: SourceLoc,
    pub file: String,
    pub message: String,
    pub trace: Vec<TraceFrame>,
}

#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub callee_name: String,
    pub pc: u32,
}

impl FnError {
    pub fn new(kind: FnErrorKind, loc: SourceLoc, file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            loc,
            file: file.into(),
            message: message.into(),
            trace: Vec::new(),
        }
    }

    /// A parse error that means "input incomplete", distinguishable from a
    /// genuine syntax error so a REPL can keep accumulating lines.
    pub fn is_resumable(&self) -> bool {
        matches!(self.kind, FnErrorKind::ParseResumable)
    }

    pub fn with_trace(mut self, trace: Vec<TraceFrame>) -> Self {
        self.trace = trace;
        self
    }
}

impl fmt::Display for FnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] error at line {}, col {} in {}: {}",
            self.kind, self.loc.line, self.loc.col, self.file, self.message
        )?;
        for frame in &self.trace {
            write!(f, "\n    at {} (pc={})", frame.callee_name, frame.pc)?;
        }
        Ok(())
    }
}

pub type FnResult<T> = Result<T, FnError>;

use std::os::fd::RawFd;

use glob::{Pattern, glob};

use super::CmdExecutor;
use crate::ast::{CmdIoRedirect, CmdPiece, PieceValue, RedirectKind};
use crate::errors::{RtResult, RuntimeError};
use crate::objects::ObjectFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    OutAppend,
    /// here-string: `content` is written to the descriptor
    InVariable,
    /// `content` names the variable receiving the output
    OutVariable,
}

impl Direction {
    pub fn is_input(&self) -> bool {
        matches!(self, Direction::In | Direction::InVariable)
    }
}

impl From<RedirectKind> for Direction {
    fn from(kind: RedirectKind) -> Self {
        match kind {
            RedirectKind::LessThan => Direction::In,
            RedirectKind::HereString => Direction::InVariable,
            RedirectKind::GreaterThan => Direction::Out,
            RedirectKind::Append => Direction::OutAppend,
            RedirectKind::ToVariable => Direction::OutVariable,
        }
    }
}

/// A resolved redirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdIoData {
    pub n_iface: RawFd,
    pub all: bool,
    pub direction: Direction,
    pub content: String,
}

/// One argument under construction. `pattern` mirrors `literal` with
/// the quoted and substituted parts escaped for globbing.
#[derive(Default)]
struct Word {
    literal: String,
    pattern: String,
    globbable: bool,
    started: bool,
}

impl Word {
    fn push_bare(&mut self, text: &str) {
        let rest = match (self.started, text.strip_prefix('~')) {
            (false, Some(rest)) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
                Some(home) => {
                    let home = home.to_string_lossy();
                    self.literal.push_str(&home);
                    self.pattern.push_str(&Pattern::escape(&home));
                    rest
                }
                None => text,
            },
            _ => text,
        };
        self.globbable |= rest.contains(['*', '?', '[']);
        self.literal.push_str(rest);
        self.pattern.push_str(rest);
        self.started = true;
    }

    fn push_verbatim(&mut self, text: &str) {
        self.literal.push_str(text);
        self.pattern.push_str(&Pattern::escape(text));
        self.started = true;
    }

    fn finish(self, out: &mut Vec<String>) {
        if self.globbable {
            if let Ok(paths) = glob(&self.pattern) {
                let mut matched: Vec<String> = paths
                    .filter_map(Result::ok)
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect();
                if !matched.is_empty() {
                    matched.sort();
                    out.extend(matched);
                    return;
                }
            }
        }
        out.push(self.literal);
    }
}

impl CmdExecutor<'_> {
    fn variable_text(&self, name: &str) -> RtResult<String> {
        let value = self
            .stack
            .lookup(name, true)?
            .map(|attr| attr.value())
            .ok_or_else(|| RuntimeError::null_access(format!("variable `{name}`")))?;
        value.to_display(&ObjectFactory::new(self.stack))
    }

    /// Pieces join until one marked `blank_after`; the last piece closes
    /// the final argument either way.
    pub fn build_args(&self, pieces: &[CmdPiece]) -> RtResult<Vec<String>> {
        let mut args = Vec::new();
        let mut word = Word::default();
        for piece in pieces {
            match piece.value() {
                PieceValue::Word(text) => word.push_bare(text),
                PieceValue::Quoted(text) => word.push_verbatim(text),
                PieceValue::Variable(name) => word.push_verbatim(&self.variable_text(name)?),
            }
            if piece.blank_after() {
                std::mem::take(&mut word).finish(&mut args);
            }
        }
        if word.started {
            word.finish(&mut args);
        }
        Ok(args)
    }

    /// Redirect operand: the built words joined by single spaces.
    pub fn build_operand(&self, pieces: &[CmdPiece]) -> RtResult<String> {
        Ok(self.build_args(pieces)?.join(" "))
    }

    pub fn build_redirect(&self, io: &CmdIoRedirect) -> RtResult<CmdIoData> {
        let direction = Direction::from(io.kind());
        let n_iface = match io.integer() {
            Some(n) => RawFd::try_from(n)
                .ok()
                .filter(|fd| *fd >= 0)
                .ok_or_else(|| RuntimeError::out_of_range(format!("file descriptor {n}")))?,
            None if direction.is_input() => 0,
            None => 1,
        };
        let content = self.build_operand(io.file_path_cmd().children())?;
        Ok(CmdIoData {
            n_iface,
            all: io.all(),
            direction,
            content,
        })
    }
}

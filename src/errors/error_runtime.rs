use std::borrow::Cow;

use crate::Int;
use nix::errno::Errno;
use thiserror::Error;

pub type RtResult<T> = Result<T, RuntimeError>;

// ============== runtime errors ==============

#[derive(Debug)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub context: Option<Cow<'static, str>>,
}

#[derive(Debug, Error)]
pub enum RuntimeErrorKind {
    #[error("incompatible type: {0}")]
    IncompatibleType(Cow<'static, str>),
    #[error("division by zero")]
    ZeroDivision,
    #[error("out of range: {0}")]
    OutOfRange(Cow<'static, str>),
    #[error("key `{0}` not found in map")]
    KeyNotFound(String),
    #[error("null access: {0}")]
    NullAccess(Cow<'static, str>),
    #[error("symbol `{0}` not defined")]
    SymbolNotFound(String),
    #[error("command `{cmd}` failed during {stage}: {errno}")]
    ProcessFailure {
        cmd: String,
        stage: &'static str,
        errno: Errno,
    },
    #[error("overflowed when: `{0}`")]
    Overflow(Cow<'static, str>),
    #[error("arguments mismatch for function `{name}`: expected {expected}, found {received}")]
    ArgumentMismatch {
        name: String,
        expected: usize,
        received: usize,
    },
    #[error("object of type `{0}` is not callable")]
    NotCallable(String),
    #[error("`{0}` has no attribute `{1}`")]
    AttributeNotFound(String, String),
    #[error("cannot reassign constant `{0}`")]
    ConstReassign(String),
    #[error("recursion depth exceeded (limit {0})")]
    RecursionDepth(usize),
    #[error("illegal return outside function")]
    EarlyReturn,
    #[error("illegal {0} outside loop")]
    EarlyBreak(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Attach a description of what was being evaluated. The innermost
    /// context wins; outer frames do not overwrite it.
    pub fn with_context(mut self, context: impl Into<Cow<'static, str>>) -> Self {
        if self.context.is_none() {
            self.context = Some(context.into());
        }
        self
    }

    pub fn incompatible(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(RuntimeErrorKind::IncompatibleType(msg.into()))
    }

    pub fn out_of_range(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(RuntimeErrorKind::OutOfRange(msg.into()))
    }

    pub fn overflow(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(RuntimeErrorKind::Overflow(msg.into()))
    }

    pub fn null_access(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(RuntimeErrorKind::NullAccess(msg.into()))
    }

    pub fn process(cmd: &str, stage: &'static str, errno: Errno) -> Self {
        Self::new(RuntimeErrorKind::ProcessFailure {
            cmd: cmd.to_string(),
            stage,
            errno,
        })
    }

    pub fn kind(&self) -> &RuntimeErrorKind {
        &self.kind
    }
}

impl From<RuntimeErrorKind> for RuntimeError {
    fn from(kind: RuntimeErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        Self::new(RuntimeErrorKind::Io(err))
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.context {
            Some(ctx) => write!(f, "{}\n  while evaluating: {}", self.kind, ctx),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

impl RuntimeError {
    pub const ERROR_CODE_INCOMPATIBLE_TYPE: Int = 1;
    pub const ERROR_CODE_ZERO_DIVISION: Int = 2;
    pub const ERROR_CODE_OUT_OF_RANGE: Int = 3;
    pub const ERROR_CODE_KEY_NOT_FOUND: Int = 4;
    pub const ERROR_CODE_NULL_ACCESS: Int = 5;
    pub const ERROR_CODE_SYMBOL_NOT_FOUND: Int = 6;
    pub const ERROR_CODE_PROCESS_FAILURE: Int = 7;
    pub const ERROR_CODE_OVERFLOW: Int = 8;
    pub const ERROR_CODE_ARGUMENT_MISMATCH: Int = 9;
    pub const ERROR_CODE_NOT_CALLABLE: Int = 10;
    pub const ERROR_CODE_ATTRIBUTE_NOT_FOUND: Int = 11;
    pub const ERROR_CODE_CONST_REASSIGN: Int = 12;
    pub const ERROR_CODE_RECURSION_DEPTH: Int = 13;
    pub const ERROR_CODE_EARLY_RETURN: Int = 14;
    pub const ERROR_CODE_EARLY_BREAK: Int = 15;
    pub const ERROR_CODE_IO: Int = 16;

    pub fn code(&self) -> Int {
        match self.kind {
            RuntimeErrorKind::IncompatibleType(..) => Self::ERROR_CODE_INCOMPATIBLE_TYPE,
            RuntimeErrorKind::ZeroDivision => Self::ERROR_CODE_ZERO_DIVISION,
            RuntimeErrorKind::OutOfRange(..) => Self::ERROR_CODE_OUT_OF_RANGE,
            RuntimeErrorKind::KeyNotFound(..) => Self::ERROR_CODE_KEY_NOT_FOUND,
            RuntimeErrorKind::NullAccess(..) => Self::ERROR_CODE_NULL_ACCESS,
            RuntimeErrorKind::SymbolNotFound(..) => Self::ERROR_CODE_SYMBOL_NOT_FOUND,
            RuntimeErrorKind::ProcessFailure { .. } => Self::ERROR_CODE_PROCESS_FAILURE,
            RuntimeErrorKind::Overflow(..) => Self::ERROR_CODE_OVERFLOW,
            RuntimeErrorKind::ArgumentMismatch { .. } => Self::ERROR_CODE_ARGUMENT_MISMATCH,
            RuntimeErrorKind::NotCallable(..) => Self::ERROR_CODE_NOT_CALLABLE,
            RuntimeErrorKind::AttributeNotFound(..) => Self::ERROR_CODE_ATTRIBUTE_NOT_FOUND,
            RuntimeErrorKind::ConstReassign(..) => Self::ERROR_CODE_CONST_REASSIGN,
            RuntimeErrorKind::RecursionDepth(..) => Self::ERROR_CODE_RECURSION_DEPTH,
            RuntimeErrorKind::EarlyReturn => Self::ERROR_CODE_EARLY_RETURN,
            RuntimeErrorKind::EarlyBreak(..) => Self::ERROR_CODE_EARLY_BREAK,
            RuntimeErrorKind::Io(..) => Self::ERROR_CODE_IO,
        }
    }
}

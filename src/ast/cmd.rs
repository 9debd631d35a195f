use crate::Int;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PieceValue {
    /// Bare word: tilde and glob expansion apply.
    Word(String),
    /// Quoted text, taken verbatim.
    Quoted(String),
    /// `$name`, replaced by the variable's display text.
    Variable(String),
}

/// Fragment of a command word. Adjacent pieces join into one argument
/// until a piece with `blank_after` set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdPiece {
    pub value: PieceValue,
    pub blank_after: bool,
}

impl CmdPiece {
    pub fn word(text: impl Into<String>, blank_after: bool) -> Self {
        Self {
            value: PieceValue::Word(text.into()),
            blank_after,
        }
    }

    pub fn quoted(text: impl Into<String>, blank_after: bool) -> Self {
        Self {
            value: PieceValue::Quoted(text.into()),
            blank_after,
        }
    }

    pub fn variable(name: impl Into<String>, blank_after: bool) -> Self {
        Self {
            value: PieceValue::Variable(name.into()),
            blank_after,
        }
    }

    pub fn value(&self) -> &PieceValue {
        &self.value
    }

    pub fn blank_after(&self) -> bool {
        self.blank_after
    }
}

fn words_to_pieces(words: &[&str]) -> Vec<CmdPiece> {
    let last = words.len().saturating_sub(1);
    words
        .iter()
        .enumerate()
        .map(|(i, w)| CmdPiece::word(*w, i != last))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleCmd {
    pieces: Vec<CmdPiece>,
}

impl SimpleCmd {
    pub fn new(pieces: Vec<CmdPiece>) -> Self {
        Self { pieces }
    }

    /// One bare word per argument.
    pub fn from_words(words: &[&str]) -> Self {
        Self::new(words_to_pieces(words))
    }

    pub fn children(&self) -> &[CmdPiece] {
        &self.pieces
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePathCmd {
    pieces: Vec<CmdPiece>,
}

impl FilePathCmd {
    pub fn new(pieces: Vec<CmdPiece>) -> Self {
        Self { pieces }
    }

    pub fn from_words(words: &[&str]) -> Self {
        Self::new(words_to_pieces(words))
    }

    pub fn children(&self) -> &[CmdPiece] {
        &self.pieces
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// `<`
    LessThan,
    /// `<<<`: operand text is fed to the descriptor
    HereString,
    /// `>`
    GreaterThan,
    /// `>>`
    Append,
    /// `>>>`: output is stored in the named variable
    ToVariable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdIoRedirect {
    file_path: FilePathCmd,
    integer: Option<Int>,
    all: bool,
    kind: RedirectKind,
}

impl CmdIoRedirect {
    pub fn new(kind: RedirectKind, file_path: FilePathCmd) -> Self {
        Self {
            file_path,
            integer: None,
            all: false,
            kind,
        }
    }

    /// Explicit descriptor number, as in `2> err.log`.
    pub fn with_fd(mut self, fd: Int) -> Self {
        self.integer = Some(fd);
        self
    }

    /// Redirect both stdout and stderr.
    pub fn with_all(mut self) -> Self {
        self.all = true;
        self
    }

    pub fn file_path_cmd(&self) -> &FilePathCmd {
        &self.file_path
    }

    pub fn has_integer(&self) -> bool {
        self.integer.is_some()
    }

    pub fn integer(&self) -> Option<Int> {
        self.integer
    }

    pub fn all(&self) -> bool {
        self.all
    }

    pub fn kind(&self) -> RedirectKind {
        self.kind
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdIoRedirectList {
    cmd: SimpleCmd,
    redirects: Vec<CmdIoRedirect>,
}

impl CmdIoRedirectList {
    pub fn new(cmd: SimpleCmd, redirects: Vec<CmdIoRedirect>) -> Self {
        Self { cmd, redirects }
    }

    pub fn cmd(&self) -> &SimpleCmd {
        &self.cmd
    }

    pub fn children(&self) -> &[CmdIoRedirect] {
        &self.redirects
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdPipeSequence {
    stages: Vec<Cmd>,
}

impl CmdPipeSequence {
    pub fn new(stages: Vec<Cmd>) -> Self {
        Self { stages }
    }

    pub fn children(&self) -> &[Cmd] {
        &self.stages
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cmd {
    Simple(SimpleCmd),
    IoRedirectList(CmdIoRedirectList),
    PipeSequence(CmdPipeSequence),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdFull {
    cmd: Cmd,
    background: bool,
}

impl CmdFull {
    pub fn new(cmd: Cmd) -> Self {
        Self {
            cmd,
            background: false,
        }
    }

    pub fn in_background(cmd: Cmd) -> Self {
        Self {
            cmd,
            background: true,
        }
    }

    pub fn cmd(&self) -> &Cmd {
        &self.cmd
    }

    pub fn background(&self) -> bool {
        self.background
    }
}

impl From<SimpleCmd> for Cmd {
    fn from(cmd: SimpleCmd) -> Self {
        Cmd::Simple(cmd)
    }
}

impl From<CmdIoRedirectList> for Cmd {
    fn from(cmd: CmdIoRedirectList) -> Self {
        Cmd::IoRedirectList(cmd)
    }
}

impl From<CmdPipeSequence> for Cmd {
    fn from(cmd: CmdPipeSequence) -> Self {
        Cmd::PipeSequence(cmd)
    }
}

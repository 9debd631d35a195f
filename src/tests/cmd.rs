use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use crate::ast::{
    Cmd, CmdFull, CmdIoRedirect, CmdIoRedirectList, CmdPiece, CmdPipeSequence, FilePathCmd, RedirectKind,
    SimpleCmd,
};
use crate::childman;
use crate::cmd::{CmdExecutor, CmdOutput, Direction, STATUS_VAR};
use crate::errors::RuntimeErrorKind;
use crate::objects::ObjectFactory;
use crate::symbol_table::SymbolTableStack;

fn simple(words: &[&str]) -> Cmd {
    SimpleCmd::from_words(words).into()
}

fn redirect(kind: RedirectKind, path: &Path) -> CmdIoRedirect {
    let operand = FilePathCmd::new(vec![CmdPiece::quoted(path.to_string_lossy(), false)]);
    CmdIoRedirect::new(kind, operand)
}

fn with_redirects(words: &[&str], redirects: Vec<CmdIoRedirect>) -> Cmd {
    CmdIoRedirectList::new(SimpleCmd::from_words(words), redirects).into()
}

fn pipeline(stages: Vec<Cmd>) -> Cmd {
    CmdPipeSequence::new(stages).into()
}

#[track_caller]
fn capture(stack: &SymbolTableStack, cmd: Cmd) -> CmdOutput {
    CmdExecutor::new(stack)
        .exec_get_result(&CmdFull::new(cmd))
        .expect("command should run")
}

#[track_caller]
fn status(stack: &SymbolTableStack, cmd: Cmd) -> Option<i32> {
    CmdExecutor::new(stack)
        .exec(&CmdFull::new(cmd))
        .expect("command should run")
}

fn output(status: i32, text: &str) -> CmdOutput {
    CmdOutput {
        status,
        output: text.to_string(),
    }
}

// ============================================================================
// simple commands
// ============================================================================

#[test]
fn test_capture_echo() {
    let stack = SymbolTableStack::new();
    assert_eq!(capture(&stack, simple(&["echo", "hello"])), output(0, "hello\n"));
}

#[test]
fn test_exit_status_is_recorded() {
    let stack = SymbolTableStack::new();
    assert_eq!(status(&stack, simple(&["true"])), Some(0));
    assert_eq!(status(&stack, simple(&["sh", "-c", "exit 3"])), Some(3));
    let recorded = stack.lookup(STATUS_VAR, true).unwrap().unwrap();
    assert!(recorded.is_global());
    assert_eq!(recorded.value().as_int(), Some(3));
}

#[test]
fn test_signal_status() {
    let stack = SymbolTableStack::new();
    assert_eq!(status(&stack, simple(&["sh", "-c", "kill -TERM $$"])), Some(128 + 15));
}

#[test]
fn test_missing_program() {
    let stack = SymbolTableStack::new();
    let node = CmdFull::new(simple(&["shpp-no-such-program-xyz"]));
    let err = CmdExecutor::new(&stack).exec(&node).unwrap_err();
    match err.kind {
        RuntimeErrorKind::ProcessFailure { cmd, stage, errno } => {
            assert_eq!(cmd, "shpp-no-such-program-xyz");
            assert_eq!(stage, "exec");
            assert_eq!(errno, Errno::ENOENT);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_empty_command() {
    let stack = SymbolTableStack::new();
    let node = CmdFull::new(SimpleCmd::new(vec![]).into());
    let err = CmdExecutor::new(&stack).exec(&node).unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::ProcessFailure { errno: Errno::ENOENT, .. }));

    let node = CmdFull::new(pipeline(vec![]));
    let err = CmdExecutor::new(&stack).exec(&node).unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::IncompatibleType(_)));
}

#[test]
fn test_large_output_is_drained() {
    let stack = SymbolTableStack::new();
    let result = capture(&stack, simple(&["head", "-c", "300000", "/dev/zero"]));
    assert_eq!(result.status, 0);
    assert_eq!(result.output.len(), 300_000);
}

// ============================================================================
// argument building
// ============================================================================

#[test]
fn test_pieces_join_until_blank() {
    let stack = SymbolTableStack::new();
    let f = ObjectFactory::new(&stack);
    stack.insert("name", f.new_string("world"), false);
    stack.insert("count", f.new_int(3), false);
    let pieces = vec![
        CmdPiece::word("a", false),
        CmdPiece::quoted("b c", true),
        CmdPiece::word("hello-", false),
        CmdPiece::variable("name", true),
        CmdPiece::variable("count", false),
    ];
    let args = CmdExecutor::new(&stack).build_args(&pieces).unwrap();
    assert_eq!(args, vec!["ab c", "hello-world", "3"]);

    let err = CmdExecutor::new(&stack)
        .build_args(&[CmdPiece::variable("undefined", false)])
        .unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::SymbolNotFound(_)));
}

#[test]
fn test_tilde_expansion() {
    let Some(home) = dirs::home_dir() else {
        return;
    };
    let home = home.to_string_lossy().into_owned();
    let stack = SymbolTableStack::new();
    let exec = CmdExecutor::new(&stack);
    let args = exec
        .build_args(&[
            CmdPiece::word("~", true),
            CmdPiece::word("~/notes", true),
            CmdPiece::quoted("~", true),
            CmdPiece::word("a~", false),
        ])
        .unwrap();
    assert_eq!(args, vec![home.clone(), format!("{home}/notes"), "~".into(), "a~".into()]);
}

#[test]
fn test_glob_expansion() {
    let dir = tempdir().unwrap();
    for name in ["b.txt", "a.txt", "c.log"] {
        fs::write(dir.path().join(name), "").unwrap();
    }
    let base = format!("{}/", dir.path().display());
    let stack = SymbolTableStack::new();
    let exec = CmdExecutor::new(&stack);

    let args = exec
        .build_args(&[CmdPiece::quoted(base.clone(), false), CmdPiece::word("*.txt", false)])
        .unwrap();
    assert_eq!(args, vec![format!("{base}a.txt"), format!("{base}b.txt")]);

    // quoted patterns stay literal
    let args = exec.build_args(&[CmdPiece::quoted(format!("{base}*.txt"), false)]).unwrap();
    assert_eq!(args, vec![format!("{base}*.txt")]);

    // no match keeps the word as written
    let args = exec
        .build_args(&[CmdPiece::quoted(base.clone(), false), CmdPiece::word("*.none", false)])
        .unwrap();
    assert_eq!(args, vec![format!("{base}*.none")]);
}

#[test]
fn test_redirect_descriptors() {
    let stack = SymbolTableStack::new();
    let exec = CmdExecutor::new(&stack);
    let operand = FilePathCmd::from_words(&["out.log"]);

    let out = exec
        .build_redirect(&CmdIoRedirect::new(RedirectKind::GreaterThan, operand.clone()))
        .unwrap();
    assert_eq!((out.n_iface, out.direction, out.content.as_str()), (1, Direction::Out, "out.log"));

    let input = exec
        .build_redirect(&CmdIoRedirect::new(RedirectKind::LessThan, operand.clone()))
        .unwrap();
    assert_eq!(input.n_iface, 0);

    let err_fd = exec
        .build_redirect(&CmdIoRedirect::new(RedirectKind::Append, operand.clone()).with_fd(2))
        .unwrap();
    assert_eq!((err_fd.n_iface, err_fd.direction), (2, Direction::OutAppend));

    let err = exec
        .build_redirect(&CmdIoRedirect::new(RedirectKind::GreaterThan, operand).with_fd(-1))
        .unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::OutOfRange(_)));

    let words = FilePathCmd::from_words(&["two", "words"]);
    let here = exec
        .build_redirect(&CmdIoRedirect::new(RedirectKind::HereString, words))
        .unwrap();
    assert_eq!((here.n_iface, here.content.as_str()), (0, "two words"));
}

// ============================================================================
// redirections
// ============================================================================

#[test]
fn test_output_redirect_and_append() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let stack = SymbolTableStack::new();

    let cmd = with_redirects(&["echo", "first"], vec![redirect(RedirectKind::GreaterThan, &path)]);
    assert_eq!(status(&stack, cmd), Some(0));
    assert_eq!(fs::read_to_string(&path).unwrap(), "first\n");

    let cmd = with_redirects(&["echo", "second"], vec![redirect(RedirectKind::Append, &path)]);
    assert_eq!(status(&stack, cmd), Some(0));
    assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");

    let cmd = with_redirects(&["echo", "third"], vec![redirect(RedirectKind::GreaterThan, &path)]);
    status(&stack, cmd);
    assert_eq!(fs::read_to_string(&path).unwrap(), "third\n");
}

#[test]
fn test_input_redirect() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("in.txt");
    fs::write(&path, "from file\n").unwrap();
    let stack = SymbolTableStack::new();
    let cmd = with_redirects(&["cat"], vec![redirect(RedirectKind::LessThan, &path)]);
    assert_eq!(capture(&stack, cmd), output(0, "from file\n"));

    let missing = dir.path().join("missing.txt");
    let node = CmdFull::new(with_redirects(&["cat"], vec![redirect(RedirectKind::LessThan, &missing)]));
    let err = CmdExecutor::new(&stack).exec(&node).unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::Io(_)));
}

#[test]
fn test_stderr_and_all_redirects() {
    let dir = tempdir().unwrap();
    let err_path = dir.path().join("err.txt");
    let all_path = dir.path().join("all.txt");
    let stack = SymbolTableStack::new();
    let script = ["sh", "-c", "echo out; echo err 1>&2"];

    let cmd = with_redirects(&script, vec![redirect(RedirectKind::GreaterThan, &err_path).with_fd(2)]);
    assert_eq!(capture(&stack, cmd), output(0, "out\n"));
    assert_eq!(fs::read_to_string(&err_path).unwrap(), "err\n");

    let cmd = with_redirects(&script, vec![redirect(RedirectKind::GreaterThan, &all_path).with_all()]);
    assert_eq!(capture(&stack, cmd), output(0, ""));
    assert_eq!(fs::read_to_string(&all_path).unwrap(), "out\nerr\n");
}

#[test]
fn test_here_string() {
    let stack = SymbolTableStack::new();
    let operand = FilePathCmd::new(vec![CmdPiece::quoted("fed text", false)]);
    let cmd = with_redirects(&["cat"], vec![CmdIoRedirect::new(RedirectKind::HereString, operand)]);
    assert_eq!(capture(&stack, cmd), output(0, "fed text\n"));
}

#[test]
fn test_output_to_variable() {
    let mut stack = SymbolTableStack::new();
    stack.push_scope();
    let operand = FilePathCmd::from_words(&["result"]);
    let cmd = with_redirects(
        &["echo", "kept"],
        vec![CmdIoRedirect::new(RedirectKind::ToVariable, operand)],
    );
    assert_eq!(status(&stack, cmd), Some(0));
    let bound = stack.lookup_local("result").unwrap();
    assert_eq!(bound.value().as_str(), Some("kept\n"));
}

// ============================================================================
// pipelines
// ============================================================================

#[test]
fn test_two_stage_pipeline() {
    let stack = SymbolTableStack::new();
    let cmd = pipeline(vec![simple(&["echo", "hello"]), simple(&["tr", "a-z", "A-Z"])]);
    assert_eq!(capture(&stack, cmd), output(0, "HELLO\n"));
}

#[test]
fn test_three_stage_pipeline() {
    let stack = SymbolTableStack::new();
    let cmd = pipeline(vec![
        simple(&["printf", "b\\na\\nc\\n"]),
        simple(&["sort"]),
        simple(&["head", "-n", "2"]),
    ]);
    assert_eq!(capture(&stack, cmd), output(0, "a\nb\n"));
}

#[test]
fn test_pipeline_status_is_last_stage() {
    let stack = SymbolTableStack::new();
    assert_eq!(status(&stack, pipeline(vec![simple(&["true"]), simple(&["false"])])), Some(1));
    assert_eq!(status(&stack, pipeline(vec![simple(&["false"]), simple(&["true"])])), Some(0));
}

#[test]
fn test_redirect_overrides_pipe() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("diverted.txt");
    let stack = SymbolTableStack::new();
    let cmd = pipeline(vec![
        with_redirects(&["echo", "diverted"], vec![redirect(RedirectKind::GreaterThan, &path)]),
        simple(&["cat"]),
    ]);
    assert_eq!(capture(&stack, cmd), output(0, ""));
    assert_eq!(fs::read_to_string(&path).unwrap(), "diverted\n");
}

#[test]
fn test_failed_stage_aborts_pipeline() {
    let stack = SymbolTableStack::new();
    let node = CmdFull::new(pipeline(vec![
        simple(&["sleep", "5"]),
        simple(&["shpp-no-such-program-xyz"]),
    ]));
    let started = Instant::now();
    let err = CmdExecutor::new(&stack).exec(&node).unwrap_err();
    assert!(matches!(err.kind, RuntimeErrorKind::ProcessFailure { stage: "exec", .. }));
    assert!(started.elapsed() < Duration::from_secs(4));
}

// ============================================================================
// descriptors
// ============================================================================

#[cfg(target_os = "linux")]
fn open_fds() -> std::collections::BTreeSet<String> {
    fs::read_dir("/proc/self/fd")
        .unwrap()
        .filter_map(|entry| entry.ok().map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect()
}

#[cfg(target_os = "linux")]
#[test]
fn test_no_descriptor_outlives_a_command() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.txt");
    let stack = SymbolTableStack::new();
    let before = open_fds();

    for _ in 0..20 {
        assert_eq!(capture(&stack, simple(&["echo", "x"])), output(0, "x\n"));
        let cmd = pipeline(vec![
            simple(&["printf", "b\\na\\n"]),
            simple(&["sort"]),
            simple(&["head", "-n", "1"]),
        ]);
        assert_eq!(capture(&stack, cmd), output(0, "a\n"));

        let failing = CmdFull::new(pipeline(vec![
            simple(&["echo", "x"]),
            simple(&["shpp-no-such-program-xyz"]),
        ]));
        assert!(CmdExecutor::new(&stack).exec(&failing).is_err());

        let node = CmdFull::new(with_redirects(&["cat"], vec![redirect(RedirectKind::LessThan, &missing)]));
        assert!(CmdExecutor::new(&stack).exec(&node).is_err());

        let operand = FilePathCmd::new(vec![CmdPiece::quoted("fed", false)]);
        let cmd = with_redirects(&["cat"], vec![CmdIoRedirect::new(RedirectKind::HereString, operand)]);
        assert_eq!(capture(&stack, cmd), output(0, "fed\n"));
    }

    // other tests run in parallel and open descriptors of their own; only
    // one that stays open past the deadline counts
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let leaked: Vec<String> = open_fds().difference(&before).cloned().collect();
        if leaked.is_empty() {
            break;
        }
        assert!(Instant::now() < deadline, "descriptors left open: {leaked:?}");
        std::thread::sleep(Duration::from_millis(20));
    }
}

// ============================================================================
// background
// ============================================================================

#[test]
fn test_background_then_reap() {
    let stack = SymbolTableStack::new();
    let node = CmdFull::in_background(simple(&["sh", "-c", "exit 7"]));
    assert_eq!(CmdExecutor::new(&stack).exec(&node).unwrap(), None);

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut reaped = Vec::new();
    while Instant::now() < deadline {
        reaped.extend(childman::reap_background().unwrap());
        if reaped.iter().any(|(_, code)| *code == 7) {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(reaped.iter().any(|(_, code)| *code == 7), "reaped {reaped:?}");
}

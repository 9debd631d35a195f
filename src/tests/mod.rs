mod cmd;
mod config;
mod interpreter;

use crate::ast::{Expression, Statement};
use crate::errors::{RtResult, RuntimeError};
use crate::{Executor, ObjectPtr};

// ============================================================================
// helpers
// ============================================================================

#[track_caller]
fn eval_test(expr: Expression) -> ObjectPtr {
    let exec = Executor::new();
    exec.eval(&expr).expect("evaluation should succeed")
}

#[track_caller]
fn eval_test_err(expr: Expression) -> RuntimeError {
    let exec = Executor::new();
    match exec.eval(&expr) {
        Ok(v) => panic!("expected an error, got {v:?}"),
        Err(e) => e,
    }
}

fn run_program(program: Vec<Statement>) -> RtResult<ObjectPtr> {
    Executor::new().run(&program)
}

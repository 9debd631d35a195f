#[cfg(test)]
mod tests;

#[cfg(not(unix))]
compile_error!("shpp forks and execs processes and only builds on unix");

pub type Int = i64;

pub mod ast;
pub mod childman;
pub mod cmd;
pub mod config;
pub mod errors;
pub mod interpreter;
pub mod objects;
pub mod runtime;
pub mod symbol_table;

pub use cmd::{CmdExecutor, CmdOutput};
pub use config::ShellConfig;
pub use errors::{RtResult, RuntimeError, RuntimeErrorKind, ShError};
pub use interpreter::{Executor, Flow};
pub use objects::{MapObject, Object, ObjectFactory, ObjectPtr, ObjectType};
pub use symbol_table::{SymbolAttr, SymbolTable, SymbolTableStack, TableKind};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

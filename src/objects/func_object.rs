use std::fmt;
use std::rc::{Rc, Weak};

use super::{Object, ObjectFactory, ObjectPtr};
use crate::ast::FuncDecl;
use crate::errors::{RtResult, RuntimeError, RuntimeErrorKind};
use crate::interpreter::Executor;
use crate::runtime::{DepthGuard, ensure_sufficient_stack};
use crate::symbol_table::{SymbolTableStack, TableKind};

pub type BuiltinFn = fn(&[ObjectPtr], &ObjectFactory<'_>) -> RtResult<ObjectPtr>;

#[derive(Clone)]
pub struct Builtin {
    pub name: String,
    pub body: BuiltinFn,
    pub help: String,
    pub hint: String,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Builtin@{}", self.name)
    }
}

pub enum FuncObject {
    /// User function closing over the scopes live at its declaration.
    Declared {
        decl: Rc<FuncDecl>,
        stack: SymbolTableStack,
    },
    Builtin(Builtin),
    /// Method with its receiver fixed as the first argument.
    Bound {
        func: ObjectPtr,
        receiver: Receiver,
    },
}

/// Instances are held weakly so storing `obj.method` on `obj` is not a cycle.
pub enum Receiver {
    Value(ObjectPtr),
    Instance(Weak<Object>),
}

impl Receiver {
    fn get(&self, method: &str) -> RtResult<ObjectPtr> {
        match self {
            Receiver::Value(value) => Ok(value.clone()),
            Receiver::Instance(weak) => weak.upgrade().ok_or_else(|| {
                RuntimeError::null_access(format!("receiver of `{method}` was released"))
            }),
        }
    }
}

pub fn check_exact_args_len(name: &str, args: &[ObjectPtr], expected: usize) -> RtResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(RuntimeError::new(RuntimeErrorKind::ArgumentMismatch {
            name: name.to_string(),
            expected,
            received: args.len(),
        }))
    }
}

impl FuncObject {
    pub fn name(&self) -> &str {
        match self {
            FuncObject::Declared { decl, .. } => &decl.name,
            FuncObject::Builtin(b) => &b.name,
            FuncObject::Bound { func, .. } => match func.as_ref() {
                Object::Func(inner) => inner.name(),
                _ => "<bound>",
            },
        }
    }

    pub fn help(&self) -> Option<&str> {
        match self {
            FuncObject::Builtin(b) => Some(&b.help),
            _ => None,
        }
    }

    pub fn call(&self, args: Vec<ObjectPtr>, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match self {
            FuncObject::Declared { decl, stack } => {
                check_exact_args_len(&decl.name, &args, decl.params.len())?;
                let _guard = DepthGuard::enter()?;
                let mut frame = stack.clone();
                frame.push(TableKind::Function);
                for (param, arg) in decl.params.iter().zip(args) {
                    frame.insert(param, arg, false);
                }
                ensure_sufficient_stack(|| Executor::nested(frame).call_body(&decl.body))
                    .map_err(|e| e.with_context(format!("call to `{}`", decl.name)))
            }
            FuncObject::Builtin(b) => (b.body)(&args, f),
            FuncObject::Bound { func, receiver } => {
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(receiver.get(self.name())?);
                full.extend(args);
                Object::call(func, full, f)
            }
        }
    }
}

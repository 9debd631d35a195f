mod builtins;
pub use builtins::get_builtin_map;

use tracing::debug;

use crate::ast::{AssignTarget, BinaryOp, ClassDecl, CmdFull, Expression, Literal, Statement, UnaryOp};
use crate::cmd::CmdExecutor;
use crate::config::ShellConfig;
use crate::errors::{RtResult, RuntimeError, RuntimeErrorKind};
use crate::objects::{Object, ObjectFactory, ObjectPtr};
use crate::runtime::ensure_sufficient_stack;
use crate::symbol_table::SymbolTableStack;

/// How a statement finished.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(ObjectPtr),
}

/// Tree-walking evaluator over a symbol table stack.
///
/// Nested blocks and calls run on a clone of the stack with a frame pushed,
/// so the frame goes away with the clone on every exit path.
pub struct Executor {
    stack: SymbolTableStack,
    owns_root: bool,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    /// Fresh root scope with the builtin functions and types registered.
    pub fn new() -> Self {
        let stack = SymbolTableStack::new();
        builtins::register(&stack);
        Self {
            stack,
            owns_root: true,
        }
    }

    pub fn with_config(config: &ShellConfig) -> Self {
        config.apply();
        Self::new()
    }

    pub fn nested(stack: SymbolTableStack) -> Self {
        Self {
            stack,
            owns_root: false,
        }
    }

    pub fn stack(&self) -> &SymbolTableStack {
        &self.stack
    }

    pub fn factory(&self) -> ObjectFactory<'_> {
        ObjectFactory::new(&self.stack)
    }

    pub fn lookup(&self, name: &str) -> RtResult<ObjectPtr> {
        self.stack
            .lookup(name, true)?
            .map(|attr| attr.value())
            .ok_or_else(|| RuntimeError::new(RuntimeErrorKind::SymbolNotFound(name.to_string())))
    }

    /// Runs a program and yields the value of its last expression statement.
    pub fn run(&self, program: &[Statement]) -> RtResult<ObjectPtr> {
        let mut last = self.factory().new_null();
        for stmt in program {
            if let Statement::Expr(expr) = stmt {
                last = self.eval(expr)?;
                continue;
            }
            match self.exec(stmt)? {
                Flow::Normal => {}
                Flow::Break => return Err(RuntimeErrorKind::EarlyBreak("break").into()),
                Flow::Continue => return Err(RuntimeErrorKind::EarlyBreak("continue").into()),
                Flow::Return(_) => return Err(RuntimeErrorKind::EarlyReturn.into()),
            }
        }
        Ok(last)
    }

    pub(crate) fn call_body(&self, body: &[Statement]) -> RtResult<ObjectPtr> {
        match self.exec_stmts(body)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(self.factory().new_null()),
            Flow::Break => Err(RuntimeErrorKind::EarlyBreak("break").into()),
            Flow::Continue => Err(RuntimeErrorKind::EarlyBreak("continue").into()),
        }
    }

    fn exec_stmts(&self, stmts: &[Statement]) -> RtResult<Flow> {
        for stmt in stmts {
            match self.exec(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_block(&self, stmts: &[Statement]) -> RtResult<Flow> {
        let mut inner = Executor::nested(self.stack.clone());
        inner.stack.push_scope();
        inner.exec_stmts(stmts)
    }

    pub fn exec(&self, stmt: &Statement) -> RtResult<Flow> {
        match stmt {
            Statement::Expr(expr) => {
                self.eval(expr)?;
            }
            Statement::Assign {
                target,
                value,
                global,
                constant,
            } => {
                let value = self.eval(value)?;
                self.assign(target, value, *global, *constant)?;
            }
            Statement::Del(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                target.del_item(&index, &self.factory())?;
            }
            Statement::Block(body) => return self.exec_block(body),
            Statement::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.eval(cond)?;
                return if cond.is_truthy(&self.factory())? {
                    self.exec_block(then)
                } else {
                    self.exec_block(otherwise)
                };
            }
            Statement::While { cond, body } => loop {
                if !self.eval(cond)?.is_truthy(&self.factory())? {
                    break;
                }
                match self.exec_block(body)? {
                    Flow::Break => break,
                    Flow::Return(v) => return Ok(Flow::Return(v)),
                    Flow::Normal | Flow::Continue => {}
                }
            },
            Statement::For {
                var,
                iterable,
                body,
            } => {
                let f = self.factory();
                let mut items = self.eval(iterable)?.iterate(&f)?;
                while let Some(item) = items.next_item(&f)? {
                    let mut inner = Executor::nested(self.stack.clone());
                    inner.stack.push_scope();
                    inner.stack.insert(var, item, false);
                    match inner.exec_stmts(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Statement::Break => return Ok(Flow::Break),
            Statement::Continue => return Ok(Flow::Continue),
            Statement::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => self.factory().new_null(),
                };
                return Ok(Flow::Return(value));
            }
            Statement::FuncDecl(decl) => {
                let func = self.factory().new_func(decl.clone());
                self.stack.insert(&decl.name, func, false);
            }
            Statement::ClassDecl(decl) => self.declare_class(decl)?,
            Statement::Cmd(cmd) => self.exec_cmd(cmd)?,
        }
        Ok(Flow::Normal)
    }

    fn exec_cmd(&self, cmd: &CmdFull) -> RtResult<()> {
        let status = CmdExecutor::new(&self.stack).exec(cmd)?;
        debug!(?status, "command statement finished");
        Ok(())
    }

    fn assign(&self, target: &AssignTarget, value: ObjectPtr, global: bool, constant: bool) -> RtResult<()> {
        match target {
            AssignTarget::Name(name) => {
                let existing = if global {
                    self.stack.root().borrow().get(name).cloned()
                } else if constant {
                    self.stack.lookup_local(name)
                } else {
                    None
                };
                if existing.is_some_and(|attr| attr.is_const()) {
                    return Err(RuntimeErrorKind::ConstReassign(name.clone()).into());
                }
                match (global, constant) {
                    (_, true) => self.stack.insert_const(name, value, global),
                    (true, false) => self.stack.insert(name, value, true),
                    (false, false) => self.stack.assign(name, value)?,
                }
                Ok(())
            }
            AssignTarget::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                target.set_item(&index, value, &self.factory())
            }
            AssignTarget::Attribute(target, name) => {
                let target = self.eval(target)?;
                Object::attr_assign(&target, name, value)
            }
        }
    }

    /// Methods close over the enclosing scopes, not over the class table.
    fn declare_class(&self, decl: &ClassDecl) -> RtResult<()> {
        let mut class_stack = self.stack.clone();
        class_stack.new_class_table();
        for stmt in &decl.body {
            match stmt {
                Statement::FuncDecl(method) => {
                    let func = self.factory().new_func(method.clone());
                    class_stack.insert(&method.name, func, false);
                }
                Statement::Assign {
                    target: AssignTarget::Name(name),
                    value,
                    ..
                } => {
                    let value = self.eval(value)?;
                    class_stack.insert(name, value, false);
                }
                _ => {
                    return Err(RuntimeError::incompatible(format!(
                        "class `{}` body may only hold methods and attributes",
                        decl.name
                    )));
                }
            }
        }
        let class = self.factory().new_class_type(&decl.name, class_stack);
        self.stack.insert(&decl.name, class, false);
        Ok(())
    }

    pub fn eval(&self, expr: &Expression) -> RtResult<ObjectPtr> {
        ensure_sufficient_stack(|| self.eval_expr(expr))
    }

    fn eval_expr(&self, expr: &Expression) -> RtResult<ObjectPtr> {
        let f = self.factory();
        match expr {
            Expression::Literal(lit) => Ok(match lit {
                Literal::Null => f.new_null(),
                Literal::Bool(b) => f.new_bool(*b),
                Literal::Int(i) => f.new_int(*i),
                Literal::Real(r) => f.new_real(*r),
                Literal::String(s) => f.new_string(s.as_str()),
            }),
            Expression::Identifier(name) => self.lookup(name),
            Expression::Binary(BinaryOp::And, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if !lhs.is_truthy(&f)? {
                    return Ok(f.new_bool(false));
                }
                let rhs = self.eval(rhs)?;
                lhs.and(&rhs, &f)
            }
            Expression::Binary(BinaryOp::Or, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                if lhs.is_truthy(&f)? {
                    return Ok(f.new_bool(true));
                }
                let rhs = self.eval(rhs)?;
                lhs.or(&rhs, &f)
            }
            Expression::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, &lhs, &rhs, &f).map_err(|e| {
                    e.with_context(format!("{} {} {}", lhs.print(), op.symbol(), rhs.print()))
                })
            }
            Expression::Unary(op, operand) => {
                let operand = self.eval(operand)?;
                match op {
                    UnaryOp::Plus => operand.unary_add(&f),
                    UnaryOp::Minus => operand.unary_sub(&f),
                    UnaryOp::BitNot => operand.bit_not(&f),
                    UnaryOp::Not => operand.logical_not(&f),
                }
            }
            Expression::Array(items) => Ok(f.new_array(self.eval_all(items)?)),
            Expression::Tuple(items) => Ok(f.new_tuple(self.eval_all(items)?)),
            Expression::Map(pairs) => {
                let mut entries = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    entries.push((self.eval(k)?, self.eval(v)?));
                }
                f.new_map(entries)
            }
            Expression::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                target.get_item(&index, &f)
            }
            Expression::Attribute(target, name) => {
                let target = self.eval(target)?;
                Object::attr(&target, name, &f)
            }
            Expression::Call(callee, args) => {
                // `obj.method(..)` keeps `obj` alive until the call returns
                let (_receiver, callee) = match callee.as_ref() {
                    Expression::Attribute(target, name) => {
                        let target = self.eval(target)?;
                        let method = Object::attr(&target, name, &f)?;
                        (Some(target), method)
                    }
                    other => (None, self.eval(other)?),
                };
                let args = self.eval_all(args)?;
                Object::call(&callee, args, &f)
            }
            Expression::CmdSubst(cmd) => {
                let result = CmdExecutor::new(&self.stack).exec_get_result(cmd)?;
                Ok(f.new_string(result.output.trim_end_matches('\n')))
            }
        }
    }

    fn eval_all(&self, exprs: &[Expression]) -> RtResult<Vec<ObjectPtr>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if self.owns_root {
            self.stack.release();
        }
    }
}

fn binary(op: BinaryOp, lhs: &ObjectPtr, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    match op {
        BinaryOp::Add => lhs.add(rhs, f),
        BinaryOp::Sub => lhs.sub(rhs, f),
        BinaryOp::Mul => lhs.mult(rhs, f),
        BinaryOp::Div => lhs.div(rhs, f),
        BinaryOp::Mod => lhs.div_mod(rhs, f),
        BinaryOp::Shl => lhs.left_shift(rhs, f),
        BinaryOp::Shr => lhs.right_shift(rhs, f),
        BinaryOp::BitAnd => lhs.bit_and(rhs, f),
        BinaryOp::BitOr => lhs.bit_or(rhs, f),
        BinaryOp::BitXor => lhs.bit_xor(rhs, f),
        BinaryOp::Lt => lhs.lesser(rhs, f),
        BinaryOp::Gt => lhs.greater(rhs, f),
        BinaryOp::Le => lhs.less_equal(rhs, f),
        BinaryOp::Ge => lhs.great_equal(rhs, f),
        BinaryOp::Eq => lhs.equal(rhs, f),
        BinaryOp::Ne => lhs.not_equal(rhs, f),
        BinaryOp::And => lhs.and(rhs, f),
        BinaryOp::Or => lhs.or(rhs, f),
        BinaryOp::In => Object::contained_in(lhs, rhs, f),
    }
}

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::errors::{RtResult, RuntimeError, RuntimeErrorKind};
use crate::objects::ObjectPtr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Global,
    Block,
    Function,
    Class,
    Instance,
}

/// A binding: the object plus its declaration flags.
#[derive(Clone)]
pub struct SymbolAttr {
    value: ObjectPtr,
    global: bool,
    constant: bool,
}

impl SymbolAttr {
    pub fn new(value: ObjectPtr, global: bool) -> Self {
        Self {
            value,
            global,
            constant: false,
        }
    }

    pub fn constant(value: ObjectPtr, global: bool) -> Self {
        Self {
            value,
            global,
            constant: true,
        }
    }

    pub fn value(&self) -> ObjectPtr {
        self.value.clone()
    }

    pub fn value_ref(&self) -> &ObjectPtr {
        &self.value
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn is_const(&self) -> bool {
        self.constant
    }
}

impl fmt::Debug for SymbolAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolAttr")
            .field("value", &self.value)
            .field("global", &self.global)
            .field("constant", &self.constant)
            .finish()
    }
}

pub struct SymbolTable {
    entries: FxHashMap<String, SymbolAttr>,
    kind: TableKind,
}

impl SymbolTable {
    pub fn new(kind: TableKind) -> Self {
        Self {
            entries: FxHashMap::default(),
            kind,
        }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// Returns `true` when the name was not bound in this table before.
    pub fn insert(&mut self, name: &str, attr: SymbolAttr) -> bool {
        self.entries.insert(name.to_string(), attr).is_none()
    }

    pub fn get(&self, name: &str) -> Option<&SymbolAttr> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut SymbolAttr> {
        self.entries.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<SymbolAttr> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// objects reachable from a table may point back at it; print names only
impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .finish()
    }
}

pub type SymbolTablePtr = Rc<RefCell<SymbolTable>>;

/// Ordered scopes, root first. Cloning the stack shares the tables, so a
/// clone plus a pushed frame is a nested scope that disappears with the clone.
#[derive(Clone)]
pub struct SymbolTableStack {
    frames: Vec<SymbolTablePtr>,
}

impl Default for SymbolTableStack {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTableStack {
    pub fn new() -> Self {
        Self {
            frames: vec![Rc::new(RefCell::new(SymbolTable::new(TableKind::Global)))],
        }
    }

    pub fn push(&mut self, kind: TableKind) {
        trace!(depth = self.frames.len(), ?kind, "push scope");
        self.frames
            .push(Rc::new(RefCell::new(SymbolTable::new(kind))));
    }

    pub fn push_scope(&mut self) {
        self.push(TableKind::Block);
    }

    /// Pops the innermost frame. The root frame is never popped.
    pub fn pop_scope(&mut self) -> Option<SymbolTablePtr> {
        if self.frames.len() <= 1 {
            return None;
        }
        trace!(depth = self.frames.len() - 1, "pop scope");
        self.frames.pop()
    }

    pub fn new_class_table(&mut self) {
        self.push(TableKind::Class);
    }

    pub fn new_instance_scope(&mut self) {
        self.push(TableKind::Instance);
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn root(&self) -> SymbolTablePtr {
        self.frames[0].clone()
    }

    pub fn top(&self) -> SymbolTablePtr {
        self.frames[self.frames.len() - 1].clone()
    }

    fn target(&self, is_global: bool) -> &SymbolTablePtr {
        if is_global {
            &self.frames[0]
        } else {
            &self.frames[self.frames.len() - 1]
        }
    }

    pub fn insert(&self, name: &str, value: ObjectPtr, is_global: bool) {
        self.target(is_global)
            .borrow_mut()
            .insert(name, SymbolAttr::new(value, is_global));
    }

    pub fn insert_const(&self, name: &str, value: ObjectPtr, is_global: bool) {
        self.target(is_global)
            .borrow_mut()
            .insert(name, SymbolAttr::constant(value, is_global));
    }

    /// Binds in the innermost frame, or the root for a global attribute.
    /// `false` when the name was already bound there.
    pub fn insert_entry(&self, name: &str, attr: SymbolAttr) -> bool {
        let is_global = attr.is_global();
        self.target(is_global).borrow_mut().insert(name, attr)
    }

    pub fn lookup(&self, name: &str, must_exist: bool) -> RtResult<Option<SymbolAttr>> {
        for frame in self.frames.iter().rev() {
            if let Some(attr) = frame.borrow().get(name) {
                return Ok(Some(attr.clone()));
            }
        }
        if must_exist {
            return Err(RuntimeError::new(RuntimeErrorKind::SymbolNotFound(
                name.to_string(),
            )));
        }
        Ok(None)
    }

    pub fn lookup_local(&self, name: &str) -> Option<SymbolAttr> {
        self.frames[self.frames.len() - 1].borrow().get(name).cloned()
    }

    /// Updates the nearest existing binding, or binds in the innermost frame.
    pub fn assign(&self, name: &str, value: ObjectPtr) -> RtResult<()> {
        for frame in self.frames.iter().rev() {
            let mut table = frame.borrow_mut();
            if let Some(attr) = table.get_mut(name) {
                if attr.constant {
                    return Err(RuntimeError::new(RuntimeErrorKind::ConstReassign(
                        name.to_string(),
                    )));
                }
                attr.value = value;
                return Ok(());
            }
        }
        self.insert(name, value, false);
        Ok(())
    }

    /// Removes the nearest binding of `name`.
    pub fn remove(&self, name: &str) -> Option<SymbolAttr> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.borrow_mut().remove(name))
    }

    /// Empties every frame, dropping the bindings that keep
    /// function and class objects alive through their captured scopes.
    pub fn release(&self) {
        for frame in self.frames.iter().rev() {
            let drained: Vec<SymbolAttr> = {
                let mut table = frame.borrow_mut();
                let names = table.names();
                names.iter().filter_map(|n| table.remove(n)).collect()
            };
            // values drop outside the borrow; their destructors may touch this table
            drop(drained);
        }
    }
}

impl fmt::Debug for SymbolTableStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.frames.iter().map(|t| t.borrow().kind()))
            .finish()
    }
}

use std::rc::{Rc, Weak};

use super::{Object, ObjectFactory, ObjectPtr, ObjectType};
use crate::errors::{RtResult, RuntimeError, RuntimeErrorKind};
use crate::symbol_table::{SymbolTablePtr, SymbolTableStack};

pub enum TypeObject {
    Builtin(ObjectType),
    Class(ClassType),
}

impl TypeObject {
    pub fn name(&self) -> &str {
        match self {
            TypeObject::Builtin(tag) => tag.name(),
            TypeObject::Class(class) => class.name(),
        }
    }

    pub fn same_builtin(&self, other: &TypeObject) -> bool {
        matches!((self, other), (TypeObject::Builtin(a), TypeObject::Builtin(b)) if a == b)
    }

    pub fn as_class(&self) -> Option<&ClassType> {
        match self {
            TypeObject::Class(class) => Some(class),
            TypeObject::Builtin(_) => None,
        }
    }
}

/// A declared class. The innermost frame of `stack` is the class table
/// holding methods and class attributes.
pub struct ClassType {
    name: String,
    stack: SymbolTableStack,
}

impl ClassType {
    pub fn new(name: &str, stack: SymbolTableStack) -> Self {
        Self {
            name: name.to_string(),
            stack,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stack(&self) -> &SymbolTableStack {
        &self.stack
    }

    pub fn table(&self) -> SymbolTablePtr {
        self.stack.top()
    }

    pub fn member(&self, name: &str) -> Option<ObjectPtr> {
        self.stack.lookup_local(name).map(|attr| attr.value())
    }

    pub fn set_member(&self, name: &str, value: ObjectPtr) {
        self.stack.insert(name, value, false);
    }
}

pub struct InstanceObject {
    class: ObjectPtr,
    stack: SymbolTableStack,
    self_ref: Weak<Object>,
}

impl InstanceObject {
    pub(crate) fn new(class: ObjectPtr, stack: SymbolTableStack, self_ref: Weak<Object>) -> Self {
        Self {
            class,
            stack,
            self_ref,
        }
    }

    pub fn class(&self) -> &ObjectPtr {
        &self.class
    }

    pub fn class_type(&self) -> Option<&ClassType> {
        match self.class.as_ref() {
            Object::Type(ty) => ty.as_class(),
            _ => None,
        }
    }

    pub fn class_name(&self) -> &str {
        self.class_type().map_or("object", ClassType::name)
    }

    /// The instance's own scope, layered over the class table.
    pub fn scope(&self) -> &SymbolTableStack {
        &self.stack
    }

    pub fn self_ptr(&self) -> RtResult<ObjectPtr> {
        self.self_ref
            .upgrade()
            .ok_or_else(|| RuntimeError::null_access(format!("released `{}` instance", self.class_name())))
    }

    fn method(&self, name: &str) -> Option<ObjectPtr> {
        self.class_type().and_then(|class| class.member(name))
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.method(name).is_some()
    }

    /// Calls `name` from the class table with the instance prepended.
    /// `Ok(None)` when the class does not define it.
    pub fn call_method(
        &self,
        name: &str,
        args: Vec<ObjectPtr>,
        f: &ObjectFactory<'_>,
    ) -> RtResult<Option<ObjectPtr>> {
        let Some(method) = self.method(name) else {
            return Ok(None);
        };
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(self.self_ptr()?);
        full.extend(args);
        Object::call(&method, full, f).map(Some)
    }

    pub fn dispatch(&self, name: &str, args: Vec<ObjectPtr>, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        self.call_method(name, args, f)?.ok_or_else(|| {
            RuntimeError::incompatible(format!("`{}` does not define `{name}`", self.class_name()))
        })
    }

    pub fn get_attr(&self, name: &str, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        if let Some(attr) = self.stack.lookup_local(name) {
            return Ok(attr.value());
        }
        match self.method(name) {
            Some(member) if matches!(member.as_ref(), Object::Func(_)) => {
                Ok(f.new_method(member, &self.self_ptr()?))
            }
            Some(member) => Ok(member),
            None => Err(RuntimeError::new(RuntimeErrorKind::AttributeNotFound(
                self.class_name().to_string(),
                name.to_string(),
            ))),
        }
    }

    pub fn set_attr(&self, name: &str, value: ObjectPtr) {
        self.stack.insert(name, value, false);
    }
}

pub(crate) fn new_instance_object(class: &ObjectPtr) -> RtResult<ObjectPtr> {
    let Object::Type(TypeObject::Class(class_type)) = class.as_ref() else {
        return Err(RuntimeError::incompatible(format!(
            "`{}` is not a class",
            class.type_name()
        )));
    };
    let mut stack = class_type.stack().clone();
    stack.new_instance_scope();
    let class = class.clone();
    Ok(Rc::new_cyclic(|weak| {
        Object::Instance(InstanceObject::new(class, stack, weak.clone()))
    }))
}

use std::cell::RefCell;
use std::rc::Rc;

use super::class_object::new_instance_object;
use super::{
    Builtin, BuiltinFn, ClassType, FuncObject, MapObject, Object, ObjectPtr, ObjectType, Receiver,
    TypeObject,
};
use crate::Int;
use crate::ast::FuncDecl;
use crate::errors::{RtResult, RuntimeError};
use crate::symbol_table::SymbolTableStack;

/// Builds objects against the active scope stack: functions capture it and
/// `type_of` resolves builtin types from its root.
#[derive(Clone, Copy)]
pub struct ObjectFactory<'a> {
    stack: &'a SymbolTableStack,
}

impl<'a> ObjectFactory<'a> {
    pub fn new(stack: &'a SymbolTableStack) -> Self {
        Self { stack }
    }

    pub fn stack(&self) -> &'a SymbolTableStack {
        self.stack
    }

    pub fn new_null(&self) -> ObjectPtr {
        Rc::new(Object::Null)
    }

    pub fn new_bool(&self, value: bool) -> ObjectPtr {
        Rc::new(Object::Bool(value))
    }

    pub fn new_int(&self, value: Int) -> ObjectPtr {
        Rc::new(Object::Int(value))
    }

    pub fn new_real(&self, value: f64) -> ObjectPtr {
        Rc::new(Object::Real(value))
    }

    pub fn new_string(&self, value: impl Into<String>) -> ObjectPtr {
        Rc::new(Object::String(value.into()))
    }

    pub fn new_array(&self, items: Vec<ObjectPtr>) -> ObjectPtr {
        Rc::new(Object::Array(RefCell::new(items)))
    }

    pub fn new_tuple(&self, items: Vec<ObjectPtr>) -> ObjectPtr {
        Rc::new(Object::Tuple(items))
    }

    pub fn new_map(&self, pairs: Vec<(ObjectPtr, ObjectPtr)>) -> RtResult<ObjectPtr> {
        Ok(Rc::new(Object::Map(MapObject::from_pairs(pairs, self)?)))
    }

    pub fn new_func(&self, decl: Rc<FuncDecl>) -> ObjectPtr {
        Rc::new(Object::Func(FuncObject::Declared {
            decl,
            stack: self.stack.clone(),
        }))
    }

    pub fn new_builtin(&self, name: &str, body: BuiltinFn, help: &str, hint: &str) -> ObjectPtr {
        Rc::new(Object::Func(FuncObject::Builtin(Builtin {
            name: name.to_string(),
            body,
            help: help.to_string(),
            hint: hint.to_string(),
        })))
    }

    pub fn new_bound(&self, func: ObjectPtr, receiver: ObjectPtr) -> ObjectPtr {
        Rc::new(Object::Func(FuncObject::Bound {
            func,
            receiver: Receiver::Value(receiver),
        }))
    }

    /// Bound method of an instance; the instance is not kept alive by it.
    pub fn new_method(&self, func: ObjectPtr, instance: &ObjectPtr) -> ObjectPtr {
        Rc::new(Object::Func(FuncObject::Bound {
            func,
            receiver: Receiver::Instance(Rc::downgrade(instance)),
        }))
    }

    pub fn new_builtin_type(&self, tag: ObjectType) -> ObjectPtr {
        Rc::new(Object::Type(TypeObject::Builtin(tag)))
    }

    pub fn new_class_type(&self, name: &str, class_stack: SymbolTableStack) -> ObjectPtr {
        Rc::new(Object::Type(TypeObject::Class(ClassType::new(
            name,
            class_stack,
        ))))
    }

    /// Bare instance with a fresh scope; `__init__` is the caller's business.
    pub fn new_instance(&self, class: &ObjectPtr) -> RtResult<ObjectPtr> {
        new_instance_object(class)
    }

    pub fn type_of(&self, obj: &ObjectPtr) -> RtResult<ObjectPtr> {
        if let Object::Instance(inst) = obj.as_ref() {
            return Ok(inst.class().clone());
        }
        let tag = obj.tag();
        let root = self.stack.root();
        let registered = root.borrow().get(tag.name()).map(|attr| attr.value());
        match registered {
            Some(ty) if matches!(ty.as_ref(), Object::Type(_)) => Ok(ty),
            _ => Err(RuntimeError::null_access(format!(
                "builtin type `{}` is not registered",
                tag.name()
            ))),
        }
    }
}

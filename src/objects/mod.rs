pub mod basic;
pub mod class_object;
pub mod factory;
pub mod func_object;
pub mod item;
pub mod map_object;
pub mod overop;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::Int;
pub use class_object::{ClassType, InstanceObject, TypeObject};
pub use factory::ObjectFactory;
pub use func_object::{Builtin, BuiltinFn, FuncObject, Receiver};
pub use item::ObjectIter;
pub use map_object::MapObject;

pub type ObjectPtr = Rc<Object>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Nil,
    Int,
    Bool,
    Real,
    String,
    Array,
    Tuple,
    Map,
    Custom,
    Func,
    Type,
}

impl ObjectType {
    /// Types registered as callable type objects in the root scope.
    pub const BUILTIN: [ObjectType; 10] = [
        ObjectType::Nil,
        ObjectType::Int,
        ObjectType::Bool,
        ObjectType::Real,
        ObjectType::String,
        ObjectType::Array,
        ObjectType::Tuple,
        ObjectType::Map,
        ObjectType::Func,
        ObjectType::Type,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ObjectType::Nil => "null",
            ObjectType::Int => "int",
            ObjectType::Bool => "bool",
            ObjectType::Real => "real",
            ObjectType::String => "string",
            ObjectType::Array => "array",
            ObjectType::Tuple => "tuple",
            ObjectType::Map => "map",
            ObjectType::Custom => "object",
            ObjectType::Func => "func",
            ObjectType::Type => "type",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime value. Composites hold shared handles, so a mutation through one
/// alias is seen through all of them.
pub enum Object {
    Null,
    Bool(bool),
    Int(Int),
    Real(f64),
    String(String),
    Array(RefCell<Vec<ObjectPtr>>),
    Tuple(Vec<ObjectPtr>),
    Map(MapObject),
    Func(FuncObject),
    Type(TypeObject),
    Instance(InstanceObject),
}

impl Object {
    pub fn tag(&self) -> ObjectType {
        match self {
            Object::Null => ObjectType::Nil,
            Object::Bool(_) => ObjectType::Bool,
            Object::Int(_) => ObjectType::Int,
            Object::Real(_) => ObjectType::Real,
            Object::String(_) => ObjectType::String,
            Object::Array(_) => ObjectType::Array,
            Object::Tuple(_) => ObjectType::Tuple,
            Object::Map(_) => ObjectType::Map,
            Object::Func(_) => ObjectType::Func,
            Object::Type(_) => ObjectType::Type,
            Object::Instance(_) => ObjectType::Custom,
        }
    }

    /// Tag name, or the class name for instances.
    pub fn type_name(&self) -> String {
        match self {
            Object::Instance(inst) => inst.class_name().to_string(),
            other => other.tag().name().to_string(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Object::Int(_) | Object::Real(_))
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Int(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<Int> {
        match self {
            Object::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.print())
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::String(s) => f.write_str(s),
            other => f.write_str(&other.print()),
        }
    }
}

use std::cell::RefCell;
use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashSet, FxHasher};

use super::{Object, ObjectFactory, ObjectPtr};
use crate::Int;
use crate::errors::{RtResult, RuntimeError};

fn hash_one<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Walk {
    Print,
    Hash,
    Compare,
}

thread_local! {
    static WALKING: RefCell<FxHashSet<(Walk, usize)>> = RefCell::new(FxHashSet::default());
}

/// Marks a container as being walked by `print`, `obj_hash` or `eq_bool`.
/// `None` means the container is already on the walk, i.e. it contains itself.
struct WalkGuard(Walk, usize);

impl WalkGuard {
    fn enter(walk: Walk, container: &Object) -> Option<Self> {
        let addr = container as *const Object as usize;
        WALKING
            .with(|set| set.borrow_mut().insert((walk, addr)))
            .then(|| WalkGuard(walk, addr))
    }
}

impl Drop for WalkGuard {
    fn drop(&mut self) {
        WALKING.with(|set| set.borrow_mut().remove(&(self.0, self.1)));
    }
}

fn recursive(what: &str) -> RuntimeError {
    RuntimeError::incompatible(format!("{what} of a self-containing container"))
}

/// Exact: the real must be integral and name the same int.
fn int_eq_real(i: Int, r: f64) -> bool {
    r.fract() == 0.0 && r >= Int::MIN as f64 && r < Int::MAX as f64 && r as Int == i
}

fn hash_real(r: f64) -> u64 {
    // integral reals hash like the int they equal
    if r.fract() == 0.0 && r >= Int::MIN as f64 && r < Int::MAX as f64 {
        return hash_one(&(r as Int));
    }
    hash_one(&r.to_bits())
}

fn hash_sequence(items: &[ObjectPtr], what: &str, f: &ObjectFactory<'_>) -> RtResult<u64> {
    if items.is_empty() {
        return Err(RuntimeError::out_of_range(format!("hash of empty {what}")));
    }
    items
        .iter()
        .try_fold(0u64, |acc, item| Ok(acc ^ item.obj_hash(f)?))
}

fn sequence_eq(a: &[ObjectPtr], b: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b) {
        if !x.loose_eq(y, f)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn join_repr(items: &[ObjectPtr]) -> String {
    items
        .iter()
        .map(|item| item.print())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Object {
    /// Repr form: strings quoted, containers bracketed. Never calls user code.
    pub fn print(&self) -> String {
        let _guard = match self {
            Object::Array(_) | Object::Tuple(_) | Object::Map(_) => {
                match WalkGuard::enter(Walk::Print, self) {
                    Some(guard) => Some(guard),
                    None if matches!(self, Object::Map(_)) => return "{...}".to_string(),
                    None if matches!(self, Object::Tuple(_)) => return "(...)".to_string(),
                    None => return "[...]".to_string(),
                }
            }
            _ => None,
        };
        match self {
            Object::Null => "null".to_string(),
            Object::Bool(b) => b.to_string(),
            Object::Int(i) => i.to_string(),
            Object::Real(r) => format!("{r:?}"),
            Object::String(s) => format!("{s:?}"),
            Object::Array(items) => format!("[{}]", join_repr(&items.borrow())),
            Object::Tuple(items) if items.len() == 1 => format!("({},)", items[0].print()),
            Object::Tuple(items) => format!("({})", join_repr(items)),
            Object::Map(map) => {
                let body = map
                    .items()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.print(), v.print()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{{{body}}}")
            }
            Object::Func(func) => format!("<func {}>", func.name()),
            Object::Type(ty) => format!("<type {}>", ty.name()),
            Object::Instance(inst) => format!("<{} object>", inst.class_name()),
        }
    }

    /// Display text; instances go through `__str__`.
    pub fn to_display(&self, f: &ObjectFactory<'_>) -> RtResult<String> {
        match self {
            Object::String(s) => Ok(s.clone()),
            Object::Instance(inst) => match inst.call_method("__str__", vec![], f)? {
                Some(result) => match result.as_ref() {
                    Object::String(s) => Ok(s.clone()),
                    other => Err(RuntimeError::incompatible(format!(
                        "__str__ returned `{}`, expected string",
                        other.type_name()
                    ))),
                },
                None => Ok(self.print()),
            },
            other => Ok(other.print()),
        }
    }

    pub fn obj_string(&self, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        Ok(f.new_string(self.to_display(f)?))
    }

    pub fn is_truthy(&self, f: &ObjectFactory<'_>) -> RtResult<bool> {
        Ok(match self {
            Object::Null => false,
            Object::Bool(b) => *b,
            Object::Int(i) => *i != 0,
            Object::Real(r) => *r != 0.0,
            Object::String(s) => !s.is_empty(),
            Object::Array(items) => !items.borrow().is_empty(),
            Object::Tuple(items) => !items.is_empty(),
            Object::Map(map) => !map.is_empty(),
            Object::Func(_) | Object::Type(_) => true,
            Object::Instance(inst) => match inst.call_method("__bool__", vec![], f)? {
                Some(result) => match result.as_ref() {
                    Object::Bool(b) => *b,
                    other => {
                        return Err(RuntimeError::incompatible(format!(
                            "__bool__ returned `{}`, expected bool",
                            other.type_name()
                        )));
                    }
                },
                None => true,
            },
        })
    }

    pub fn obj_bool(&self, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        Ok(f.new_bool(self.is_truthy(f)?))
    }

    pub fn len(&self, f: &ObjectFactory<'_>) -> RtResult<Int> {
        let n = match self {
            Object::String(s) => s.chars().count(),
            Object::Array(items) => items.borrow().len(),
            Object::Tuple(items) => items.len(),
            Object::Map(map) => map.len(),
            Object::Instance(inst) => {
                let result = inst.dispatch("__len__", vec![], f)?;
                return result.as_int().ok_or_else(|| {
                    RuntimeError::incompatible(format!(
                        "__len__ returned `{}`, expected int",
                        result.type_name()
                    ))
                });
            }
            other => {
                return Err(RuntimeError::incompatible(format!(
                    "object of type `{}` has no len()",
                    other.type_name()
                )));
            }
        };
        Int::try_from(n).map_err(|_| RuntimeError::overflow("len() of a huge container"))
    }

    pub fn obj_hash(&self, f: &ObjectFactory<'_>) -> RtResult<u64> {
        let _guard = match self {
            Object::Array(_) | Object::Tuple(_) => {
                Some(WalkGuard::enter(Walk::Hash, self).ok_or_else(|| recursive("hash"))?)
            }
            _ => None,
        };
        match self {
            Object::Null => Err(RuntimeError::null_access("hash of null")),
            Object::Bool(b) => Ok(hash_one(b)),
            Object::Int(i) => Ok(hash_one(i)),
            Object::Real(r) => Ok(hash_real(*r)),
            Object::String(s) => Ok(hash_one(s.as_str())),
            Object::Array(items) => {
                let items = items.borrow().clone();
                hash_sequence(&items, "array", f)
            }
            Object::Tuple(items) => hash_sequence(items, "tuple", f),
            Object::Map(_) => Err(RuntimeError::incompatible("unhashable type: `map`")),
            Object::Func(_) | Object::Type(_) => Ok(hash_one(&(self as *const Object as usize))),
            Object::Instance(inst) => {
                let result = inst.dispatch("__hash__", vec![], f)?;
                match result.as_ref() {
                    Object::Int(i) => Ok(hash_one(i)),
                    other => Err(RuntimeError::incompatible(format!(
                        "__hash__ returned `{}`, expected int",
                        other.type_name()
                    ))),
                }
            }
        }
    }

    /// Domain equality. Strings, arrays and tuples refuse to compare with
    /// other tags; every other variant is simply unequal to a different tag.
    pub fn eq_bool(&self, other: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<bool> {
        let rhs = other.as_ref();
        let _guard = match (self, rhs) {
            (Object::Array(_) | Object::Tuple(_) | Object::Map(_), _) if std::ptr::eq(self, rhs) => {
                return Ok(true);
            }
            (Object::Array(_), Object::Array(_))
            | (Object::Tuple(_), Object::Tuple(_))
            | (Object::Map(_), Object::Map(_)) => {
                Some(WalkGuard::enter(Walk::Compare, self).ok_or_else(|| recursive("comparison"))?)
            }
            _ => None,
        };
        Ok(match (self, rhs) {
            (Object::Instance(inst), _) => match inst.call_method("__eq__", vec![other.clone()], f)? {
                Some(result) => result.is_truthy(f)?,
                None => std::ptr::eq(self, rhs),
            },
            (Object::Null, Object::Null) => true,
            (Object::Bool(a), Object::Bool(b)) => a == b,
            (Object::Int(a), Object::Int(b)) => a == b,
            (Object::Int(a), Object::Real(b)) => int_eq_real(*a, *b),
            (Object::Real(a), Object::Int(b)) => int_eq_real(*b, *a),
            (Object::Real(a), Object::Real(b)) => a == b,
            (Object::String(a), Object::String(b)) => a == b,
            (Object::Array(a), Object::Array(b)) => {
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                sequence_eq(&a, &b, f)?
            }
            (Object::Tuple(a), Object::Tuple(b)) => sequence_eq(a, b, f)?,
            (Object::Map(a), Object::Map(b)) => a.equal(b, f)?,
            (Object::Func(_), Object::Func(_)) => std::ptr::eq(self, rhs),
            (Object::Type(a), Object::Type(b)) => std::ptr::eq(self, rhs) || a.same_builtin(b),
            (Object::String(_) | Object::Array(_) | Object::Tuple(_), _) => {
                return Err(RuntimeError::incompatible(format!(
                    "cannot compare `{}` with `{}`",
                    self.type_name(),
                    rhs.type_name()
                )));
            }
            _ => false,
        })
    }

    pub fn ne_bool(&self, other: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<bool> {
        if let Object::Instance(inst) = self {
            if let Some(result) = inst.call_method("__ne__", vec![other.clone()], f)? {
                return result.is_truthy(f);
            }
        }
        Ok(!self.eq_bool(other, f)?)
    }

    pub fn equal(&self, other: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        Ok(f.new_bool(self.eq_bool(other, f)?))
    }

    pub fn not_equal(&self, other: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        Ok(f.new_bool(self.ne_bool(other, f)?))
    }

    /// Equality used inside containers: numbers compare across int and
    /// real, any other tag mismatch is plain inequality.
    pub fn loose_eq(&self, other: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<bool> {
        if self.is_numeric() && other.is_numeric() {
            return self.eq_bool(other, f);
        }
        if self.tag() != other.tag() {
            return Ok(false);
        }
        self.eq_bool(other, f)
    }

    /// Shallow copy: containers are duplicated, their elements shared.
    pub fn copy(this: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        Ok(match this.as_ref() {
            Object::Null => f.new_null(),
            Object::Bool(b) => f.new_bool(*b),
            Object::Int(i) => f.new_int(*i),
            Object::Real(r) => f.new_real(*r),
            Object::String(s) => f.new_string(s.clone()),
            Object::Array(items) => f.new_array(items.borrow().clone()),
            Object::Tuple(items) => f.new_tuple(items.clone()),
            Object::Map(map) => f.new_map(map.items())?,
            Object::Func(_) | Object::Type(_) | Object::Instance(_) => this.clone(),
        })
    }
}

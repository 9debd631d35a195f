use super::func_object::check_exact_args_len;
use super::{BuiltinFn, Object, ObjectFactory, ObjectPtr, ObjectType, TypeObject};
use crate::Int;
use crate::errors::{RtResult, RuntimeError, RuntimeErrorKind};

fn normalize_index(index: Int, len: usize) -> RtResult<usize> {
    let len_i = Int::try_from(len).unwrap_or(Int::MAX);
    let at = if index < 0 { index + len_i } else { index };
    if at < 0 || at >= len_i {
        return Err(RuntimeError::out_of_range(format!(
            "index {index} out of range for length {len}"
        )));
    }
    Ok(at as usize)
}

fn not_subscriptable(obj: &Object) -> RuntimeError {
    RuntimeError::incompatible(format!("`{}` is not subscriptable", obj.type_name()))
}

fn bad_index(obj: &Object, index: &Object) -> RuntimeError {
    RuntimeError::incompatible(format!(
        "`{}` indices must be int, not `{}`",
        obj.type_name(),
        index.type_name()
    ))
}

impl Object {
    pub fn get_item(&self, index: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match (self, index.as_ref()) {
            (Object::Array(items), Object::Int(i)) => {
                let items = items.borrow();
                Ok(items[normalize_index(*i, items.len())?].clone())
            }
            (Object::Tuple(items), Object::Int(i)) => Ok(items[normalize_index(*i, items.len())?].clone()),
            (Object::String(s), Object::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                let at = normalize_index(*i, chars.len())?;
                Ok(f.new_string(chars[at].to_string()))
            }
            (Object::Map(map), _) => map.get(index, f),
            (Object::Instance(inst), _) => inst.dispatch("__getitem__", vec![index.clone()], f),
            (Object::Array(_) | Object::Tuple(_) | Object::String(_), other) => Err(bad_index(self, other)),
            (other, _) => Err(not_subscriptable(other)),
        }
    }

    pub fn set_item(&self, index: &ObjectPtr, value: ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<()> {
        match (self, index.as_ref()) {
            (Object::Array(items), Object::Int(i)) => {
                let mut items = items.borrow_mut();
                let at = normalize_index(*i, items.len())?;
                items[at] = value;
                Ok(())
            }
            (Object::Array(_), other) => Err(bad_index(self, other)),
            (Object::Map(map), _) => map.set(index.clone(), value, f),
            (Object::Instance(inst), _) => inst
                .dispatch("__setitem__", vec![index.clone(), value], f)
                .map(|_| ()),
            (other, _) => Err(RuntimeError::incompatible(format!(
                "`{}` does not support item assignment",
                other.type_name()
            ))),
        }
    }

    pub fn del_item(&self, index: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<()> {
        match (self, index.as_ref()) {
            (Object::Array(items), Object::Int(i)) => {
                let mut items = items.borrow_mut();
                let at = normalize_index(*i, items.len())?;
                items.remove(at);
                Ok(())
            }
            (Object::Array(_), other) => Err(bad_index(self, other)),
            (Object::Map(map), _) => map.remove(index, f).map(|_| ()),
            (Object::Instance(inst), _) => inst
                .dispatch("__delitem__", vec![index.clone()], f)
                .map(|_| ()),
            (other, _) => Err(RuntimeError::incompatible(format!(
                "`{}` does not support item deletion",
                other.type_name()
            ))),
        }
    }

    /// Snapshot of the elements; later mutation of the source is not seen.
    /// A user iterator is drained to the end.
    pub fn iter(&self, f: &ObjectFactory<'_>) -> RtResult<Vec<ObjectPtr>> {
        match self {
            Object::Array(items) => Ok(items.borrow().clone()),
            Object::Tuple(items) => Ok(items.clone()),
            Object::String(s) => Ok(s.chars().map(|c| f.new_string(c.to_string())).collect()),
            Object::Map(map) => Ok(map.keys()),
            Object::Instance(_) => {
                let mut iter = self.iterate(f)?;
                let mut items = Vec::new();
                while let Some(item) = iter.next_item(f)? {
                    items.push(item);
                }
                Ok(items)
            }
            other => Err(RuntimeError::incompatible(format!(
                "`{}` is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Iteration as a `for` loop sees it. Builtins yield a snapshot; an
    /// instance defining `__has_next__`/`__next__` is stepped lazily, and
    /// `__iter__` may hand back either kind.
    pub fn iterate(&self, f: &ObjectFactory<'_>) -> RtResult<ObjectIter> {
        let Object::Instance(inst) = self else {
            return Ok(ObjectIter::Snapshot(self.iter(f)?.into_iter()));
        };
        if inst.has_method("__has_next__") {
            return Ok(ObjectIter::Protocol(inst.self_ptr()?));
        }
        let inner = inst.dispatch("__iter__", vec![], f)?;
        match inner.as_ref() {
            Object::Instance(it) if it.has_method("__has_next__") => Ok(ObjectIter::Protocol(inner)),
            Object::Instance(it) => Err(RuntimeError::incompatible(format!(
                "`{}` returned by __iter__ does not define `__has_next__`",
                it.class_name()
            ))),
            _ => Ok(ObjectIter::Snapshot(inner.iter(f)?.into_iter())),
        }
    }

    pub fn attr(this: &ObjectPtr, name: &str, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match this.as_ref() {
            Object::Instance(inst) => inst.get_attr(name, f),
            Object::Type(TypeObject::Class(class)) => class.member(name).ok_or_else(|| {
                RuntimeError::new(RuntimeErrorKind::AttributeNotFound(
                    class.name().to_string(),
                    name.to_string(),
                ))
            }),
            other => match builtin_method(other.tag(), name) {
                Some((body, help)) => {
                    let method = f.new_builtin(name, body, help, "");
                    Ok(f.new_bound(method, this.clone()))
                }
                None => Err(RuntimeError::new(RuntimeErrorKind::AttributeNotFound(
                    other.type_name(),
                    name.to_string(),
                ))),
            },
        }
    }

    pub fn attr_assign(this: &ObjectPtr, name: &str, value: ObjectPtr) -> RtResult<()> {
        match this.as_ref() {
            Object::Instance(inst) => {
                inst.set_attr(name, value);
                Ok(())
            }
            Object::Type(TypeObject::Class(class)) => {
                class.set_member(name, value);
                Ok(())
            }
            other => Err(RuntimeError::incompatible(format!(
                "cannot set attribute `{name}` on `{}`",
                other.type_name()
            ))),
        }
    }

    pub fn call(this: &ObjectPtr, args: Vec<ObjectPtr>, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match this.as_ref() {
            Object::Func(func) => func.call(args, f),
            Object::Type(TypeObject::Class(_)) => construct(this, args, f),
            Object::Type(TypeObject::Builtin(tag)) => convert(*tag, args, f),
            Object::Instance(inst) => inst.dispatch("__call__", args, f),
            other => Err(RuntimeError::new(RuntimeErrorKind::NotCallable(
                other.type_name(),
            ))),
        }
    }
}

fn construct(class: &ObjectPtr, args: Vec<ObjectPtr>, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    let instance = f.new_instance(class)?;
    if let Object::Instance(inst) = instance.as_ref() {
        let received = args.len();
        if inst.call_method("__init__", args, f)?.is_none() && received > 0 {
            return Err(RuntimeError::new(RuntimeErrorKind::ArgumentMismatch {
                name: inst.class_name().to_string(),
                expected: 0,
                received,
            }));
        }
    }
    Ok(instance)
}

fn convert(tag: ObjectType, args: Vec<ObjectPtr>, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    match tag {
        ObjectType::Nil => {
            check_exact_args_len(tag.name(), &args, 0)?;
            return Ok(f.new_null());
        }
        ObjectType::Map if args.is_empty() => return f.new_map(vec![]),
        _ => check_exact_args_len(tag.name(), &args, 1)?,
    }
    let value = &args[0];
    let failed = || {
        RuntimeError::incompatible(format!(
            "cannot convert `{}` to {}",
            value.print(),
            tag.name()
        ))
    };
    match (tag, value.as_ref()) {
        (ObjectType::Int, Object::Int(i)) => Ok(f.new_int(*i)),
        (ObjectType::Int, Object::Real(r)) => {
            let truncated = r.trunc();
            if truncated.is_finite() && truncated >= Int::MIN as f64 && truncated < Int::MAX as f64 {
                Ok(f.new_int(truncated as Int))
            } else {
                Err(RuntimeError::overflow(format!("int({r})")))
            }
        }
        (ObjectType::Int, Object::Bool(b)) => Ok(f.new_int(Int::from(*b))),
        (ObjectType::Int, Object::String(s)) => {
            s.trim().parse::<Int>().map(|i| f.new_int(i)).map_err(|_| failed())
        }
        (ObjectType::Real, Object::Int(i)) => Ok(f.new_real(*i as f64)),
        (ObjectType::Real, Object::Real(r)) => Ok(f.new_real(*r)),
        (ObjectType::Real, Object::Bool(b)) => Ok(f.new_real(if *b { 1.0 } else { 0.0 })),
        (ObjectType::Real, Object::String(s)) => {
            s.trim().parse::<f64>().map(|r| f.new_real(r)).map_err(|_| failed())
        }
        (ObjectType::Bool, other) => Ok(f.new_bool(other.is_truthy(f)?)),
        (ObjectType::String, other) => other.obj_string(f),
        (ObjectType::Array, other) => Ok(f.new_array(other.iter(f)?)),
        (ObjectType::Tuple, other) => Ok(f.new_tuple(other.iter(f)?)),
        (ObjectType::Map, Object::Map(map)) => f.new_map(map.items()),
        _ => Err(failed()),
    }
}

// ============== methods on builtin values ==============

fn builtin_method(tag: ObjectType, name: &str) -> Option<(BuiltinFn, &'static str)> {
    let found: (BuiltinFn, &'static str) = match (tag, name) {
        (ObjectType::Array, "append") => (array_append, "append an item in place"),
        (ObjectType::Array, "pop") => (array_pop, "remove and return the last item"),
        (ObjectType::Map, "keys") => (map_keys, "array of keys"),
        (ObjectType::Map, "values") => (map_values, "array of values"),
        (ObjectType::Map, "contains") => (map_contains, "whether the key is present"),
        (ObjectType::String, "split") => (string_split, "split by separator or whitespace"),
        (ObjectType::String, "upper") => (string_upper, "uppercase copy"),
        (ObjectType::String, "lower") => (string_lower, "lowercase copy"),
        (
            ObjectType::Array | ObjectType::Map | ObjectType::String | ObjectType::Tuple,
            "len",
        ) => (method_len, "number of items"),
        _ => return None,
    };
    Some(found)
}

fn split_receiver<'a>(name: &str, args: &'a [ObjectPtr]) -> RtResult<(&'a ObjectPtr, &'a [ObjectPtr])> {
    args.split_first().ok_or_else(|| {
        RuntimeError::new(RuntimeErrorKind::ArgumentMismatch {
            name: name.to_string(),
            expected: 1,
            received: 0,
        })
    })
}

fn method_len(args: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    let (recv, rest) = split_receiver("len", args)?;
    check_exact_args_len("len", rest, 0)?;
    Ok(f.new_int(recv.len(f)?))
}

fn array_append(args: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    let (recv, rest) = split_receiver("append", args)?;
    check_exact_args_len("append", rest, 1)?;
    if let Object::Array(items) = recv.as_ref() {
        items.borrow_mut().push(rest[0].clone());
    }
    Ok(f.new_null())
}

fn array_pop(args: &[ObjectPtr], _f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    let (recv, rest) = split_receiver("pop", args)?;
    check_exact_args_len("pop", rest, 0)?;
    match recv.as_ref() {
        Object::Array(items) => items
            .borrow_mut()
            .pop()
            .ok_or_else(|| RuntimeError::out_of_range("pop from empty array")),
        other => Err(RuntimeError::incompatible(format!(
            "pop on `{}`",
            other.type_name()
        ))),
    }
}

fn map_keys(args: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    let (recv, rest) = split_receiver("keys", args)?;
    check_exact_args_len("keys", rest, 0)?;
    match recv.as_ref() {
        Object::Map(map) => Ok(f.new_array(map.keys())),
        _ => Ok(f.new_array(vec![])),
    }
}

fn map_values(args: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    let (recv, rest) = split_receiver("values", args)?;
    check_exact_args_len("values", rest, 0)?;
    match recv.as_ref() {
        Object::Map(map) => Ok(f.new_array(map.values())),
        _ => Ok(f.new_array(vec![])),
    }
}

fn map_contains(args: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    let (recv, rest) = split_receiver("contains", args)?;
    check_exact_args_len("contains", rest, 1)?;
    match recv.as_ref() {
        Object::Map(map) => Ok(f.new_bool(map.contains(&rest[0], f)?)),
        _ => Ok(f.new_bool(false)),
    }
}

fn string_split(args: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    let (recv, rest) = split_receiver("split", args)?;
    let s = recv.as_str().unwrap_or_default();
    let parts: Vec<ObjectPtr> = match rest {
        [] => s.split_whitespace().map(|p| f.new_string(p)).collect(),
        [sep] => match sep.as_ref() {
            Object::String(sep) if !sep.is_empty() => {
                s.split(sep.as_str()).map(|p| f.new_string(p)).collect()
            }
            other => {
                return Err(RuntimeError::incompatible(format!(
                    "split separator must be a non-empty string, not `{}`",
                    other.print()
                )));
            }
        },
        more => {
            return Err(RuntimeError::new(RuntimeErrorKind::ArgumentMismatch {
                name: "split".into(),
                expected: 1,
                received: more.len(),
            }));
        }
    };
    Ok(f.new_array(parts))
}

fn string_upper(args: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    let (recv, rest) = split_receiver("upper", args)?;
    check_exact_args_len("upper", rest, 0)?;
    Ok(f.new_string(recv.as_str().unwrap_or_default().to_uppercase()))
}

fn string_lower(args: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    let (recv, rest) = split_receiver("lower", args)?;
    check_exact_args_len("lower", rest, 0)?;
    Ok(f.new_string(recv.as_str().unwrap_or_default().to_lowercase()))
}

pub enum ObjectIter {
    Snapshot(std::vec::IntoIter<ObjectPtr>),
    /// Steps a user iterator: `__next__` while `__has_next__` is truthy.
    Protocol(ObjectPtr),
}

impl ObjectIter {
    pub fn next_item(&mut self, f: &ObjectFactory<'_>) -> RtResult<Option<ObjectPtr>> {
        match self {
            ObjectIter::Snapshot(items) => Ok(items.next()),
            ObjectIter::Protocol(iterator) => {
                let Object::Instance(inst) = iterator.as_ref() else {
                    return Ok(None);
                };
                if !inst.dispatch("__has_next__", vec![], f)?.is_truthy(f)? {
                    return Ok(None);
                }
                inst.dispatch("__next__", vec![], f).map(Some)
            }
        }
    }
}

use std::cmp::Ordering;

use super::{Object, ObjectFactory, ObjectPtr};
use crate::Int;
use crate::errors::{RtResult, RuntimeError, RuntimeErrorKind};

#[derive(Debug, Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Rem,
}

impl Arith {
    fn symbol(self) -> &'static str {
        match self {
            Arith::Add => "+",
            Arith::Sub => "-",
            Arith::Mul => "*",
            Arith::Rem => "%",
        }
    }

    fn dunder(self) -> &'static str {
        match self {
            Arith::Add => "__add__",
            Arith::Sub => "__sub__",
            Arith::Mul => "__mul__",
            Arith::Rem => "__mod__",
        }
    }
}

fn zero_division() -> RuntimeError {
    RuntimeError::new(RuntimeErrorKind::ZeroDivision)
}

fn repeat_count(n: Int) -> RtResult<usize> {
    usize::try_from(n).map_err(|_| RuntimeError::out_of_range(format!("repeat count {n}")))
}

fn repeat_len(unit: usize, count: usize) -> RtResult<usize> {
    unit.checked_mul(count)
        .ok_or_else(|| RuntimeError::overflow(format!("repeating {unit} items {count} times")))
}

fn shift_amount(n: Int) -> RtResult<u32> {
    match u32::try_from(n) {
        Ok(bits) if bits < Int::BITS => Ok(bits),
        _ => Err(RuntimeError::out_of_range(format!("shift count {n}"))),
    }
}

impl Object {
    fn unsupported(&self, op: &str, rhs: &Object) -> RuntimeError {
        RuntimeError::incompatible(format!(
            "unsupported operand types for {op}: `{}` and `{}`",
            self.type_name(),
            rhs.type_name()
        ))
    }

    fn arith(&self, op: Arith, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match (self, rhs.as_ref()) {
            (Object::Instance(inst), _) => inst.dispatch(op.dunder(), vec![rhs.clone()], f),
            (Object::Int(a), Object::Int(b)) => {
                let result = match op {
                    Arith::Add => a.checked_add(*b),
                    Arith::Sub => a.checked_sub(*b),
                    Arith::Mul => a.checked_mul(*b),
                    Arith::Rem => {
                        if *b == 0 {
                            return Err(zero_division());
                        }
                        a.checked_rem(*b)
                    }
                };
                result
                    .map(|v| f.new_int(v))
                    .ok_or_else(|| RuntimeError::overflow(format!("{a} {} {b}", op.symbol())))
            }
            (lhs, other) => match (lhs.as_real(), other.as_real()) {
                (Some(a), Some(b)) => {
                    let v = match op {
                        Arith::Add => a + b,
                        Arith::Sub => a - b,
                        Arith::Mul => a * b,
                        Arith::Rem => {
                            if b == 0.0 {
                                return Err(zero_division());
                            }
                            a % b
                        }
                    };
                    Ok(f.new_real(v))
                }
                _ => Err(lhs.unsupported(op.symbol(), other)),
            },
        }
    }

    pub fn add(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match (self, rhs.as_ref()) {
            (Object::String(a), Object::String(b)) => Ok(f.new_string(format!("{a}{b}"))),
            (Object::Array(a), Object::Array(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                Ok(f.new_array(items))
            }
            (Object::Tuple(a), Object::Tuple(b)) => {
                Ok(f.new_tuple(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => self.arith(Arith::Add, rhs, f),
        }
    }

    pub fn sub(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        self.arith(Arith::Sub, rhs, f)
    }

    pub fn mult(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match (self, rhs.as_ref()) {
            (Object::String(s), Object::Int(n)) => {
                let count = repeat_count(*n)?;
                if s.is_empty() || count == 0 {
                    return Ok(f.new_string(String::new()));
                }
                let mut out = String::new();
                out.try_reserve_exact(repeat_len(s.len(), count)?)
                    .map_err(|e| RuntimeError::out_of_range(format!("string * {n}: {e}")))?;
                for _ in 0..count {
                    out.push_str(s);
                }
                Ok(f.new_string(out))
            }
            (Object::Array(items), Object::Int(n)) => {
                let count = repeat_count(*n)?;
                let items = items.borrow();
                if items.is_empty() || count == 0 {
                    return Ok(f.new_array(Vec::new()));
                }
                let mut out = Vec::new();
                out.try_reserve_exact(repeat_len(items.len(), count)?)
                    .map_err(|e| RuntimeError::out_of_range(format!("array * {n}: {e}")))?;
                for _ in 0..count {
                    out.extend(items.iter().cloned());
                }
                Ok(f.new_array(out))
            }
            _ => self.arith(Arith::Mul, rhs, f),
        }
    }

    /// int / int stays int only when the division is exact.
    pub fn div(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match (self, rhs.as_ref()) {
            (Object::Instance(inst), _) => inst.dispatch("__div__", vec![rhs.clone()], f),
            (Object::Int(a), Object::Int(b)) => {
                if *b == 0 {
                    return Err(zero_division());
                }
                match a.checked_rem(*b) {
                    Some(0) => a
                        .checked_div(*b)
                        .map(|v| f.new_int(v))
                        .ok_or_else(|| RuntimeError::overflow(format!("{a} / {b}"))),
                    Some(_) => Ok(f.new_real(*a as f64 / *b as f64)),
                    None => Err(RuntimeError::overflow(format!("{a} / {b}"))),
                }
            }
            (lhs, other) => match (lhs.as_real(), other.as_real()) {
                (Some(_), Some(b)) if b == 0.0 => Err(zero_division()),
                (Some(a), Some(b)) => Ok(f.new_real(a / b)),
                _ => Err(lhs.unsupported("/", other)),
            },
        }
    }

    pub fn div_mod(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        self.arith(Arith::Rem, rhs, f)
    }

    pub fn left_shift(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match (self, rhs.as_ref()) {
            (Object::Instance(inst), _) => inst.dispatch("__lshift__", vec![rhs.clone()], f),
            (Object::Int(a), Object::Int(b)) => {
                let bits = shift_amount(*b)?;
                a.checked_shl(bits)
                    .map(|v| f.new_int(v))
                    .ok_or_else(|| RuntimeError::overflow(format!("{a} << {b}")))
            }
            (lhs, other) => Err(lhs.unsupported("<<", other)),
        }
    }

    pub fn right_shift(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match (self, rhs.as_ref()) {
            (Object::Instance(inst), _) => inst.dispatch("__rshift__", vec![rhs.clone()], f),
            (Object::Int(a), Object::Int(b)) => {
                let bits = shift_amount(*b)?;
                a.checked_shr(bits)
                    .map(|v| f.new_int(v))
                    .ok_or_else(|| RuntimeError::overflow(format!("{a} >> {b}")))
            }
            (lhs, other) => Err(lhs.unsupported(">>", other)),
        }
    }

    pub fn bit_and(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match (self, rhs.as_ref()) {
            (Object::Instance(inst), _) => inst.dispatch("__band__", vec![rhs.clone()], f),
            (Object::Int(a), Object::Int(b)) => Ok(f.new_int(a & b)),
            (Object::Bool(a), Object::Bool(b)) => Ok(f.new_bool(a & b)),
            (lhs, other) => Err(lhs.unsupported("&", other)),
        }
    }

    pub fn bit_or(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match (self, rhs.as_ref()) {
            (Object::Instance(inst), _) => inst.dispatch("__bor__", vec![rhs.clone()], f),
            (Object::Int(a), Object::Int(b)) => Ok(f.new_int(a | b)),
            (Object::Bool(a), Object::Bool(b)) => Ok(f.new_bool(a | b)),
            (lhs, other) => Err(lhs.unsupported("|", other)),
        }
    }

    pub fn bit_xor(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match (self, rhs.as_ref()) {
            (Object::Instance(inst), _) => inst.dispatch("__bxor__", vec![rhs.clone()], f),
            (Object::Int(a), Object::Int(b)) => Ok(f.new_int(a ^ b)),
            (Object::Bool(a), Object::Bool(b)) => Ok(f.new_bool(a ^ b)),
            (lhs, other) => Err(lhs.unsupported("^", other)),
        }
    }

    /// `None` means unordered (a NaN operand).
    fn ordering(&self, rhs: &Object, symbol: &str) -> RtResult<Option<Ordering>> {
        match (self, rhs) {
            (Object::Int(a), Object::Int(b)) => Ok(Some(a.cmp(b))),
            (Object::String(a), Object::String(b)) => Ok(Some(a.cmp(b))),
            _ => match (self.as_real(), rhs.as_real()) {
                (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
                _ => Err(self.unsupported(symbol, rhs)),
            },
        }
    }

    fn compare(
        &self,
        rhs: &ObjectPtr,
        f: &ObjectFactory<'_>,
        (symbol, dunder): (&str, &str),
        accept: fn(Ordering) -> bool,
    ) -> RtResult<ObjectPtr> {
        if let Object::Instance(inst) = self {
            return inst.dispatch(dunder, vec![rhs.clone()], f);
        }
        let ord = self.ordering(rhs, symbol)?;
        Ok(f.new_bool(ord.is_some_and(accept)))
    }

    pub fn lesser(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        self.compare(rhs, f, ("<", "__lt__"), Ordering::is_lt)
    }

    pub fn greater(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        self.compare(rhs, f, (">", "__gt__"), Ordering::is_gt)
    }

    pub fn less_equal(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        self.compare(rhs, f, ("<=", "__le__"), Ordering::is_le)
    }

    pub fn great_equal(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        self.compare(rhs, f, (">=", "__ge__"), Ordering::is_ge)
    }

    /// Short-circuits on the receiver; the evaluator skips evaluating the
    /// right operand in that case.
    pub fn and(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        if !self.is_truthy(f)? {
            return Ok(f.new_bool(false));
        }
        rhs.obj_bool(f)
    }

    pub fn or(&self, rhs: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        if self.is_truthy(f)? {
            return Ok(f.new_bool(true));
        }
        rhs.obj_bool(f)
    }

    /// `item in container`
    pub fn contained_in(
        item: &ObjectPtr,
        container: &ObjectPtr,
        f: &ObjectFactory<'_>,
    ) -> RtResult<ObjectPtr> {
        let found = match (container.as_ref(), item.as_ref()) {
            (Object::String(hay), Object::String(needle)) => hay.contains(needle.as_str()),
            (Object::Array(items), _) => {
                let items = items.borrow().clone();
                contains_item(&items, item, f)?
            }
            (Object::Tuple(items), _) => contains_item(items, item, f)?,
            (Object::Map(map), _) => map.contains(item, f)?,
            (Object::Instance(inst), _) => {
                return inst.dispatch("__contains__", vec![item.clone()], f);
            }
            (other, _) => return Err(item.unsupported("in", other)),
        };
        Ok(f.new_bool(found))
    }

    pub fn unary_add(&self, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match self {
            Object::Int(i) => Ok(f.new_int(*i)),
            Object::Real(r) => Ok(f.new_real(*r)),
            Object::Instance(inst) => inst.dispatch("__pos__", vec![], f),
            other => Err(RuntimeError::incompatible(format!(
                "bad operand type for unary +: `{}`",
                other.type_name()
            ))),
        }
    }

    pub fn unary_sub(&self, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match self {
            Object::Int(i) => i
                .checked_neg()
                .map(|v| f.new_int(v))
                .ok_or_else(|| RuntimeError::overflow(format!("-({i})"))),
            Object::Real(r) => Ok(f.new_real(-r)),
            Object::Instance(inst) => inst.dispatch("__neg__", vec![], f),
            other => Err(RuntimeError::incompatible(format!(
                "bad operand type for unary -: `{}`",
                other.type_name()
            ))),
        }
    }

    pub fn bit_not(&self, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        match self {
            Object::Int(i) => Ok(f.new_int(!i)),
            Object::Instance(inst) => inst.dispatch("__invert__", vec![], f),
            other => Err(RuntimeError::incompatible(format!(
                "bad operand type for unary ~: `{}`",
                other.type_name()
            ))),
        }
    }

    pub fn logical_not(&self, f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
        if let Object::Instance(inst) = self {
            if let Some(result) = inst.call_method("__not__", vec![], f)? {
                return Ok(result);
            }
        }
        Ok(f.new_bool(!self.is_truthy(f)?))
    }
}

fn contains_item(items: &[ObjectPtr], needle: &ObjectPtr, f: &ObjectFactory<'_>) -> RtResult<bool> {
    for item in items {
        if needle.loose_eq(item, f)? {
            return Ok(true);
        }
    }
    Ok(false)
}

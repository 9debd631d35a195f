use std::collections::HashMap;

use common_macros::hash_map;

use crate::Int;
use crate::childman;
use crate::errors::RtResult;
use crate::objects::func_object::check_exact_args_len;
use crate::objects::{BuiltinFn, Object, ObjectFactory, ObjectPtr, ObjectType};
use crate::symbol_table::SymbolTableStack;

/// Builtin functions bound in the root scope: name => (body, help, hint).
pub fn get_builtin_map() -> HashMap<&'static str, (BuiltinFn, &'static str, &'static str)> {
    hash_map! {
        "print" => (print as BuiltinFn, "print the display form of each argument", "<args>..."),
        "len" => (len as BuiltinFn, "number of items in a string or container", "<obj>"),
        "type" => (type_of as BuiltinFn, "type object of a value", "<obj>"),
        "hash" => (hash as BuiltinFn, "domain hash of a value", "<obj>"),
        "str" => (to_str as BuiltinFn, "display string of a value", "<obj>"),
        "copy" => (copy as BuiltinFn, "shallow copy of a value", "<obj>"),
        "reap" => (reap as BuiltinFn, "collect finished background commands as (pid, status) tuples", ""),
    }
}

pub(super) fn register(stack: &SymbolTableStack) {
    let f = ObjectFactory::new(stack);
    for (name, (body, help, hint)) in get_builtin_map() {
        stack.insert(name, f.new_builtin(name, body, help, hint), true);
    }
    for tag in ObjectType::BUILTIN {
        stack.insert(tag.name(), f.new_builtin_type(tag), true);
    }
}

fn print(args: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    let parts = args
        .iter()
        .map(|arg| arg.to_display(f))
        .collect::<RtResult<Vec<_>>>()?;
    println!("{}", parts.join(" "));
    Ok(f.new_null())
}

fn len(args: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    check_exact_args_len("len", args, 1)?;
    Ok(f.new_int(args[0].len(f)?))
}

fn type_of(args: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    check_exact_args_len("type", args, 1)?;
    f.type_of(&args[0])
}

fn hash(args: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    check_exact_args_len("hash", args, 1)?;
    Ok(f.new_int(args[0].obj_hash(f)? as Int))
}

fn to_str(args: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    check_exact_args_len("str", args, 1)?;
    args[0].obj_string(f)
}

fn copy(args: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    check_exact_args_len("copy", args, 1)?;
    Object::copy(&args[0], f)
}

fn reap(args: &[ObjectPtr], f: &ObjectFactory<'_>) -> RtResult<ObjectPtr> {
    check_exact_args_len("reap", args, 0)?;
    let finished = childman::reap_background()?
        .into_iter()
        .map(|(pid, status)| f.new_tuple(vec![f.new_int(Int::from(pid)), f.new_int(Int::from(status))]))
        .collect();
    Ok(f.new_array(finished))
}

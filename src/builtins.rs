// File: src/builtins.rs
//
// Built-in methods for the Carblang runtime. Every method is listed once in
// a table of { tag, name, receiver kind, arity } records; the VM resolves
// `(receiver variant, name)` pairs against the table at property access time
// and dispatches invocations through it. Free functions such as `input` and
// `random` use the same machinery with a null receiver and are installed
// into the globals table before execution starts.

use std::io::{BufRead, Write};

use rand::Rng;

use crate::value::Value;

/// Tag identifying one built-in. Discriminants index straight into the
/// method table, so the enum and `METHODS` must stay in the same order
/// (checked by a test).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeMethod {
    // Universal
    Type = 0,
    ToString,

    // bool
    BoolToInt,

    // number
    Pow,
    Sqrt,
    Fact,
    ToInt,
    Floor,
    Ceil,

    // string
    StrLength,
    StrIsEmpty,
    Upper,
    Lower,
    Capitalize,
    SwapCase,
    Find,
    FindLast,
    StrFirst,
    StrLast,
    StartsWith,
    EndsWith,
    IsNumber,
    IsSpace,
    IsAllSpaces,
    StrTrim,
    ToArray,
    Replace,
    StrCount,
    StrSlice,
    ToNumber,

    // array
    Length,
    IsEmpty,
    Clear,
    Push,
    ArrayPop,
    First,
    Last,
    Contains,
    FirstIndex,
    LastIndex,
    Count,
    Insert,
    Remove,
    Reverse,
    Slice,
    Copy,
    Concat,
    Swap,
    Equals,
    Join,
    Sum,
    Min,
    Max,
    Average,
    Trim,

    // Free functions (null receiver, installed as globals)
    Input,
    Fill,
    Init,
    ArrayInput,
    Random,
    RandomInteger,
}

/// Which receiver variant a method row applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Recv {
    Any,
    Bool,
    Number,
    Str,
    Array,
    /// Free function; never resolved through property access
    Global,
}

impl Recv {
    fn matches(self, receiver: &Value) -> bool {
        match self {
            Recv::Any => true,
            Recv::Bool => matches!(receiver, Value::Bool(_)),
            Recv::Number => matches!(receiver, Value::Number(_)),
            Recv::Str => matches!(receiver, Value::Str(_)),
            Recv::Array => matches!(receiver, Value::Array(_)),
            Recv::Global => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Arity {
    Exactly(usize),
    Between(usize, usize),
    Any,
}

impl Arity {
    fn check(self, name: &str, count: usize) -> Result<(), String> {
        match self {
            Arity::Exactly(0) if count != 0 => Err(format!("{}() takes no arguments", name)),
            Arity::Exactly(1) if count != 1 => Err(format!("{}() expects 1 argument", name)),
            Arity::Exactly(n) if count != n => Err(format!("{}() expects {} arguments", name, n)),
            Arity::Between(0, hi) if count > hi => {
                Err(format!("{}() expects at most {} argument", name, hi))
            }
            Arity::Between(lo, hi) if count < lo || count > hi => {
                Err(format!("{}() expects {} or {} arguments", name, lo, hi))
            }
            _ => Ok(()),
        }
    }
}

/// Reader/writer pair the VM lends to I/O-performing built-ins
pub struct MethodIo<'a> {
    pub input: &'a mut dyn BufRead,
    pub output: &'a mut dyn Write,
}

impl MethodIo<'_> {
    fn read_line(&mut self) -> Result<String, String> {
        let mut line = String::new();
        self.input.read_line(&mut line).map_err(|e| format!("Failed to read input: {}", e))?;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    fn write(&mut self, text: &str) -> Result<(), String> {
        self.output
            .write_all(text.as_bytes())
            .and_then(|_| self.output.flush())
            .map_err(|e| format!("Failed to write output: {}", e))
    }
}

type Handler = fn(&Value, &[Value], &mut MethodIo) -> Result<Value, String>;

struct MethodDef {
    method: NativeMethod,
    name: &'static str,
    receiver: Recv,
    arity: Arity,
    handler: Handler,
}

const fn def(
    method: NativeMethod,
    name: &'static str,
    receiver: Recv,
    arity: Arity,
    handler: Handler,
) -> MethodDef {
    MethodDef { method, name, receiver, arity, handler }
}

/// One row per built-in, in `NativeMethod` discriminant order
static METHODS: &[MethodDef] = &[
    def(NativeMethod::Type, "type", Recv::Any, Arity::Exactly(0), native_type),
    def(NativeMethod::ToString, "to_string", Recv::Any, Arity::Exactly(0), native_to_string),
    def(NativeMethod::BoolToInt, "to_int", Recv::Bool, Arity::Exactly(0), bool_to_int),
    def(NativeMethod::Pow, "pow", Recv::Number, Arity::Exactly(1), number_pow),
    def(NativeMethod::Sqrt, "sqrt", Recv::Number, Arity::Exactly(0), number_sqrt),
    def(NativeMethod::Fact, "fact", Recv::Number, Arity::Exactly(0), number_fact),
    def(NativeMethod::ToInt, "to_int", Recv::Number, Arity::Exactly(0), number_to_int),
    def(NativeMethod::Floor, "floor", Recv::Number, Arity::Exactly(0), number_floor),
    def(NativeMethod::Ceil, "ceil", Recv::Number, Arity::Exactly(0), number_ceil),
    def(NativeMethod::StrLength, "length", Recv::Str, Arity::Exactly(0), str_length),
    def(NativeMethod::StrIsEmpty, "is_empty", Recv::Str, Arity::Exactly(0), str_is_empty),
    def(NativeMethod::Upper, "upper", Recv::Str, Arity::Exactly(0), str_upper),
    def(NativeMethod::Lower, "lower", Recv::Str, Arity::Exactly(0), str_lower),
    def(NativeMethod::Capitalize, "capitalize", Recv::Str, Arity::Exactly(0), str_capitalize),
    def(NativeMethod::SwapCase, "swap", Recv::Str, Arity::Exactly(0), str_swap_case),
    def(NativeMethod::Find, "find", Recv::Str, Arity::Exactly(1), str_find),
    def(NativeMethod::FindLast, "find_last", Recv::Str, Arity::Exactly(1), str_find_last),
    def(NativeMethod::StrFirst, "first", Recv::Str, Arity::Exactly(0), str_first),
    def(NativeMethod::StrLast, "last", Recv::Str, Arity::Exactly(0), str_last),
    def(NativeMethod::StartsWith, "starts_with", Recv::Str, Arity::Exactly(1), str_starts_with),
    def(NativeMethod::EndsWith, "ends_with", Recv::Str, Arity::Exactly(1), str_ends_with),
    def(NativeMethod::IsNumber, "is_number", Recv::Str, Arity::Exactly(0), str_is_number),
    def(NativeMethod::IsSpace, "is_space", Recv::Str, Arity::Exactly(0), str_is_space),
    def(NativeMethod::IsAllSpaces, "is_all_spaces", Recv::Str, Arity::Exactly(0), str_is_all_spaces),
    def(NativeMethod::StrTrim, "trim", Recv::Str, Arity::Exactly(0), str_trim),
    def(NativeMethod::ToArray, "to_array", Recv::Str, Arity::Exactly(0), str_to_array),
    def(NativeMethod::Replace, "replace", Recv::Str, Arity::Exactly(2), str_replace),
    def(NativeMethod::StrCount, "count", Recv::Str, Arity::Exactly(1), str_count),
    def(NativeMethod::StrSlice, "slice", Recv::Str, Arity::Exactly(2), str_slice),
    def(NativeMethod::ToNumber, "to_number", Recv::Str, Arity::Exactly(0), str_to_number),
    def(NativeMethod::Length, "length", Recv::Array, Arity::Exactly(0), array_length),
    def(NativeMethod::IsEmpty, "is_empty", Recv::Array, Arity::Exactly(0), array_is_empty),
    def(NativeMethod::Clear, "clear", Recv::Array, Arity::Exactly(0), array_clear),
    def(NativeMethod::Push, "push", Recv::Array, Arity::Any, array_push),
    def(NativeMethod::ArrayPop, "pop", Recv::Array, Arity::Exactly(0), array_pop),
    def(NativeMethod::First, "first", Recv::Array, Arity::Exactly(0), array_first),
    def(NativeMethod::Last, "last", Recv::Array, Arity::Exactly(0), array_last),
    def(NativeMethod::Contains, "contains", Recv::Array, Arity::Exactly(1), array_contains),
    def(NativeMethod::FirstIndex, "first_index", Recv::Array, Arity::Exactly(1), array_first_index),
    def(NativeMethod::LastIndex, "last_index", Recv::Array, Arity::Exactly(1), array_last_index),
    def(NativeMethod::Count, "count", Recv::Array, Arity::Exactly(1), array_count),
    def(NativeMethod::Insert, "insert", Recv::Array, Arity::Exactly(2), array_insert),
    def(NativeMethod::Remove, "remove", Recv::Array, Arity::Exactly(1), array_remove),
    def(NativeMethod::Reverse, "reverse", Recv::Array, Arity::Exactly(0), array_reverse),
    def(NativeMethod::Slice, "slice", Recv::Array, Arity::Between(1, 2), array_slice),
    def(NativeMethod::Copy, "copy", Recv::Array, Arity::Exactly(0), array_copy),
    def(NativeMethod::Concat, "concat", Recv::Array, Arity::Exactly(1), array_concat),
    def(NativeMethod::Swap, "swap", Recv::Array, Arity::Exactly(2), array_swap),
    def(NativeMethod::Equals, "equals", Recv::Array, Arity::Exactly(1), array_equals),
    def(NativeMethod::Join, "join", Recv::Array, Arity::Exactly(1), array_join),
    def(NativeMethod::Sum, "sum", Recv::Array, Arity::Exactly(0), array_sum),
    def(NativeMethod::Min, "min", Recv::Array, Arity::Exactly(0), array_min),
    def(NativeMethod::Max, "max", Recv::Array, Arity::Exactly(0), array_max),
    def(NativeMethod::Average, "average", Recv::Array, Arity::Exactly(0), array_average),
    def(NativeMethod::Trim, "trim", Recv::Array, Arity::Exactly(1), array_trim),
    def(NativeMethod::Input, "input", Recv::Global, Arity::Between(0, 1), global_input),
    def(NativeMethod::Fill, "fill", Recv::Global, Arity::Any, global_fill),
    def(NativeMethod::Init, "init", Recv::Global, Arity::Exactly(2), global_init),
    def(NativeMethod::ArrayInput, "array_input", Recv::Global, Arity::Exactly(2), global_array_input),
    def(NativeMethod::Random, "random", Recv::Global, Arity::Exactly(0), global_random),
    def(NativeMethod::RandomInteger, "random_integer", Recv::Global, Arity::Exactly(2), global_random_integer),
];

impl NativeMethod {
    fn def(self) -> &'static MethodDef {
        &METHODS[self as usize]
    }

    /// Script-visible name of the method
    pub fn name(self) -> &'static str {
        self.def().name
    }

    /// Picks the built-in for a `(receiver variant, name)` pair. Names are
    /// unique within each receiver kind, and no variant redefines the
    /// universal names (`type`, `to_string`), so a first-match scan is
    /// unambiguous.
    pub fn resolve(receiver: &Value, name: &str) -> Option<NativeMethod> {
        METHODS
            .iter()
            .find(|d| d.name == name && d.receiver.matches(receiver))
            .map(|d| d.method)
    }

    /// The free functions seeded into the VM globals table
    pub fn globals() -> impl Iterator<Item = (&'static str, NativeMethod)> {
        METHODS.iter().filter(|d| d.receiver == Recv::Global).map(|d| (d.name, d.method))
    }
}

/// Invokes a built-in: table-driven arity check, then the row's handler.
/// Pushes exactly one result; void methods return null.
pub fn invoke(
    method: NativeMethod,
    receiver: &Value,
    args: &[Value],
    io: &mut MethodIo,
) -> Result<Value, String> {
    let def = method.def();
    def.arity.check(def.name, args.len())?;
    (def.handler)(receiver, args, io)
}

// === Receiver and argument accessors ===

fn number_receiver(receiver: &Value) -> Result<f64, String> {
    match receiver {
        Value::Number(n) => Ok(*n),
        _ => Err("Receiver must be a number".to_string()),
    }
}

fn string_receiver(receiver: &Value) -> Result<&str, String> {
    match receiver {
        Value::Str(s) => Ok(s.as_str()),
        _ => Err("Receiver must be a string".to_string()),
    }
}

fn array_receiver(receiver: &Value) -> Result<&std::rc::Rc<std::cell::RefCell<crate::value::Array>>, String> {
    match receiver {
        Value::Array(a) => Ok(a),
        _ => Err("Receiver must be an array".to_string()),
    }
}

fn number_arg(name: &str, args: &[Value], index: usize) -> Result<f64, String> {
    match &args[index] {
        Value::Number(n) => Ok(*n),
        _ => Err(format!("{}() argument must be a number", name)),
    }
}

fn string_arg<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a str, String> {
    match &args[index] {
        Value::Str(s) => Ok(s.as_str()),
        _ => Err(format!("{}() argument must be a string", name)),
    }
}

// === Universal ===

fn native_type(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    Ok(Value::string(receiver.type_name()))
}

fn native_to_string(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    Ok(Value::string(receiver.stringify()))
}

// === bool ===

fn bool_to_int(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    match receiver {
        Value::Bool(b) => Ok(Value::Number(if *b { 1.0 } else { 0.0 })),
        _ => Err("Receiver must be a bool".to_string()),
    }
}

// === number ===

fn number_pow(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let base = number_receiver(receiver)?;
    let exponent = number_arg("pow", args, 0)?;
    Ok(Value::Number(base.powf(exponent)))
}

fn number_sqrt(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let x = number_receiver(receiver)?;
    if x < 0.0 {
        return Err("sqrt() of negative number".to_string());
    }
    Ok(Value::Number(x.sqrt()))
}

fn number_fact(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let value = number_receiver(receiver)?;
    if value.floor() != value {
        return Err("fact() only works with whole numbers".to_string());
    }
    if value < 0.0 {
        return Err("fact() of negative number".to_string());
    }
    let n = value as i64;
    let mut result = 1.0;
    for i in 2..=n {
        result *= i as f64;
    }
    Ok(Value::Number(result))
}

fn number_to_int(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let value = number_receiver(receiver)?;
    Ok(Value::Number(value.round_ties_even()))
}

fn number_floor(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    Ok(Value::Number(number_receiver(receiver)?.floor()))
}

fn number_ceil(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    Ok(Value::Number(number_receiver(receiver)?.ceil()))
}

// === string ===
//
// String methods are byte-indexed: positions, lengths and case mappings all
// work on bytes, matching the language's 1-byte-per-character contract.

fn str_length(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    Ok(Value::Number(string_receiver(receiver)?.len() as f64))
}

fn str_is_empty(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    Ok(Value::Bool(string_receiver(receiver)?.is_empty()))
}

fn str_upper(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    Ok(Value::string(string_receiver(receiver)?.to_ascii_uppercase()))
}

fn str_lower(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    Ok(Value::string(string_receiver(receiver)?.to_ascii_lowercase()))
}

fn str_capitalize(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let mut bytes = string_receiver(receiver)?.as_bytes().to_vec();
    if let Some(first) = bytes.first_mut() {
        *first = first.to_ascii_uppercase();
    }
    Ok(Value::string(String::from_utf8_lossy(&bytes).into_owned()))
}

fn str_swap_case(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let swapped: Vec<u8> = string_receiver(receiver)?
        .bytes()
        .map(|b| {
            if b.is_ascii_lowercase() {
                b.to_ascii_uppercase()
            } else {
                b.to_ascii_lowercase()
            }
        })
        .collect();
    Ok(Value::string(String::from_utf8_lossy(&swapped).into_owned()))
}

fn str_find(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let s = string_receiver(receiver)?;
    let sub = string_arg("find", args, 0)?;
    Ok(Value::Number(s.find(sub).map_or(-1.0, |pos| pos as f64)))
}

fn str_find_last(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let s = string_receiver(receiver)?;
    let sub = string_arg("find_last", args, 0)?;
    Ok(Value::Number(s.rfind(sub).map_or(-1.0, |pos| pos as f64)))
}

fn str_first(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let s = string_receiver(receiver)?;
    match s.as_bytes().first() {
        Some(&b) => Ok(Value::string(String::from_utf8_lossy(&[b]).into_owned())),
        None => Ok(Value::Null),
    }
}

fn str_last(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let s = string_receiver(receiver)?;
    match s.as_bytes().last() {
        Some(&b) => Ok(Value::string(String::from_utf8_lossy(&[b]).into_owned())),
        None => Ok(Value::Null),
    }
}

fn str_starts_with(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let s = string_receiver(receiver)?;
    let prefix = string_arg("starts_with", args, 0)?;
    Ok(Value::Bool(s.starts_with(prefix)))
}

fn str_ends_with(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let s = string_receiver(receiver)?;
    let suffix = string_arg("ends_with", args, 0)?;
    Ok(Value::Bool(s.ends_with(suffix)))
}

fn str_is_number(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let s = string_receiver(receiver)?.trim_start();
    Ok(Value::Bool(!s.is_empty() && s.parse::<f64>().is_ok()))
}

fn str_is_space(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let s = string_receiver(receiver)?;
    if s.len() != 1 {
        return Err("is_space() expects a single character string".to_string());
    }
    Ok(Value::Bool(s.as_bytes()[0].is_ascii_whitespace()))
}

fn str_is_all_spaces(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let s = string_receiver(receiver)?;
    Ok(Value::Bool(s.bytes().all(|b| b.is_ascii_whitespace())))
}

fn str_trim(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let s = string_receiver(receiver)?;
    Ok(Value::string(s.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))))
}

fn str_to_array(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let elements = string_receiver(receiver)?
        .bytes()
        .map(|b| Value::string(String::from_utf8_lossy(&[b]).into_owned()))
        .collect();
    Ok(Value::array(elements))
}

fn str_replace(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let s = string_receiver(receiver)?;
    let target = string_arg("replace", args, 0)?;
    let replacement = string_arg("replace", args, 1)?;
    if target.is_empty() {
        return Err("replace() target cannot be empty".to_string());
    }
    // Non-overlapping, left to right
    Ok(Value::string(s.replace(target, replacement)))
}

fn str_count(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let s = string_receiver(receiver)?;
    let sub = string_arg("count", args, 0)?;
    if sub.is_empty() {
        return Err("count() the first argument cannot be empty".to_string());
    }
    Ok(Value::Number(s.matches(sub).count() as f64))
}

fn str_slice(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let s = string_receiver(receiver)?;
    let start = number_arg("slice", args, 0)? as i64;
    let len = number_arg("slice", args, 1)? as i64;

    if start < 0 || len < 0 || start >= s.len() as i64 {
        return Err("slice() invalid range".to_string());
    }
    let start = start as usize;
    let end = start.saturating_add(len as usize).min(s.len());
    Ok(Value::string(String::from_utf8_lossy(&s.as_bytes()[start..end]).into_owned()))
}

fn str_to_number(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let s = string_receiver(receiver)?.trim_start();
    s.parse::<f64>().map(Value::Number).map_err(|_| "Not a valid number".to_string())
}

// === array ===

fn array_length(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    Ok(Value::Number(array.borrow().elements.len() as f64))
}

fn array_is_empty(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    Ok(Value::Bool(array.borrow().elements.is_empty()))
}

fn array_clear(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    array.borrow_mut().elements.clear();
    Ok(Value::Null)
}

fn array_push(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    array.borrow_mut().elements.extend(args.iter().cloned());
    Ok(Value::Null)
}

fn array_pop(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    Ok(array.borrow_mut().elements.pop().unwrap_or(Value::Null))
}

fn array_first(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    Ok(array.borrow().elements.first().cloned().unwrap_or(Value::Null))
}

fn array_last(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    Ok(array.borrow().elements.last().cloned().unwrap_or(Value::Null))
}

fn array_contains(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    Ok(Value::Bool(array.borrow().elements.iter().any(|v| v == &args[0])))
}

fn array_first_index(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    let index = array.borrow().elements.iter().position(|v| v == &args[0]);
    Ok(Value::Number(index.map_or(-1.0, |i| i as f64)))
}

fn array_last_index(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    let index = array.borrow().elements.iter().rposition(|v| v == &args[0]);
    Ok(Value::Number(index.map_or(-1.0, |i| i as f64)))
}

fn array_count(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    let count = array.borrow().elements.iter().filter(|v| *v == &args[0]).count();
    Ok(Value::Number(count as f64))
}

fn array_insert(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    let index = number_arg("insert", args, 0)? as i64;
    let len = array.borrow().elements.len() as i64;
    if index < 0 || index > len {
        return Err("Index out of bounds".to_string());
    }
    array.borrow_mut().elements.insert(index as usize, args[1].clone());
    Ok(Value::Null)
}

fn array_remove(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    let index = number_arg("remove", args, 0)? as i64;
    let len = array.borrow().elements.len() as i64;
    if index < 0 || index >= len {
        return Ok(Value::Null);
    }
    Ok(array.borrow_mut().elements.remove(index as usize))
}

fn array_reverse(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    array.borrow_mut().elements.reverse();
    Ok(Value::Null)
}

fn array_slice(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    let elements = &array.borrow().elements;
    let len = elements.len() as i64;

    let mut start = number_arg("slice", args, 0)? as i64;
    let mut end = if args.len() == 2 { number_arg("slice", args, 1)? as i64 } else { len };

    if start < 0 {
        start = 0;
    }
    if end > len {
        end = len;
    }
    if end < start {
        end = start;
    }

    Ok(Value::array(elements[start as usize..end as usize].to_vec()))
}

fn array_copy(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    Ok(Value::array(array.borrow().elements.clone()))
}

fn array_concat(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    let Value::Array(other) = &args[0] else {
        return Err("concat() argument must be an array".to_string());
    };
    let mut elements = array.borrow().elements.clone();
    elements.extend(other.borrow().elements.iter().cloned());
    Ok(Value::array(elements))
}

fn array_swap(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    let i = number_arg("swap", args, 0)? as i64;
    let j = number_arg("swap", args, 1)? as i64;
    let len = array.borrow().elements.len() as i64;
    if i < 0 || j < 0 || i >= len || j >= len {
        return Err("Index out of bounds".to_string());
    }
    array.borrow_mut().elements.swap(i as usize, j as usize);
    Ok(Value::Null)
}

fn array_equals(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    let Value::Array(other) = &args[0] else {
        return Ok(Value::Bool(false));
    };
    if std::rc::Rc::ptr_eq(array, other) {
        return Ok(Value::Bool(true));
    }
    let a = array.borrow();
    let b = other.borrow();
    let equal = a.elements.len() == b.elements.len()
        && a.elements.iter().zip(b.elements.iter()).all(|(x, y)| x == y);
    Ok(Value::Bool(equal))
}

fn array_join(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    let separator = string_arg("join", args, 0)?;
    let parts: Vec<String> = array.borrow().elements.iter().map(Value::stringify).collect();
    Ok(Value::string(parts.join(separator)))
}

fn numeric_elements(receiver: &Value, name: &str) -> Result<Vec<f64>, String> {
    let array = array_receiver(receiver)?;
    array
        .borrow()
        .elements
        .iter()
        .map(|v| match v {
            Value::Number(n) => Ok(*n),
            _ => Err(format!("{}() only works on numeric arrays", name)),
        })
        .collect()
}

fn array_sum(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    Ok(Value::Number(numeric_elements(receiver, "sum")?.iter().sum()))
}

fn array_min(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let values = numeric_elements(receiver, "min")?;
    if values.is_empty() {
        return Err("min() of empty array".to_string());
    }
    Ok(Value::Number(values.iter().copied().fold(f64::MAX, f64::min)))
}

fn array_max(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let values = numeric_elements(receiver, "max")?;
    if values.is_empty() {
        return Err("max() of empty array".to_string());
    }
    Ok(Value::Number(values.iter().copied().fold(f64::MIN, f64::max)))
}

fn array_average(receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let values = numeric_elements(receiver, "average")?;
    if values.is_empty() {
        return Err("average() of empty array".to_string());
    }
    Ok(Value::Number(values.iter().sum::<f64>() / values.len() as f64))
}

fn array_trim(receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let array = array_receiver(receiver)?;
    let mut n = number_arg("trim", args, 0)? as i64;
    if n < 0 {
        n = 0;
    }
    let mut inner = array.borrow_mut();
    if (n as usize) < inner.elements.len() {
        inner.elements.truncate(n as usize);
    }
    Ok(Value::Null)
}

// === Free functions ===

fn global_input(_receiver: &Value, args: &[Value], io: &mut MethodIo) -> Result<Value, String> {
    if let Some(prompt) = args.first() {
        let Value::Str(text) = prompt else {
            return Err("input() prompt must be a string".to_string());
        };
        io.write(text)?;
    }
    Ok(Value::string(io.read_line()?))
}

fn global_fill(_receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    Ok(Value::array(args.to_vec()))
}

fn global_init(_receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let Value::Number(size) = &args[0] else {
        return Err("init() size must be a number".to_string());
    };
    let size = *size as i64;
    if size < 0 {
        return Err("init() size must be >= 0".to_string());
    }
    Ok(Value::array(vec![args[1].clone(); size as usize]))
}

fn global_array_input(_receiver: &Value, args: &[Value], io: &mut MethodIo) -> Result<Value, String> {
    let Value::Number(count) = &args[0] else {
        return Err("array_input() count must be a number".to_string());
    };
    let Value::Str(prompt) = &args[1] else {
        return Err("array_input() prompt must be a string".to_string());
    };
    let count = *count as i64;
    if count < 0 {
        return Err("array_input() count must be >= 0".to_string());
    }

    let mut elements = Vec::with_capacity(count as usize);
    for _ in 0..count {
        io.write(prompt)?;
        elements.push(Value::string(io.read_line()?));
    }
    Ok(Value::array(elements))
}

fn global_random(_receiver: &Value, _args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    Ok(Value::Number(rand::thread_rng().gen::<f64>()))
}

fn global_random_integer(_receiver: &Value, args: &[Value], _io: &mut MethodIo) -> Result<Value, String> {
    let (Value::Number(a), Value::Number(b)) = (&args[0], &args[1]) else {
        return Err("random_integer() arguments must be numbers".to_string());
    };
    let (a, b) = (*a as i64, *b as i64);
    if a > b {
        return Err("random_integer() first argument must be <= second".to_string());
    }
    Ok(Value::Number(rand::thread_rng().gen_range(a..=b) as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn call(method: NativeMethod, receiver: &Value, args: &[Value]) -> Result<Value, String> {
        call_with_input(method, receiver, args, "").map(|(v, _)| v)
    }

    fn call_with_input(
        method: NativeMethod,
        receiver: &Value,
        args: &[Value],
        input: &str,
    ) -> Result<(Value, String), String> {
        let mut reader = Cursor::new(input.as_bytes().to_vec());
        let mut written = Vec::new();
        let mut io = MethodIo { input: &mut reader, output: &mut written };
        let value = invoke(method, receiver, args, &mut io)?;
        Ok((value, String::from_utf8_lossy(&written).into_owned()))
    }

    #[test]
    fn table_order_matches_enum_discriminants() {
        for (index, def) in METHODS.iter().enumerate() {
            assert_eq!(def.method as usize, index, "row {} out of order: {}", index, def.name);
        }
    }

    #[test]
    fn resolution_is_keyed_on_receiver_variant() {
        let s = Value::string("ab");
        let a = Value::array(vec![]);
        assert_eq!(NativeMethod::resolve(&s, "length"), Some(NativeMethod::StrLength));
        assert_eq!(NativeMethod::resolve(&a, "length"), Some(NativeMethod::Length));
        assert_eq!(NativeMethod::resolve(&s, "count"), Some(NativeMethod::StrCount));
        assert_eq!(NativeMethod::resolve(&a, "count"), Some(NativeMethod::Count));
        assert_eq!(NativeMethod::resolve(&Value::Number(1.0), "push"), None);
        assert_eq!(NativeMethod::resolve(&s, "no_such_method"), None);
    }

    #[test]
    fn type_resolves_on_every_variant() {
        for value in [Value::Null, Value::Bool(true), Value::Number(1.0), Value::string("")] {
            assert_eq!(NativeMethod::resolve(&value, "type"), Some(NativeMethod::Type));
        }
        assert_eq!(call(NativeMethod::Type, &Value::Null, &[]).unwrap(), Value::string("null"));
    }

    #[test]
    fn free_functions_never_resolve_as_properties() {
        assert_eq!(NativeMethod::resolve(&Value::Number(1.0), "random"), None);
        assert_eq!(NativeMethod::globals().count(), 6);
    }

    #[test]
    fn arity_mismatch_is_an_error() {
        let err = call(NativeMethod::Sqrt, &Value::Number(4.0), &[Value::Number(1.0)]).unwrap_err();
        assert!(err.contains("takes no arguments"));
        let err = call(NativeMethod::Pow, &Value::Number(2.0), &[]).unwrap_err();
        assert!(err.contains("expects 1 argument"));
    }

    #[test]
    fn number_methods() {
        assert_eq!(
            call(NativeMethod::Pow, &Value::Number(2.0), &[Value::Number(10.0)]).unwrap(),
            Value::Number(1024.0)
        );
        assert_eq!(call(NativeMethod::Sqrt, &Value::Number(9.0), &[]).unwrap(), Value::Number(3.0));
        assert!(call(NativeMethod::Sqrt, &Value::Number(-1.0), &[]).is_err());
        assert_eq!(call(NativeMethod::Fact, &Value::Number(5.0), &[]).unwrap(), Value::Number(120.0));
        assert_eq!(call(NativeMethod::Fact, &Value::Number(0.0), &[]).unwrap(), Value::Number(1.0));
        assert!(call(NativeMethod::Fact, &Value::Number(-1.0), &[]).is_err());
        assert!(call(NativeMethod::Fact, &Value::Number(2.5), &[]).is_err());
        assert_eq!(call(NativeMethod::Floor, &Value::Number(2.7), &[]).unwrap(), Value::Number(2.0));
        assert_eq!(call(NativeMethod::Ceil, &Value::Number(2.1), &[]).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn to_int_rounds_half_to_even() {
        assert_eq!(call(NativeMethod::ToInt, &Value::Number(2.5), &[]).unwrap(), Value::Number(2.0));
        assert_eq!(call(NativeMethod::ToInt, &Value::Number(3.5), &[]).unwrap(), Value::Number(4.0));
        assert_eq!(call(NativeMethod::ToInt, &Value::Number(2.4), &[]).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn bool_to_int() {
        assert_eq!(call(NativeMethod::BoolToInt, &Value::Bool(true), &[]).unwrap(), Value::Number(1.0));
        assert_eq!(call(NativeMethod::BoolToInt, &Value::Bool(false), &[]).unwrap(), Value::Number(0.0));
    }

    #[test]
    fn string_case_methods() {
        let s = Value::string("hEllo");
        assert_eq!(call(NativeMethod::Upper, &s, &[]).unwrap(), Value::string("HELLO"));
        assert_eq!(call(NativeMethod::Lower, &s, &[]).unwrap(), Value::string("hello"));
        assert_eq!(call(NativeMethod::Capitalize, &s, &[]).unwrap(), Value::string("HEllo"));
        assert_eq!(call(NativeMethod::SwapCase, &s, &[]).unwrap(), Value::string("HeLLO"));
    }

    #[test]
    fn string_search_methods() {
        let s = Value::string("abcabc");
        assert_eq!(
            call(NativeMethod::Find, &s, &[Value::string("bc")]).unwrap(),
            Value::Number(1.0)
        );
        assert_eq!(
            call(NativeMethod::FindLast, &s, &[Value::string("bc")]).unwrap(),
            Value::Number(4.0)
        );
        assert_eq!(
            call(NativeMethod::Find, &s, &[Value::string("zz")]).unwrap(),
            Value::Number(-1.0)
        );
        assert_eq!(
            call(NativeMethod::StartsWith, &s, &[Value::string("ab")]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call(NativeMethod::EndsWith, &s, &[Value::string("bc")]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn string_replace_is_non_overlapping_left_to_right() {
        let s = Value::string("aaa");
        assert_eq!(
            call(NativeMethod::Replace, &s, &[Value::string("aa"), Value::string("b")]).unwrap(),
            Value::string("ba")
        );
        assert!(call(NativeMethod::Replace, &s, &[Value::string(""), Value::string("b")]).is_err());
    }

    #[test]
    fn string_count_is_non_overlapping() {
        let s = Value::string("aaaa");
        assert_eq!(
            call(NativeMethod::StrCount, &s, &[Value::string("aa")]).unwrap(),
            Value::Number(2.0)
        );
        assert!(call(NativeMethod::StrCount, &s, &[Value::string("")]).is_err());
    }

    #[test]
    fn string_slice_bounds() {
        let s = Value::string("hello");
        assert_eq!(
            call(NativeMethod::StrSlice, &s, &[Value::Number(1.0), Value::Number(3.0)]).unwrap(),
            Value::string("ell")
        );
        // Length clamps to the end of the string
        assert_eq!(
            call(NativeMethod::StrSlice, &s, &[Value::Number(3.0), Value::Number(10.0)]).unwrap(),
            Value::string("lo")
        );
        assert!(call(NativeMethod::StrSlice, &s, &[Value::Number(5.0), Value::Number(1.0)]).is_err());
        assert!(call(NativeMethod::StrSlice, &s, &[Value::Number(-1.0), Value::Number(1.0)]).is_err());
    }

    #[test]
    fn string_predicates() {
        assert_eq!(
            call(NativeMethod::IsNumber, &Value::string(" 3.5"), &[]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call(NativeMethod::IsNumber, &Value::string("3.5x"), &[]).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(call(NativeMethod::IsSpace, &Value::string(" "), &[]).unwrap(), Value::Bool(true));
        assert!(call(NativeMethod::IsSpace, &Value::string("ab"), &[]).is_err());
        assert_eq!(
            call(NativeMethod::IsAllSpaces, &Value::string(" \t "), &[]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call(NativeMethod::IsAllSpaces, &Value::string(""), &[]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn string_trim_and_conversions() {
        assert_eq!(
            call(NativeMethod::StrTrim, &Value::string("  hi\t\n"), &[]).unwrap(),
            Value::string("hi")
        );
        assert_eq!(
            call(NativeMethod::ToNumber, &Value::string(" 12.5"), &[]).unwrap(),
            Value::Number(12.5)
        );
        assert!(call(NativeMethod::ToNumber, &Value::string("12x"), &[]).is_err());
        let chars = call(NativeMethod::ToArray, &Value::string("ab"), &[]).unwrap();
        let Value::Array(chars) = chars else { panic!("expected array") };
        assert_eq!(chars.borrow().elements.len(), 2);
        assert_eq!(chars.borrow().elements[0], Value::string("a"));
    }

    #[test]
    fn empty_string_first_and_last_are_null() {
        let empty = Value::string("");
        assert_eq!(call(NativeMethod::StrFirst, &empty, &[]).unwrap(), Value::Null);
        assert_eq!(call(NativeMethod::StrLast, &empty, &[]).unwrap(), Value::Null);
        let s = Value::string("xy");
        assert_eq!(call(NativeMethod::StrFirst, &s, &[]).unwrap(), Value::string("x"));
        assert_eq!(call(NativeMethod::StrLast, &s, &[]).unwrap(), Value::string("y"));
    }

    fn numbers(values: &[f64]) -> Value {
        Value::array(values.iter().map(|&n| Value::Number(n)).collect())
    }

    #[test]
    fn array_mutators() {
        let a = numbers(&[1.0, 2.0]);
        call(NativeMethod::Push, &a, &[Value::Number(3.0), Value::Number(4.0)]).unwrap();
        assert_eq!(call(NativeMethod::Length, &a, &[]).unwrap(), Value::Number(4.0));
        assert_eq!(call(NativeMethod::ArrayPop, &a, &[]).unwrap(), Value::Number(4.0));
        call(NativeMethod::Insert, &a, &[Value::Number(0.0), Value::Number(9.0)]).unwrap();
        assert_eq!(call(NativeMethod::First, &a, &[]).unwrap(), Value::Number(9.0));
        assert!(call(NativeMethod::Insert, &a, &[Value::Number(99.0), Value::Number(0.0)]).is_err());
        call(NativeMethod::Reverse, &a, &[]).unwrap();
        assert_eq!(call(NativeMethod::First, &a, &[]).unwrap(), Value::Number(3.0));
        call(NativeMethod::Clear, &a, &[]).unwrap();
        assert_eq!(call(NativeMethod::IsEmpty, &a, &[]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn pop_and_peek_on_empty_array_return_null() {
        let a = numbers(&[]);
        assert_eq!(call(NativeMethod::ArrayPop, &a, &[]).unwrap(), Value::Null);
        assert_eq!(call(NativeMethod::First, &a, &[]).unwrap(), Value::Null);
        assert_eq!(call(NativeMethod::Last, &a, &[]).unwrap(), Value::Null);
    }

    #[test]
    fn remove_out_of_range_returns_null() {
        let a = numbers(&[1.0, 2.0]);
        assert_eq!(call(NativeMethod::Remove, &a, &[Value::Number(5.0)]).unwrap(), Value::Null);
        assert_eq!(call(NativeMethod::Remove, &a, &[Value::Number(-1.0)]).unwrap(), Value::Null);
        assert_eq!(call(NativeMethod::Remove, &a, &[Value::Number(0.0)]).unwrap(), Value::Number(1.0));
        assert_eq!(call(NativeMethod::Length, &a, &[]).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn array_searches() {
        let a = numbers(&[1.0, 2.0, 1.0]);
        assert_eq!(call(NativeMethod::Contains, &a, &[Value::Number(2.0)]).unwrap(), Value::Bool(true));
        assert_eq!(
            call(NativeMethod::FirstIndex, &a, &[Value::Number(1.0)]).unwrap(),
            Value::Number(0.0)
        );
        assert_eq!(
            call(NativeMethod::LastIndex, &a, &[Value::Number(1.0)]).unwrap(),
            Value::Number(2.0)
        );
        assert_eq!(call(NativeMethod::Count, &a, &[Value::Number(1.0)]).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn last_index_on_empty_array_is_minus_one() {
        let empty = numbers(&[]);
        assert_eq!(
            call(NativeMethod::LastIndex, &empty, &[Value::Number(1.0)]).unwrap(),
            Value::Number(-1.0)
        );
    }

    #[test]
    fn array_slice_clamps() {
        let a = numbers(&[1.0, 2.0, 3.0, 4.0]);
        let Value::Array(s) = call(NativeMethod::Slice, &a, &[Value::Number(1.0)]).unwrap() else {
            panic!("expected array")
        };
        assert_eq!(s.borrow().elements.len(), 3);
        let Value::Array(s) =
            call(NativeMethod::Slice, &a, &[Value::Number(-5.0), Value::Number(99.0)]).unwrap()
        else {
            panic!("expected array")
        };
        assert_eq!(s.borrow().elements.len(), 4);
        let Value::Array(s) =
            call(NativeMethod::Slice, &a, &[Value::Number(3.0), Value::Number(1.0)]).unwrap()
        else {
            panic!("expected array")
        };
        assert!(s.borrow().elements.is_empty());
    }

    #[test]
    fn copy_and_concat_build_fresh_arrays() {
        let a = numbers(&[1.0]);
        let copied = call(NativeMethod::Copy, &a, &[]).unwrap();
        assert_ne!(a, copied);
        let b = numbers(&[2.0]);
        let Value::Array(joined) = call(NativeMethod::Concat, &a, &[b]).unwrap() else {
            panic!("expected array")
        };
        assert_eq!(joined.borrow().elements.len(), 2);
        assert!(call(NativeMethod::Concat, &a, &[Value::Number(1.0)]).is_err());
    }

    #[test]
    fn equals_is_shallow() {
        let a = numbers(&[1.0, 2.0]);
        let b = numbers(&[1.0, 2.0]);
        let c = numbers(&[1.0]);
        assert_eq!(call(NativeMethod::Equals, &a, &[b]).unwrap(), Value::Bool(true));
        assert_eq!(call(NativeMethod::Equals, &a, &[c]).unwrap(), Value::Bool(false));
        assert_eq!(call(NativeMethod::Equals, &a, &[Value::Number(1.0)]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn swap_checks_both_indexes() {
        let a = numbers(&[1.0, 2.0]);
        call(NativeMethod::Swap, &a, &[Value::Number(0.0), Value::Number(1.0)]).unwrap();
        assert_eq!(call(NativeMethod::First, &a, &[]).unwrap(), Value::Number(2.0));
        assert!(call(NativeMethod::Swap, &a, &[Value::Number(0.0), Value::Number(5.0)]).is_err());
    }

    #[test]
    fn numeric_aggregates() {
        let a = numbers(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(call(NativeMethod::Sum, &a, &[]).unwrap(), Value::Number(10.0));
        assert_eq!(call(NativeMethod::Min, &a, &[]).unwrap(), Value::Number(1.0));
        assert_eq!(call(NativeMethod::Max, &a, &[]).unwrap(), Value::Number(4.0));
        assert_eq!(call(NativeMethod::Average, &a, &[]).unwrap(), Value::Number(2.5));

        let empty = numbers(&[]);
        assert_eq!(call(NativeMethod::Sum, &empty, &[]).unwrap(), Value::Number(0.0));
        assert!(call(NativeMethod::Min, &empty, &[]).is_err());
        assert!(call(NativeMethod::Max, &empty, &[]).is_err());
        assert!(call(NativeMethod::Average, &empty, &[]).is_err());

        let mixed = Value::array(vec![Value::Number(1.0), Value::string("x")]);
        assert!(call(NativeMethod::Sum, &mixed, &[]).is_err());
    }

    #[test]
    fn trim_resizes_down_only() {
        let a = numbers(&[1.0, 2.0, 3.0]);
        call(NativeMethod::Trim, &a, &[Value::Number(5.0)]).unwrap();
        assert_eq!(call(NativeMethod::Length, &a, &[]).unwrap(), Value::Number(3.0));
        call(NativeMethod::Trim, &a, &[Value::Number(1.0)]).unwrap();
        assert_eq!(call(NativeMethod::Length, &a, &[]).unwrap(), Value::Number(1.0));
        call(NativeMethod::Trim, &a, &[Value::Number(-2.0)]).unwrap();
        assert_eq!(call(NativeMethod::Length, &a, &[]).unwrap(), Value::Number(0.0));
    }

    #[test]
    fn input_echoes_prompt_and_reads_a_line() {
        let (value, written) =
            call_with_input(NativeMethod::Input, &Value::Null, &[Value::string("> ")], "hello\nrest")
                .unwrap();
        assert_eq!(value, Value::string("hello"));
        assert_eq!(written, "> ");
        assert!(call(NativeMethod::Input, &Value::Null, &[Value::Number(1.0)]).is_err());
    }

    #[test]
    fn array_input_reads_count_lines() {
        let (value, written) = call_with_input(
            NativeMethod::ArrayInput,
            &Value::Null,
            &[Value::Number(2.0), Value::string("? ")],
            "a\nb\n",
        )
        .unwrap();
        let Value::Array(lines) = value else { panic!("expected array") };
        assert_eq!(lines.borrow().elements, vec![Value::string("a"), Value::string("b")]);
        assert_eq!(written, "? ? ");
    }

    #[test]
    fn fill_and_init_build_arrays() {
        let Value::Array(filled) =
            call(NativeMethod::Fill, &Value::Null, &[Value::Number(1.0), Value::string("x")]).unwrap()
        else {
            panic!("expected array")
        };
        assert_eq!(filled.borrow().elements.len(), 2);

        let Value::Array(filled) =
            call(NativeMethod::Init, &Value::Null, &[Value::Number(3.0), Value::Bool(true)]).unwrap()
        else {
            panic!("expected array")
        };
        assert_eq!(filled.borrow().elements, vec![Value::Bool(true); 3]);
        assert!(call(NativeMethod::Init, &Value::Null, &[Value::Number(-1.0), Value::Null]).is_err());
    }

    #[test]
    fn random_builtins_respect_their_ranges() {
        for _ in 0..50 {
            let Value::Number(x) = call(NativeMethod::Random, &Value::Null, &[]).unwrap() else {
                panic!("expected number")
            };
            assert!((0.0..1.0).contains(&x));
            let Value::Number(n) = call(
                NativeMethod::RandomInteger,
                &Value::Null,
                &[Value::Number(3.0), Value::Number(5.0)],
            )
            .unwrap() else {
                panic!("expected number")
            };
            assert!((3.0..=5.0).contains(&n));
            assert_eq!(n, n.trunc());
        }
        assert!(call(
            NativeMethod::RandomInteger,
            &Value::Null,
            &[Value::Number(5.0), Value::Number(3.0)]
        )
        .is_err());
    }
}

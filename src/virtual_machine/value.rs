//! Tagged runtime values.
//!
//! A [`Value`] is what a register, a global slot or an array element holds.
//! Scalars are stored inline; arrays live in the [`Heap`](super::heap::Heap)
//! and are referenced through a generational [`ArrayRef`] handle.

use std::fmt;

/// Generational handle to a heap array.
///
/// The generation changes every time a slot is reused, so a handle kept past
/// deallocation is detected instead of aliasing a newer array.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ArrayRef {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl ArrayRef {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Built-in function implemented by the interpreter.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum NativeFunction {
    /// `len(array) -> I32`
    Len,
    /// `sqrt(F64) -> F64`
    Sqrt,
    /// `print(value) -> value`, writes the rendered value to stdout.
    Print,
}

impl NativeFunction {
    pub const ALL: [NativeFunction; 3] = [NativeFunction::Len, NativeFunction::Sqrt, NativeFunction::Print];

    pub fn from_name(name: &str) -> Option<NativeFunction> {
        Self::ALL.into_iter().find(|native| native.name() == name)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            NativeFunction::Len => "len",
            NativeFunction::Sqrt => "sqrt",
            NativeFunction::Print => "print",
        }
    }

    /// Number of consecutive argument registers the native reads.
    pub const fn arity(&self) -> usize {
        match self {
            NativeFunction::Len | NativeFunction::Sqrt | NativeFunction::Print => 1,
        }
    }
}

/// Callable target of a `Function` value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FunctionRef {
    /// Index into the module's function list.
    Compiled(u16),
    Native(NativeFunction),
}

/// Runtime value stored in registers, globals and array elements.
///
/// Equality of arrays depends on heap contents, so `Value` has no
/// `PartialEq`; use [`Heap::values_equal`](super::heap::Heap::values_equal).
#[derive(Clone, Copy, Debug)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Array(ArrayRef),
    Function(FunctionRef),
}

impl Default for Value {
    fn default() -> Self {
        Value::I32(0)
    }
}

impl Value {
    pub const fn from_bool(v: bool) -> Self {
        Value::Bool(v)
    }

    pub const fn from_i32(v: i32) -> Self {
        Value::I32(v)
    }

    pub const fn from_i64(v: i64) -> Self {
        Value::I64(v)
    }

    pub const fn from_f32(v: f32) -> Self {
        Value::F32(v)
    }

    pub const fn from_f64(v: f64) -> Self {
        Value::F64(v)
    }

    pub const fn from_function(f: FunctionRef) -> Self {
        Value::Function(f)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<ArrayRef> {
        match self {
            Value::Array(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<FunctionRef> {
        match self {
            Value::Function(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the type name for error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "Bool",
            Value::I32(_) => "I32",
            Value::I64(_) => "I64",
            Value::F32(_) => "F32",
            Value::F64(_) => "F64",
            Value::Array(_) => "Array",
            Value::Function(_) => "Function",
        }
    }

    /// Equality of two non-array values. Arrays compare by handle only.
    pub(crate) fn shallow_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    /// Shallow rendering; arrays print as their handle.
    /// [`Heap::render`](super::heap::Heap::render) prints their elements.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v:?}"),
            Value::F64(v) => write!(f, "{v:?}"),
            Value::Array(r) => write!(f, "<array #{}>", r.index),
            Value::Function(FunctionRef::Compiled(index)) => write!(f, "<fn #{index}>"),
            Value::Function(FunctionRef::Native(native)) => write!(f, "<native {}>", native.name()),
        }
    }
}

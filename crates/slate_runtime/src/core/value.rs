//! Runtime value representation.

use std::hash::Hash;

use ahash::RandomState;
use hashbrown::HashMap;

use super::gc::{Heap, ValueId};
use crate::builtins::NativeFn;

pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;

pub fn fast_hasher() -> RandomState {
    RandomState::with_seeds(0, 0, 0, 0)
}

pub fn fast_map_new<K: Eq + Hash, V>() -> FastHashMap<K, V> {
    HashMap::with_hasher(fast_hasher())
}

/// A stack or variable slot. `None` is the no-value marker: a valid
/// entry everywhere, always falsy, never heap-allocated and never
/// reference-counted.
pub type Slot = Option<ValueId>;

/// What a `Function` value is bound to.
#[derive(Clone, Debug)]
pub enum FunctionKind {
    /// Index of a code object in the loaded image.
    Code(usize),
    Native(NativeFn),
}

/// Heap-allocated value payload.
///
/// Every non-marker value lives in the [`Heap`] and is addressed by a
/// [`ValueId`]. Lists hold counted references to their elements, not
/// copies.
#[derive(Clone, Debug)]
pub enum HeapValue {
    Char(u8),
    I16(i16),
    I32(i32),
    I64(i64),
    Str(Box<[u8]>),
    List(Vec<Slot>),
    Function(FunctionKind),
    Bool(bool),
}

impl HeapValue {
    /// Type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            HeapValue::Char(_) => "Char",
            HeapValue::I16(_) => "I16",
            HeapValue::I32(_) => "I32",
            HeapValue::I64(_) => "I64",
            HeapValue::Str(_) => "String",
            HeapValue::List(_) => "List",
            HeapValue::Function(_) => "Function",
            HeapValue::Bool(_) => "Bool",
        }
    }

    /// Truthiness: numerics are true iff non-zero, strings and lists
    /// iff non-empty, booleans use their value, functions are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            HeapValue::Char(c) => *c != 0,
            HeapValue::I16(n) => *n != 0,
            HeapValue::I32(n) => *n != 0,
            HeapValue::I64(n) => *n != 0,
            HeapValue::Str(s) => !s.is_empty(),
            HeapValue::List(items) => !items.is_empty(),
            HeapValue::Function(_) => false,
            HeapValue::Bool(b) => *b,
        }
    }
}

/// Render a slot for console output and diagnostics.
pub fn format_value(heap: &Heap, slot: Slot) -> String {
    let Some(id) = slot else {
        return "null".to_string();
    };
    match heap.get(id) {
        HeapValue::Char(c) => (*c as char).to_string(),
        HeapValue::I16(n) => n.to_string(),
        HeapValue::I32(n) => n.to_string(),
        HeapValue::I64(n) => n.to_string(),
        HeapValue::Str(s) => String::from_utf8_lossy(s).into_owned(),
        HeapValue::List(items) => {
            let mut out = String::from("[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&format_value(heap, *item));
            }
            out.push(']');
            out
        }
        HeapValue::Function(FunctionKind::Code(idx)) => format!("<function #{idx}>"),
        HeapValue::Function(FunctionKind::Native(_)) => "<native function>".to_string(),
        HeapValue::Bool(b) => b.to_string(),
    }
}

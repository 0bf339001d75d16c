//! Slate bytecode runtime.
//!
//! Loads a compiled container into an [`Image`], then drives it with a
//! [`Machine`]: a stack interpreter over reference-counted heap values
//! with per-call activation frames.

#![allow(clippy::new_without_default)]
#![allow(clippy::should_implement_trait)]

pub mod builtins;
pub mod core;
pub mod errors;
pub mod machine;
pub mod opcode;
pub mod program;
pub mod vm;

pub use crate::builtins::{BuiltinRegistry, NativeFn};
pub use crate::core::gc::{Heap, ValueId};
pub use crate::core::value::{FunctionKind, HeapValue, Slot, format_value};
pub use crate::errors::{Exception, LoadError, LoadResult, TraceEntry, messages};
pub use crate::machine::{Machine, MachineConfig};
pub use crate::opcode::Op;
pub use crate::program::{CodeObject, ENTRY_TAG, Image, QualifiedName};
pub use crate::vm::ARGS_VAR;

//! Per-activation execution state.
//!
//! Every call gets its own frame: a bounded operand stack, the saved
//! stack heights of in-progress list literals, a name-indexed dynamic
//! variable table, and a cursor into the owning object's bytecode.
//! Simple variables are deliberately not here: they are object-scoped
//! and live in the machine for the process lifetime.

use crate::core::gc::Heap;
use crate::core::value::Slot;
use crate::errors::messages;

pub(crate) struct DynVar {
    pub name: String,
    pub value: Slot,
}

pub(crate) struct Frame {
    pub stack: Vec<Slot>,
    pub list_bases: Vec<usize>,
    /// Tombstoned slots are reused before the table grows.
    pub dynamics: Vec<Option<DynVar>>,
    pub pc: usize,
    capacity: usize,
}

impl Frame {
    pub fn new(capacity: usize) -> Self {
        Self {
            stack: Vec::new(),
            list_bases: Vec::new(),
            dynamics: Vec::new(),
            pc: 0,
            capacity,
        }
    }

    /// Pushing grants the value one stack reference.
    pub fn push(&mut self, heap: &mut Heap, value: Slot) -> Result<(), String> {
        if self.stack.len() >= self.capacity {
            return Err(messages::STACK_OVERFLOW.to_string());
        }
        heap.add_ref(value);
        self.stack.push(value);
        Ok(())
    }

    /// Popping releases the stack reference; the value stays alive
    /// until the next sweep even if that was its last holder.
    pub fn pop(&mut self, heap: &mut Heap) -> Result<Slot, String> {
        let value = self
            .stack
            .pop()
            .ok_or_else(|| messages::STACK_UNDERFLOW.to_string())?;
        heap.remove_ref(value);
        Ok(value)
    }

    pub fn dyn_get(&self, name: &str) -> Option<Slot> {
        self.dynamics
            .iter()
            .flatten()
            .find(|var| var.name == name)
            .map(|var| var.value)
    }

    /// First write creates the variable, later writes overwrite it.
    /// The new value is referenced before the old one is released so a
    /// value stored back into itself is never collected in between.
    pub fn dyn_set(&mut self, heap: &mut Heap, name: &str, value: Slot) {
        heap.add_ref(value);
        for var in self.dynamics.iter_mut().flatten() {
            if var.name == name {
                heap.remove_ref(var.value);
                var.value = value;
                return;
            }
        }
        let var = DynVar {
            name: name.to_string(),
            value,
        };
        for cell in self.dynamics.iter_mut() {
            if cell.is_none() {
                *cell = Some(var);
                return;
            }
        }
        self.dynamics.push(Some(var));
    }

    /// Tombstones the variable and releases its reference. Removing an
    /// unknown name is not an error.
    pub fn dyn_remove(&mut self, heap: &mut Heap, name: &str) -> bool {
        for cell in self.dynamics.iter_mut() {
            if let Some(var) = cell {
                if var.name == name {
                    heap.remove_ref(var.value);
                    *cell = None;
                    return true;
                }
            }
        }
        false
    }

    /// Frame exit: releases every dynamic variable and anything left
    /// on the operand stack. The caller runs the final sweep.
    pub fn release_all(&mut self, heap: &mut Heap) {
        for var in self.dynamics.drain(..).flatten() {
            heap.remove_ref(var.value);
        }
        for value in self.stack.drain(..) {
            heap.remove_ref(value);
        }
        self.list_bases.clear();
    }
}

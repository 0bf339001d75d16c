//! The virtual machine: process-wide state shared by every frame.
//!
//! A machine owns the heap, the per-object simple variable tables, the
//! global table, and the buffered program output. Frames come and go
//! per call; everything here lives for the whole run.

use std::rc::Rc;

use crate::core::gc::Heap;
use crate::core::value::{FastHashMap, Slot, fast_map_new};
use crate::errors::Exception;
use crate::program::Image;

#[derive(Debug, Clone)]
pub struct MachineConfig {
    /// Operand stack slots per frame.
    pub stack_capacity: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            stack_capacity: 65536,
        }
    }
}

pub struct Machine {
    pub heap: Heap,
    pub image: Rc<Image>,
    /// One slot table per code object, indexed by the object's
    /// compile-time variable index. All slots start unset.
    pub(crate) simple_vars: Vec<Vec<Slot>>,
    pub(crate) globals: FastHashMap<String, Slot>,
    pub(crate) config: MachineConfig,
    output: String,
}

impl Machine {
    pub fn new(image: Image) -> Machine {
        Machine::with_config(image, MachineConfig::default())
    }

    pub fn with_config(image: Image, config: MachineConfig) -> Machine {
        let simple_vars = image
            .objects
            .iter()
            .map(|object| vec![None; object.var_names.len()])
            .collect();
        let mut machine = Machine {
            heap: Heap::new(),
            image: Rc::new(image),
            simple_vars,
            globals: fast_map_new(),
            config,
            output: String::new(),
        };
        crate::builtins::BuiltinRegistry::standard().install_into(&mut machine);
        machine
    }

    /// Runs the entry object to completion. The result (if any) arrives
    /// with one reference of its own, so it survives until released.
    pub fn run(&mut self) -> Result<Slot, Exception> {
        let entry = self.image.entry();
        self.call_object(entry, None)
    }

    /// Runs one code object in a fresh frame. `args` becomes the
    /// callee's argument list, exactly as a bytecode `Call` would
    /// pass it.
    pub fn call_object(&mut self, object: usize, args: Slot) -> Result<Slot, Exception> {
        crate::vm::run_object(self, object, args)
    }

    pub(crate) fn load_simple(&self, object: usize, index: usize) -> Result<Slot, String> {
        let vars = &self.simple_vars[object];
        let slot = vars
            .get(index)
            .ok_or_else(|| format!("Invalid simple variable index `{index}`"))?;
        if slot.is_none() {
            let name = &self.image.object(object).var_names[index];
            return Err(format!("Undefined variable `{name}`"));
        }
        Ok(*slot)
    }

    /// The new value is referenced before the old one is released so
    /// storing a variable back into itself never frees it in between.
    pub(crate) fn store_simple(
        &mut self,
        object: usize,
        index: usize,
        value: Slot,
    ) -> Result<(), String> {
        if index >= self.simple_vars[object].len() {
            return Err(format!("Invalid simple variable index `{index}`"));
        }
        self.heap.add_ref(value);
        let old = std::mem::replace(&mut self.simple_vars[object][index], value);
        self.heap.remove_ref(old);
        Ok(())
    }

    pub(crate) fn store_global(&mut self, name: &str, value: Slot) {
        self.heap.add_ref(value);
        if let Some(old) = self.globals.insert(name.to_string(), value) {
            self.heap.remove_ref(old);
        }
    }

    /// Looks up a global without touching reference counts.
    pub fn global(&self, name: &str) -> Option<Slot> {
        self.globals.get(name).copied()
    }

    pub fn truthy(&self, slot: Slot) -> bool {
        match slot {
            None => false,
            Some(id) => self.heap.get(id).is_truthy(),
        }
    }

    /// Program output is buffered here and written out once by the
    /// embedder when the run finishes.
    pub fn write_output(&mut self, text: &str) {
        self.output.push_str(text);
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

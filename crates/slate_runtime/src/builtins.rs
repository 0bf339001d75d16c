//! Native functions installed as globals before the entry object runs.

use std::io::BufRead;

use crate::core::value::{FunctionKind, HeapValue, Slot, format_value};
use crate::machine::Machine;

/// Signature of a native function. Arguments arrive as an unpacked
/// view of the call's argument list; the machine keeps the list alive
/// for the duration of the call. A returned error becomes a runtime
/// exception at the call site.
pub type NativeFn = fn(&mut Machine, &[Slot]) -> Result<Slot, String>;

pub struct BuiltinRegistry {
    entries: Vec<(&'static str, NativeFn)>,
}

impl BuiltinRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The standard set: `print`, `println`, `input`.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("print", builtin_print);
        registry.register("println", builtin_println);
        registry.register("input", builtin_input);
        registry
    }

    pub fn register(&mut self, name: &'static str, callback: NativeFn) {
        self.entries.push((name, callback));
    }

    /// Allocates each native as a Function value and binds it in the
    /// machine's global table, which holds the lasting reference.
    pub fn install_into(self, machine: &mut Machine) {
        for (name, callback) in self.entries {
            let id = machine
                .heap
                .alloc(HeapValue::Function(FunctionKind::Native(callback)));
            machine.store_global(name, Some(id));
        }
    }
}

fn render_args(machine: &Machine, args: &[Slot]) -> String {
    let mut text = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            text.push(' ');
        }
        text.push_str(&format_value(&machine.heap, *arg));
    }
    text
}

fn builtin_print(machine: &mut Machine, args: &[Slot]) -> Result<Slot, String> {
    let text = render_args(machine, args);
    machine.write_output(&text);
    Ok(None)
}

fn builtin_println(machine: &mut Machine, args: &[Slot]) -> Result<Slot, String> {
    let mut text = render_args(machine, args);
    text.push('\n');
    machine.write_output(&text);
    Ok(None)
}

/// Reads one line from stdin. An optional first argument is written to
/// the output buffer as a prompt.
fn builtin_input(machine: &mut Machine, args: &[Slot]) -> Result<Slot, String> {
    if !args.is_empty() {
        let prompt = render_args(machine, args);
        machine.write_output(&prompt);
    }
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| format!("input: {e}"))?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    let id = machine
        .heap
        .alloc(HeapValue::Str(line.into_bytes().into_boxed_slice()));
    Ok(Some(id))
}

//! Hand-assembled containers for interpreter tests.

#![allow(dead_code)]

use slate_runtime::{Image, Machine, Op, format_value};

/// Builds one code object: registers constants and simple variables,
/// emits instructions, and encodes the container body for it.
pub struct ObjectBuilder {
    full_name: String,
    constants: Vec<Vec<u8>>,
    var_names: Vec<String>,
    code: Vec<u8>,
}

impl ObjectBuilder {
    pub fn new(full_name: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            constants: Vec::new(),
            var_names: Vec::new(),
            code: Vec::new(),
        }
    }

    /// Registers a constant-pool blob, returning its index.
    pub fn constant(&mut self, data: &[u8]) -> u32 {
        self.constants.push(data.to_vec());
        (self.constants.len() - 1) as u32
    }

    /// Registers a simple variable, returning its index.
    pub fn var(&mut self, name: &str) -> u32 {
        self.var_names.push(name.to_string());
        (self.var_names.len() - 1) as u32
    }

    pub fn op(&mut self, op: Op) -> &mut Self {
        self.code.push(op as u8);
        self
    }

    pub fn byte(&mut self, v: u8) -> &mut Self {
        self.code.push(v);
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.code.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.code.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i16(&mut self, v: i16) -> &mut Self {
        self.code.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.code.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.code.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// NUL-terminated name operand.
    pub fn ident(&mut self, name: &str) -> &mut Self {
        self.code.extend_from_slice(name.as_bytes());
        self.code.push(0);
        self
    }

    pub fn push_i32(&mut self, v: i32) -> &mut Self {
        self.op(Op::PushI32).i32(v)
    }

    pub fn push_i64(&mut self, v: i64) -> &mut Self {
        self.op(Op::PushI64).i64(v)
    }

    /// Current code offset; the target of a not-yet-emitted label.
    pub fn pos(&self) -> usize {
        self.code.len()
    }

    /// Backpatches a previously emitted u64 jump operand.
    pub fn patch_u64(&mut self, at: usize, v: u64) {
        self.code[at..at + 8].copy_from_slice(&v.to_le_bytes());
    }

    fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(self.full_name.as_bytes());
        body.push(0);
        body.push(0); // reserved
        body.extend_from_slice(&(self.constants.len() as u32).to_le_bytes());
        for c in &self.constants {
            body.extend_from_slice(&(c.len() as u32).to_le_bytes());
            body.extend_from_slice(c);
        }
        body.extend_from_slice(&(self.var_names.len() as u32).to_le_bytes());
        for v in &self.var_names {
            body.extend_from_slice(v.as_bytes());
            body.push(0);
        }
        body.extend_from_slice(&self.code);
        body
    }
}

pub fn build_image(objects: &[ObjectBuilder]) -> Image {
    let mut container = Vec::new();
    container.extend_from_slice(&(objects.len() as u32).to_le_bytes());
    for object in objects {
        let body = object.encode();
        container.extend_from_slice(&(body.len() as u64).to_le_bytes());
        container.extend_from_slice(&body);
    }
    Image::load(&container).expect("well-formed test container")
}

pub fn machine(objects: &[ObjectBuilder]) -> Machine {
    Machine::new(build_image(objects))
}

/// Renders a global for assertions.
pub fn global_text(m: &Machine, name: &str) -> String {
    let slot = m.global(name).unwrap_or_else(|| panic!("global `{name}` not set"));
    format_value(&m.heap, slot)
}

/// Number of values installed before user code runs (the builtins).
pub const BASELINE_LIVE: usize = 3;

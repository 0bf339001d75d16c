//! Code objects and the bytecode container loader.
//!
//! Container layout (little-endian throughout): a `u32` object count,
//! then per object a `u64` total length covering a NUL-terminated
//! fully-qualified name and the object content. The first content byte
//! is reserved; the rest is the object payload: a `u32`-counted
//! constant pool of length-prefixed blobs, a `u32`-counted table of
//! NUL-terminated simple-variable names, and the instruction stream.

use indexmap::IndexMap;

use crate::errors::{LoadError, LoadResult};

/// The tag that marks the entry-point object.
pub const ENTRY_TAG: &str = "main";

/// A parsed fully-qualified object name: `[type;]name[/tag]*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    /// The raw name as written in the container; resolution key.
    pub full: String,
    /// Optional type prefix before `;`.
    pub kind: Option<String>,
    /// Short name, up to the first `/`.
    pub name: String,
    /// `/`-delimited trailing tags.
    pub tags: Vec<String>,
}

impl QualifiedName {
    pub fn parse(raw: &str) -> Self {
        let (kind, rest) = match raw.split_once(';') {
            Some((kind, rest)) => (Some(kind.to_string()), rest),
            None => (None, raw),
        };
        let mut parts = rest.split('/');
        let name = parts.next().unwrap_or_default().to_string();
        let tags = parts.map(str::to_string).collect();
        Self {
            full: raw.to_string(),
            kind,
            name,
            tags,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// One loaded unit of bytecode with its own constant pool and
/// simple-variable name table.
#[derive(Debug)]
pub struct CodeObject {
    pub name: QualifiedName,
    pub constants: Vec<Box<[u8]>>,
    pub var_names: Vec<String>,
    pub code: Box<[u8]>,
}

/// The immutable set of code objects loaded from one container.
#[derive(Debug)]
pub struct Image {
    pub objects: Vec<CodeObject>,
    by_name: IndexMap<String, usize>,
    entry: usize,
}

impl Image {
    /// Parses a whole container. Every read is bounds-checked; a
    /// malformed container is a typed error, never a panic or abort.
    pub fn load(bytes: &[u8]) -> LoadResult<Image> {
        let mut reader = Reader::new(bytes);
        let count = reader.read_u32()? as usize;
        let mut objects = Vec::new();
        let mut by_name = IndexMap::new();
        for index in 0..count {
            let length = reader.read_u64()?;
            if length as usize > reader.remaining() {
                return Err(LoadError::ObjectTooLong {
                    object: index,
                    length,
                });
            }
            let body = reader.take(length as usize)?;
            let object = parse_object(body, index)?;
            if by_name.insert(object.name.full.clone(), index).is_some() {
                return Err(LoadError::DuplicateObject(object.name.full));
            }
            objects.push(object);
        }

        let mut entry = None;
        for (index, object) in objects.iter().enumerate() {
            if !object.name.has_tag(ENTRY_TAG) {
                continue;
            }
            if let Some(previous) = entry {
                let previous: &CodeObject = &objects[previous];
                return Err(LoadError::AmbiguousEntryObject(
                    previous.name.full.clone(),
                    object.name.full.clone(),
                ));
            }
            entry = Some(index);
        }
        let entry = entry.ok_or(LoadError::NoEntryObject)?;

        Ok(Image {
            objects,
            by_name,
            entry,
        })
    }

    /// Index of the object tagged `main`.
    pub fn entry(&self) -> usize {
        self.entry
    }

    pub fn object(&self, index: usize) -> &CodeObject {
        &self.objects[index]
    }

    /// Resolves an object by exact fully-qualified name.
    pub fn resolve(&self, full_name: &str) -> Option<usize> {
        self.by_name.get(full_name).copied()
    }
}

fn parse_object(body: &[u8], index: usize) -> LoadResult<CodeObject> {
    let mut reader = Reader::new(body);
    let raw_name = reader
        .read_cstr()
        .map_err(|_| LoadError::BadObjectName { object: index })?;
    let name = QualifiedName::parse(raw_name);

    // Reserved byte between the name and the payload.
    reader.read_u8()?;

    let constant_count = reader.read_u32()? as usize;
    let mut constants = Vec::new();
    for ci in 0..constant_count {
        let size = reader.read_u32()? as usize;
        let data = reader.take(size).map_err(|_| LoadError::ConstantTooLong {
            object: index,
            index: ci,
        })?;
        constants.push(data.to_vec().into_boxed_slice());
    }

    let var_count = reader.read_u32()? as usize;
    let mut var_names = Vec::new();
    for _ in 0..var_count {
        let var = reader
            .read_cstr()
            .map_err(|_| LoadError::BadVariableName { object: index })?;
        var_names.push(var.to_string());
    }

    let code = reader.rest().to_vec().into_boxed_slice();
    Ok(CodeObject {
        name,
        constants,
        var_names,
        code,
    })
}

/// Bounds-checked little-endian cursor over the container bytes.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> LoadResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(LoadError::Truncated);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        slice
    }

    fn read_u8(&mut self) -> LoadResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> LoadResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4 bytes")))
    }

    fn read_u64(&mut self) -> LoadResult<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8 bytes")))
    }

    fn read_cstr(&mut self) -> LoadResult<&'a str> {
        let start = self.pos;
        let nul = self.bytes[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(LoadError::Truncated)?;
        let slice = &self.bytes[start..start + nul];
        self.pos = start + nul + 1;
        std::str::from_utf8(slice).map_err(|_| LoadError::Truncated)
    }
}

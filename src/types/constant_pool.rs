//! Class-file constant pools.
//!
//! Pools are 1-based: index 0 is reserved and never resolves, matching the
//! class-file format. Synthesized methods build their own small pools through
//! [`ConstantPool::push`].

use crate::vm::VmError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoolEntry {
    Utf8(String),
    Class { name_index: u16 },
    String { string_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
}

impl PoolEntry {
    fn tag_name(&self) -> &'static str {
        match self {
            PoolEntry::Utf8(_) => "Utf8",
            PoolEntry::Class { .. } => "Class",
            PoolEntry::String { .. } => "String",
            PoolEntry::MethodRef { .. } => "Methodref",
            PoolEntry::NameAndType { .. } => "NameAndType",
        }
    }
}

/// A fully resolved `Methodref` entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodRefParts<'a> {
    pub class_name: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConstantPool {
    // entries[0] holds pool index 1
    entries: Vec<PoolEntry>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and returns its 1-based pool index.
    pub fn push(&mut self, entry: PoolEntry) -> u16 {
        self.entries.push(entry);
        self.entries.len() as u16
    }

    /// Number of usable entries (the reserved index 0 not included).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: u16) -> Result<&PoolEntry, VmError> {
        if index == 0 {
            return Err(VmError::BadConstantPool("index 0 is reserved".to_owned()));
        }
        self.entries
            .get(index as usize - 1)
            .ok_or_else(|| VmError::BadConstantPool(format!("index {} out of range", index)))
    }

    pub fn utf8(&self, index: u16) -> Result<&str, VmError> {
        match self.entry(index)? {
            PoolEntry::Utf8(text) => Ok(text),
            other => Err(self.wrong_tag(index, "Utf8", other)),
        }
    }

    /// Resolves a `Class` entry to the class's internal name.
    pub fn class_name(&self, index: u16) -> Result<&str, VmError> {
        match self.entry(index)? {
            PoolEntry::Class { name_index } => self.utf8(*name_index),
            other => Err(self.wrong_tag(index, "Class", other)),
        }
    }

    /// Resolves a `String` entry to its text.
    pub fn string_text(&self, index: u16) -> Result<&str, VmError> {
        match self.entry(index)? {
            PoolEntry::String { string_index } => self.utf8(*string_index),
            other => Err(self.wrong_tag(index, "String", other)),
        }
    }

    /// Resolves a `Methodref` entry down to class name, method name, and
    /// descriptor text.
    pub fn method_ref(&self, index: u16) -> Result<MethodRefParts<'_>, VmError> {
        match self.entry(index)? {
            PoolEntry::MethodRef {
                class_index,
                name_and_type_index,
            } => {
                let class_name = self.class_name(*class_index)?;
                match self.entry(*name_and_type_index)? {
                    PoolEntry::NameAndType {
                        name_index,
                        descriptor_index,
                    } => Ok(MethodRefParts {
                        class_name,
                        name: self.utf8(*name_index)?,
                        descriptor: self.utf8(*descriptor_index)?,
                    }),
                    other => Err(self.wrong_tag(*name_and_type_index, "NameAndType", other)),
                }
            }
            other => Err(self.wrong_tag(index, "Methodref", other)),
        }
    }

    fn wrong_tag(&self, index: u16, expected: &str, found: &PoolEntry) -> VmError {
        VmError::BadConstantPool(format!(
            "index {} holds {}, expected {}",
            index,
            found.tag_name(),
            expected
        ))
    }
}

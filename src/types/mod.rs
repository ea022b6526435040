use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use crate::types::constant_pool::ConstantPool;
use crate::value::Value;
use crate::vm::VmError;

pub mod constant_pool;
pub mod descriptor;
pub mod opcodes;

/// A loaded class.
///
/// Superclasses are resolved eagerly at definition time, so walking the
/// ancestor chain never touches the registry again. Static state lives here
/// rather than on a separate statics table: `initialized` flips before the
/// `<clinit>` body runs so that self-referential initializers terminate, and
/// `statics` stays `None` until first touched.
pub struct ClassInfo {
    pub name: String,
    pub super_class: Option<Rc<ClassInfo>>,
    pub methods: Vec<Rc<MethodInfo>>,
    pub pool: Rc<ConstantPool>,
    pub initialized: Cell<bool>,
    statics: RefCell<Option<HashMap<String, Value>>>,
}

impl Debug for ClassInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "class {}", self.name)
    }
}

impl ClassInfo {
    pub fn new(
        name: String,
        super_class: Option<Rc<ClassInfo>>,
        methods: Vec<Rc<MethodInfo>>,
        pool: Rc<ConstantPool>,
    ) -> Self {
        Self {
            name,
            super_class,
            methods,
            pool,
            initialized: Cell::new(false),
            statics: RefCell::new(None),
        }
    }

    /// Looks up a method by name and descriptor, walking the superclass chain.
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<Rc<MethodInfo>> {
        let local = self
            .methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor);
        match local {
            Some(m) => Some(Rc::clone(m)),
            None => self
                .super_class
                .as_ref()
                .and_then(|s| s.find_method(name, descriptor)),
        }
    }

    pub fn static_initializer(&self) -> Option<Rc<MethodInfo>> {
        self.methods
            .iter()
            .find(|m| m.is_static && m.name == "<clinit>" && m.descriptor == "()V")
            .map(Rc::clone)
    }

    /// Materializes the empty statics table. Runs once; later calls keep the
    /// existing table.
    pub fn init_statics(&self) {
        self.statics.borrow_mut().get_or_insert_with(HashMap::new);
    }

    pub fn statics_ready(&self) -> bool {
        self.statics.borrow().is_some()
    }

    /// Stores a static field, creating the statics table on first write.
    pub fn put_static(&self, field: &str, value: Value) {
        self.statics
            .borrow_mut()
            .get_or_insert_with(HashMap::new)
            .insert(field.to_owned(), value);
    }

    pub fn static_value(&self, field: &str) -> Result<Value, VmError> {
        self.statics
            .borrow()
            .as_ref()
            .and_then(|map| map.get(field).cloned())
            .ok_or_else(|| VmError::StaticsNotReady(format!("{}.{}", self.name, field)))
    }
}

/// A method body plus the metadata the execution core needs.
///
/// `class_name` is denormalized from the owning class so frames and traces can
/// name their method without holding the class alive.
pub struct MethodInfo {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
    pub is_static: bool,
    pub max_locals: usize,
    pub code: Vec<u8>,
    pub pool: Rc<ConstantPool>,
}

impl Debug for MethodInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.class_name, self.name, self.descriptor)
    }
}

impl MethodInfo {
    pub fn is_clinit(&self) -> bool {
        self.is_static && self.name == "<clinit>" && self.descriptor == "()V"
    }

    /// Slots a call to this method consumes from the caller's operand stack:
    /// the declared parameters at their slot widths, plus the receiver for
    /// instance methods.
    pub fn argument_slots(&self) -> Result<usize, VmError> {
        let descriptor = descriptor::MethodDescriptor::parse(&self.descriptor)?;
        let receiver = if self.is_static { 0 } else { 1 };
        Ok(receiver + descriptor.argument_slots())
    }
}

/// Raw input to [`ClassRegistry::define`](crate::resolve::ClassRegistry::define).
pub struct ClassDef {
    pub name: String,
    pub super_name: Option<String>,
    pub methods: Vec<MethodDef>,
    pub pool: ConstantPool,
}

pub struct MethodDef {
    pub name: String,
    pub descriptor: String,
    pub is_static: bool,
    pub max_locals: usize,
    pub code: Vec<u8>,
}

use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::types::ClassInfo;
use crate::value::Value;

/// Allocation serial, unique per VM instance.
///
/// Monitors key on this rather than on the `Rc` pointer so that an object
/// freed and another allocated at the same address can never alias a lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// A reference to a heap object. Cloning shares the same object.
#[derive(Clone)]
pub struct ObjRef(Rc<HeapObject>);

pub struct HeapObject {
    id: ObjectId,
    kind: HeapKind,
}

pub enum HeapKind {
    Instance {
        class: Rc<ClassInfo>,
        // keyed by qualified field name, "java/lang/String$count"
        fields: RefCell<std::collections::HashMap<String, Value>>,
    },
    Array {
        kind: ArrayKind,
        data: RefCell<ArrayData>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArrayKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl ArrayKind {
    /// The array class name in descriptor form.
    pub fn descriptor(&self) -> &'static str {
        match self {
            ArrayKind::Boolean => "[Z",
            ArrayKind::Byte => "[B",
            ArrayKind::Char => "[C",
            ArrayKind::Short => "[S",
            ArrayKind::Int => "[I",
            ArrayKind::Long => "[J",
            ArrayKind::Float => "[F",
            ArrayKind::Double => "[D",
        }
    }
}

pub enum ArrayData {
    // booleans are stored as bytes
    Bytes(Vec<i8>),
    Chars(Vec<u16>),
    Shorts(Vec<i16>),
    Ints(Vec<i32>),
    Longs(Vec<i64>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
}

impl ArrayData {
    fn with_length(kind: ArrayKind, length: usize) -> Self {
        match kind {
            ArrayKind::Boolean | ArrayKind::Byte => ArrayData::Bytes(vec![0; length]),
            ArrayKind::Char => ArrayData::Chars(vec![0; length]),
            ArrayKind::Short => ArrayData::Shorts(vec![0; length]),
            ArrayKind::Int => ArrayData::Ints(vec![0; length]),
            ArrayKind::Long => ArrayData::Longs(vec![0; length]),
            ArrayKind::Float => ArrayData::Floats(vec![0.0; length]),
            ArrayKind::Double => ArrayData::Doubles(vec![0.0; length]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::Bytes(v) => v.len(),
            ArrayData::Chars(v) => v.len(),
            ArrayData::Shorts(v) => v.len(),
            ArrayData::Ints(v) => v.len(),
            ArrayData::Longs(v) => v.len(),
            ArrayData::Floats(v) => v.len(),
            ArrayData::Doubles(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjRef {
    pub fn new_instance(id: ObjectId, class: Rc<ClassInfo>) -> Self {
        Self(Rc::new(HeapObject {
            id,
            kind: HeapKind::Instance {
                class,
                fields: RefCell::new(std::collections::HashMap::new()),
            },
        }))
    }

    pub fn new_array(id: ObjectId, kind: ArrayKind, length: usize) -> Self {
        Self(Rc::new(HeapObject {
            id,
            kind: HeapKind::Array {
                kind,
                data: RefCell::new(ArrayData::with_length(kind, length)),
            },
        }))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    /// Class name for display: the defining class for instances, the
    /// descriptor form for arrays.
    pub fn class_name(&self) -> String {
        match &self.0.kind {
            HeapKind::Instance { class, .. } => class.name.clone(),
            HeapKind::Array { kind, .. } => kind.descriptor().to_owned(),
        }
    }

    pub fn class(&self) -> Option<Rc<ClassInfo>> {
        match &self.0.kind {
            HeapKind::Instance { class, .. } => Some(Rc::clone(class)),
            HeapKind::Array { .. } => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        match &self.0.kind {
            HeapKind::Instance { fields, .. } => fields.borrow().get(name).cloned(),
            HeapKind::Array { .. } => None,
        }
    }

    pub fn set_field(&self, name: &str, value: Value) {
        if let HeapKind::Instance { fields, .. } = &self.0.kind {
            fields.borrow_mut().insert(name.to_owned(), value);
        }
    }

    pub fn array_length(&self) -> Option<usize> {
        match &self.0.kind {
            HeapKind::Array { data, .. } => Some(data.borrow().len()),
            HeapKind::Instance { .. } => None,
        }
    }

    pub fn char_at(&self, index: usize) -> Option<u16> {
        match &self.0.kind {
            HeapKind::Array { data, .. } => match &*data.borrow() {
                ArrayData::Chars(chars) => chars.get(index).copied(),
                _ => None,
            },
            HeapKind::Instance { .. } => None,
        }
    }

    pub fn set_chars(&self, text: &str) {
        if let HeapKind::Array { data, .. } = &self.0.kind {
            if let ArrayData::Chars(chars) = &mut *data.borrow_mut() {
                chars.clear();
                chars.extend(text.encode_utf16());
            }
        }
    }
}

impl PartialEq for ObjRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for ObjRef {}

impl Hash for ObjRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl Debug for ObjRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}@{}>", self.class_name(), self.0.id.0)
    }
}

use crate::value::object::ObjRef;

pub mod object;
pub mod string;

/// A single operand-stack or local-variable slot.
///
/// Longs and doubles occupy two slots on the stack and in locals; the value
/// lives in the first slot and the second is padding. `Uninit` marks slots
/// that have never been written, which is distinct from `Null`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    Object(ObjRef),
    Uninit,
}

impl Value {
    /// True for values that occupy two slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }
}

//! The string object layout.
//!
//! Strings are regular instances of `java/lang/String` backed by a char array
//! plus an offset and count, stored under qualified field names. Trace and
//! backtrace output read strings back through [`from_java_string`].

use crate::value::object::ObjRef;
use crate::value::Value;

pub const STRING_CLASS: &str = "java/lang/String";
pub const VALUE_FIELD: &str = "java/lang/String$value";
pub const OFFSET_FIELD: &str = "java/lang/String$offset";
pub const COUNT_FIELD: &str = "java/lang/String$count";

/// Reads the text out of a string instance.
///
/// Returns `None` when the object is not string-shaped: wrong fields, a
/// non-char-array value, or a window that falls outside the backing array.
/// Unpaired surrogates decode to the replacement character.
pub fn from_java_string(obj: &ObjRef) -> Option<String> {
    let value = match obj.field(VALUE_FIELD)? {
        Value::Object(chars) => chars,
        _ => return None,
    };
    let offset = match obj.field(OFFSET_FIELD)? {
        Value::Int(n) if n >= 0 => n as usize,
        _ => return None,
    };
    let count = match obj.field(COUNT_FIELD)? {
        Value::Int(n) if n >= 0 => n as usize,
        _ => return None,
    };

    let length = value.array_length()?;
    let end = offset.checked_add(count)?;
    if end > length {
        return None;
    }

    let mut units = Vec::with_capacity(count);
    for i in offset..end {
        units.push(value.char_at(i)?);
    }
    Some(String::from_utf16_lossy(&units))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::constant_pool::ConstantPool;
    use crate::types::ClassInfo;
    use crate::value::object::{ArrayKind, ObjectId};
    use std::rc::Rc;

    fn string_object(text: &str) -> ObjRef {
        let class = Rc::new(ClassInfo::new(
            STRING_CLASS.to_owned(),
            None,
            vec![],
            Rc::new(ConstantPool::new()),
        ));
        let chars = ObjRef::new_array(ObjectId(1), ArrayKind::Char, 0);
        chars.set_chars(text);
        let count = text.encode_utf16().count() as i32;
        let obj = ObjRef::new_instance(ObjectId(2), class);
        obj.set_field(VALUE_FIELD, Value::Object(chars));
        obj.set_field(OFFSET_FIELD, Value::Int(0));
        obj.set_field(COUNT_FIELD, Value::Int(count));
        obj
    }

    #[test]
    fn test_round_trips_text() {
        let obj = string_object("hello");
        assert_eq!(from_java_string(&obj).as_deref(), Some("hello"));
    }

    #[test]
    fn test_respects_offset_window() {
        let obj = string_object("hello");
        obj.set_field(OFFSET_FIELD, Value::Int(1));
        obj.set_field(COUNT_FIELD, Value::Int(3));
        assert_eq!(from_java_string(&obj).as_deref(), Some("ell"));
    }

    #[test]
    fn test_rejects_out_of_range_window() {
        let obj = string_object("hi");
        obj.set_field(COUNT_FIELD, Value::Int(5));
        assert_eq!(from_java_string(&obj), None);
    }

    #[test]
    fn test_rejects_non_string_shape() {
        let class = Rc::new(ClassInfo::new(
            "java/lang/Object".to_owned(),
            None,
            vec![],
            Rc::new(ConstantPool::new()),
        ));
        let obj = ObjRef::new_instance(ObjectId(1), class);
        assert_eq!(from_java_string(&obj), None);
    }
}

//! Synthesis of throw helpers.
//!
//! Raising an exception from native code does not manipulate the guest stack
//! directly. Instead a small method is generated that allocates the exception,
//! constructs it with its message, and throws it, and a frame for that method
//! is pushed onto the raising thread. The interpreter then handles the throw
//! exactly as if guest code had executed `athrow`.

use byteorder::{BigEndian, ByteOrder};

use crate::types::constant_pool::{ConstantPool, PoolEntry};
use crate::types::opcodes;
use crate::types::MethodInfo;
use std::rc::Rc;

/// Builds the throw helper for `class_name` carrying `message`.
///
/// The body is always the same five instructions:
///
/// ```text
/// new            #1   // the exception class
/// dup
/// ldc            #3   // the message string
/// invokespecial  #5   // <init>(Ljava/lang/String;)V
/// athrow
/// ```
///
/// ten bytes total, over a pool built fresh for this one call.
pub fn synthesize_athrow_method(class_name: &str, message: &str) -> MethodInfo {
    let mut pool = ConstantPool::new();
    let class_idx = pool.push(PoolEntry::Class { name_index: 2 });
    pool.push(PoolEntry::Utf8(class_name.to_owned()));
    let string_idx = pool.push(PoolEntry::String { string_index: 4 });
    pool.push(PoolEntry::Utf8(message.to_owned()));
    let method_idx = pool.push(PoolEntry::MethodRef {
        class_index: class_idx,
        name_and_type_index: 6,
    });
    pool.push(PoolEntry::NameAndType {
        name_index: 7,
        descriptor_index: 8,
    });
    pool.push(PoolEntry::Utf8("<init>".to_owned()));
    pool.push(PoolEntry::Utf8("(Ljava/lang/String;)V".to_owned()));

    let mut code = Vec::with_capacity(10);
    code.push(opcodes::NEW);
    emit_u16(&mut code, class_idx);
    code.push(opcodes::DUP);
    code.push(opcodes::LDC);
    // the pool has eight fixed entries, so the index always fits one byte
    code.push(string_idx as u8);
    code.push(opcodes::INVOKESPECIAL);
    emit_u16(&mut code, method_idx);
    code.push(opcodes::ATHROW);

    MethodInfo {
        class_name: class_name.to_owned(),
        name: "<athrow>".to_owned(),
        descriptor: "()V".to_owned(),
        is_static: true,
        max_locals: 0,
        code,
        pool: Rc::new(pool),
    }
}

fn emit_u16(code: &mut Vec<u8>, value: u16) {
    let mut bytes = [0u8; 2];
    BigEndian::write_u16(&mut bytes, value);
    code.extend_from_slice(&bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_is_exactly_ten_bytes() {
        let method = synthesize_athrow_method("java/lang/Error", "boom");
        assert_eq!(
            method.code,
            vec![
                opcodes::NEW, 0x00, 0x01,
                opcodes::DUP,
                opcodes::LDC, 0x03,
                opcodes::INVOKESPECIAL, 0x00, 0x05,
                opcodes::ATHROW,
            ]
        );
    }

    #[test]
    fn test_pool_resolves_operands() {
        let method = synthesize_athrow_method("java/lang/RuntimeException", "bad state");
        assert_eq!(method.pool.class_name(1).unwrap(), "java/lang/RuntimeException");
        assert_eq!(method.pool.string_text(3).unwrap(), "bad state");

        let ctor = method.pool.method_ref(5).unwrap();
        assert_eq!(ctor.class_name, "java/lang/RuntimeException");
        assert_eq!(ctor.name, "<init>");
        assert_eq!(ctor.descriptor, "(Ljava/lang/String;)V");
    }

    #[test]
    fn test_method_shape() {
        let method = synthesize_athrow_method("java/lang/Error", "boom");
        assert_eq!(method.name, "<athrow>");
        assert_eq!(method.descriptor, "()V");
        assert!(method.is_static);
        assert_eq!(method.max_locals, 0);
        assert_eq!(method.class_name, "java/lang/Error");
    }

    #[test]
    fn test_empty_message() {
        let method = synthesize_athrow_method("java/lang/Error", "");
        assert_eq!(method.code.len(), 10);
        assert_eq!(method.pool.string_text(3).unwrap(), "");
    }
}

//! JVM field and method descriptor parsing.
//!
//! Descriptors use the internal grammar: base types `B C D F I J S Z`,
//! object types `Ljava/lang/String;`, array types `[` followed by any field
//! type, and method descriptors `(params...)return` where the return is a
//! field type or `V`.

use std::iter::Peekable;
use std::str::Chars;

use crate::vm::VmError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Number of consecutive operand/local slots a value of this type occupies.
    pub fn slot_width(&self) -> usize {
        match self {
            FieldType::Long | FieldType::Double => 2,
            _ => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReturnType {
    Void,
    Field(FieldType),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    pub ret: ReturnType,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self, VmError> {
        let bad = || VmError::BadDescriptor(descriptor.to_owned());

        let mut chars = descriptor.chars().peekable();
        if chars.next() != Some('(') {
            return Err(bad());
        }

        let mut params = Vec::new();
        loop {
            match chars.peek() {
                Some(')') => {
                    chars.next();
                    break;
                }
                Some(_) => params.push(parse_field_type(&mut chars).ok_or_else(bad)?),
                None => return Err(bad()),
            }
        }

        let ret = match chars.peek() {
            Some('V') => {
                chars.next();
                ReturnType::Void
            }
            Some(_) => ReturnType::Field(parse_field_type(&mut chars).ok_or_else(bad)?),
            None => return Err(bad()),
        };

        if chars.next().is_some() {
            return Err(bad());
        }

        Ok(Self { params, ret })
    }

    /// Total operand slots consumed by the parameters (longs and doubles
    /// count double).
    pub fn argument_slots(&self) -> usize {
        self.params.iter().map(FieldType::slot_width).sum()
    }
}

fn parse_field_type(chars: &mut Peekable<Chars>) -> Option<FieldType> {
    Some(match chars.next()? {
        'B' => FieldType::Byte,
        'C' => FieldType::Char,
        'D' => FieldType::Double,
        'F' => FieldType::Float,
        'I' => FieldType::Int,
        'J' => FieldType::Long,
        'S' => FieldType::Short,
        'Z' => FieldType::Boolean,
        'L' => {
            let mut name = String::new();
            loop {
                match chars.next()? {
                    ';' => break,
                    c => name.push(c),
                }
            }
            if name.is_empty() {
                return None;
            }
            FieldType::Object(name)
        }
        '[' => FieldType::Array(Box::new(parse_field_type(chars)?)),
        _ => return None,
    })
}

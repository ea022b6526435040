//! Opcode byte values for the instructions this runtime emits or names.
//!
//! Only the opcodes that appear in synthesized method bodies (and their
//! trace output) are listed; the dispatch loop that would consume the full
//! instruction set lives outside this crate.

pub const LDC: u8 = 0x12;
pub const DUP: u8 = 0x59;
pub const RETURN: u8 = 0xb1;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const NEW: u8 = 0xbb;
pub const ATHROW: u8 = 0xbf;
pub const MONITORENTER: u8 = 0xc2;
pub const MONITOREXIT: u8 = 0xc3;

pub fn mnemonic(opcode: u8) -> &'static str {
    match opcode {
        LDC => "ldc",
        DUP => "dup",
        RETURN => "return",
        INVOKESPECIAL => "invokespecial",
        NEW => "new",
        ATHROW => "athrow",
        MONITORENTER => "monitorenter",
        MONITOREXIT => "monitorexit",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mnemonic_lookup() {
        assert_eq!(mnemonic(NEW), "new");
        assert_eq!(mnemonic(ATHROW), "athrow");
        assert_eq!(mnemonic(0x00), "unknown");
    }
}

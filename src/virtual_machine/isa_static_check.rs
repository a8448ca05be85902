//! Fingerprint of the opcode table.
//!
//! Persisted modules store raw instruction words, so renumbering an opcode,
//! changing a layout or moving an operand to another bit field breaks every
//! existing binary. Any such edit must update `EXPECTED_ISA_HASH` here.

#[cfg(test)]
mod tests {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    const EXPECTED_ISA_HASH: u64 = 12391407468374101947;

    fn fnv1a64(mut h: u64, bytes: &[u8]) -> u64 {
        for b in bytes {
            h ^= *b as u64;
            h = h.wrapping_mul(FNV_PRIME);
        }
        h
    }

    macro_rules! hash_isa {
        (
            $(
                $(#[$doc:meta])*
                $name:ident = $opcode:literal, $mnemonic:literal, $layout:ident => [
                    $( $field:ident : $kind:ident @ $slot:ident ),* $(,)?
                ]
            ),* $(,)?
        ) => {{
            let mut h = FNV_OFFSET;
            $(
                h = fnv1a64(h, stringify!($name).as_bytes());
                h = fnv1a64(h, &[crate::virtual_machine::isa::Opcode::$name as u8]);
                h = fnv1a64(h, $mnemonic.as_bytes());
                h = fnv1a64(h, stringify!($layout).as_bytes());
                $(
                    h = fnv1a64(h, stringify!($kind).as_bytes());
                    h = fnv1a64(h, stringify!($slot).as_bytes());
                )*
            )*
            h
        }};
    }

    fn current_isa_hash() -> u64 {
        crate::for_each_instruction!(hash_isa)
    }

    #[test]
    #[ignore]
    fn print_isa_hash() {
        println!("ISA_HASH={}", current_isa_hash());
    }

    #[test]
    fn isa_hash_unchanged() {
        assert_eq!(current_isa_hash(), EXPECTED_ISA_HASH);
    }

    #[test]
    fn opcode_count_unchanged() {
        assert_eq!(crate::virtual_machine::isa::Opcode::ALL.len(), 86);
    }
}

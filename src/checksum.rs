use crc32fast::Hasher;

// Make the checksum api read like a hasher: new, update, finalize. The
// algorithm is CRC-32/ISO-3309 (the zlib polynomial, seed 0), which is
// what every chunk on the wire carries.
pub struct Checksum(Hasher);

impl Checksum {
    pub fn new() -> Checksum {
        Checksum(Hasher::new())
    }

    pub fn with_seed(seed: u32) -> Checksum {
        Checksum(Hasher::new_with_initial(seed))
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finalize(self) -> u32 {
        self.0.finalize()
    }
}

/// One-shot chainable form: `crc32(crc32(0, a), b)` equals the checksum
/// of `a` followed by `b`.
pub fn crc32(seed: u32, data: &[u8]) -> u32 {
    let mut hash = Checksum::with_seed(seed);
    hash.update(data);
    hash.finalize()
}

#[cfg(test)]
mod test_checksum {
    use super::*;

    #[test]
    fn known_value() {
        // Reference value for the ISO-3309 variant
        assert_eq!(crc32(0, b"hello"), 0x3610A686);
    }

    #[test]
    fn empty_input_keeps_seed() {
        assert_eq!(crc32(0, b""), 0);
    }

    #[test]
    fn chaining_matches_one_shot() {
        let split = crc32(crc32(0, b"sparse map bytes"), b"payload bytes");
        let whole = crc32(0, b"sparse map bytespayload bytes");
        assert_eq!(split, whole);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut hash = Checksum::new();
        hash.update(b"he");
        hash.update(b"llo");
        assert_eq!(hash.finalize(), crc32(0, b"hello"));
    }
}

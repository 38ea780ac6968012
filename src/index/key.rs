use std::fmt::Debug;

use byteorder::{ByteOrder, LittleEndian};

/// An orderable key with a fixed-width binary encoding. Node capacities are
/// computed from `ENCODED_SIZE`, so the encoding of every key of a type must
/// occupy exactly that many bytes.
pub trait IndexKey: Ord + Clone + Debug + Send + Sync + 'static {
    const ENCODED_SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

impl IndexKey for i32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i32(buf)
    }
}

impl IndexKey for u32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_u32(buf)
    }
}

impl IndexKey for i64 {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_i64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_i64(buf)
    }
}

impl IndexKey for u64 {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        LittleEndian::write_u64(buf, *self);
    }

    fn decode(buf: &[u8]) -> Self {
        LittleEndian::read_u64(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i64_roundtrip() {
        let mut buf = [0u8; 8];
        (-42i64).encode(&mut buf);
        assert_eq!(i64::decode(&buf), -42);
    }

    #[test]
    fn test_i32_roundtrip() {
        let mut buf = [0u8; 4];
        7i32.encode(&mut buf);
        assert_eq!(i32::decode(&buf), 7);
    }
}

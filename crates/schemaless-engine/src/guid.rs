use std::fmt;

use rand::RngCore;

use crate::error::EngineError;

pub const GUID_SIZE: usize = 16;

/// A 16-byte entity identifier. Raw on disk, 32 lowercase hex chars on the
/// wire. `Guid` always holds the raw form; conversion happens at the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Guid([u8; GUID_SIZE]);

impl Guid {
    /// Generate a new id from the OS's random source.
    pub fn new() -> Self {
        let mut buf = [0u8; GUID_SIZE];
        rand::thread_rng().fill_bytes(&mut buf);
        Guid(buf)
    }

    pub fn from_raw(bytes: [u8; GUID_SIZE]) -> Self {
        Guid(bytes)
    }

    pub fn as_raw(&self) -> &[u8; GUID_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(GUID_SIZE * 2);
        for b in self.0 {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }

    /// Accept either the 16-byte raw form or the 32-char hex form and
    /// normalise to raw. `InvalidId` for anything else.
    pub fn normalize(input: &[u8]) -> Result<Guid, EngineError> {
        match input.len() {
            GUID_SIZE => {
                let mut buf = [0u8; GUID_SIZE];
                buf.copy_from_slice(input);
                Ok(Guid(buf))
            }
            32 => {
                let s = std::str::from_utf8(input).map_err(|_| EngineError::InvalidId)?;
                Guid::from_hex(s)
            }
            _ => Err(EngineError::InvalidId),
        }
    }

    pub fn from_hex(s: &str) -> Result<Guid, EngineError> {
        if s.len() != GUID_SIZE * 2 {
            return Err(EngineError::InvalidId);
        }
        let mut buf = [0u8; GUID_SIZE];
        for i in 0..GUID_SIZE {
            let byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| EngineError::InvalidId)?;
            buf[i] = byte;
        }
        Ok(Guid(buf))
    }
}

impl Default for Guid {
    fn default() -> Self {
        Guid::new()
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let g = Guid::new();
        let hex = g.to_hex();
        assert_eq!(hex.len(), 32);
        let back = Guid::from_hex(&hex).unwrap();
        assert_eq!(g, back);
    }

    #[test]
    fn normalize_accepts_raw_and_hex() {
        let g = Guid::new();
        assert_eq!(Guid::normalize(g.as_raw()).unwrap(), g);
        assert_eq!(Guid::normalize(g.to_hex().as_bytes()).unwrap(), g);
    }

    #[test]
    fn normalize_rejects_bad_length() {
        assert!(matches!(
            Guid::normalize(b"too-short"),
            Err(EngineError::InvalidId)
        ));
    }

    #[test]
    fn distinct_ids_for_repeated_generation() {
        let a = Guid::new();
        let b = Guid::new();
        assert_ne!(a, b);
    }
}

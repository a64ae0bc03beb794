//! Streaming SHA-256 as an `io::Write` sink.
//!
//! Denaro hashes are a single round of SHA-256 over a canonical encoding, so
//! hashing is just serializing into this writer.

use std::io;

use sha2::{Digest, Sha256};

/// A write sink that accumulates a SHA-256 digest.
#[derive(Default)]
pub struct Writer {
    hasher: Sha256,
}

impl Writer {
    /// Consume the writer and return the digest.
    pub fn finish(self) -> [u8; 32] {
        self.hasher.finalize().into()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// SHA-256 of a byte slice, for one-shot callers.
pub fn digest(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn streaming_matches_one_shot() {
        let mut writer = Writer::default();
        writer.write_all(b"denaro").unwrap();
        writer.write_all(b" ledger").unwrap();
        assert_eq!(writer.finish(), digest(b"denaro ledger"));
    }

    #[test]
    fn empty_input() {
        assert_eq!(
            hex::encode(digest(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}

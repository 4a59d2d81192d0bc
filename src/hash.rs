//! A 32-byte BLAKE3 digest used to compute task signatures.
//!
//! `Signature` is a thin incremental hasher wrapper: callers feed it every
//! byte that affects a task's output (version tag, task parameters, source
//! file paths and contents, upstream signatures) in a fixed order, then
//! finalize it into a filesystem-safe string.

use std::io;

use camino::Utf8Path;

use crate::encoding::to_hex;

/// Incremental BLAKE3 hasher used to build up a task signature.
pub struct Signature(blake3::Hasher);

impl Signature {
    pub fn new() -> Self {
        Signature(blake3::Hasher::new())
    }

    /// Feeds a length-prefixed chunk of bytes into the digest.
    ///
    /// Length-prefixing (rather than just concatenating) keeps e.g.
    /// `("ab", "c")` and `("a", "bc")` from hashing to the same value.
    pub fn update(&mut self, bytes: impl AsRef<[u8]>) -> &mut Self {
        let bytes = bytes.as_ref();
        self.0.update(&(bytes.len() as u64).to_le_bytes());
        self.0.update(bytes);
        self
    }

    /// Feeds the contents of a file, read via a memory map for large files.
    pub fn update_file(&mut self, path: &Utf8Path) -> io::Result<&mut Self> {
        self.0.update_mmap(path)?;
        Ok(self)
    }

    /// Finalizes the digest as an uppercase hex string, safe as a directory
    /// name on every target OS.
    pub fn finish(&self) -> String {
        to_hex(self.0.finalize().as_bytes())
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_produce_same_signature() {
        let mut a = Signature::new();
        a.update("v1").update("src/foo.txt").update("  foo  ");

        let mut b = Signature::new();
        b.update("v1").update("src/foo.txt").update("  foo  ");

        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn different_inputs_produce_different_signatures() {
        let mut a = Signature::new();
        a.update("v1").update("src/foo.txt").update("  foo  ");

        let mut b = Signature::new();
        b.update("v1").update("src/foo.txt").update("  foo2  ");

        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn length_prefixing_avoids_boundary_collisions() {
        let mut a = Signature::new();
        a.update("ab").update("c");

        let mut b = Signature::new();
        b.update("a").update("bc");

        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn signature_is_safe_hex_filename() {
        let mut s = Signature::new();
        s.update("anything");
        let sig = s.finish();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}

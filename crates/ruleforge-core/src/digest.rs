//! Deterministic fingerprints used for rule keys, content hashes and Merkle
//! tree node digests. All three share the same fixed-width digest type so
//! that a rule key, a file's content hash and a directory node's digest can
//! be composed into each other without conversion.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// A fixed-width cryptographic digest, stable across processes and hosts.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Digest([u8; 32]);

impl Digest {
    pub const ZERO: Digest = Digest([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Digest(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }

    /// Digest of a single byte string, with no type tag. Used for content
    /// hashes of file bytes, where the caller already knows the type.
    pub fn of_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Digest(hasher.finalize().into())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// Type tags for the primitive shapes the key sink recognizes. Written before
/// a value's bytes so that e.g. the string `"1"` and the integer `1` never
/// collide.
#[repr(u8)]
enum TypeTag {
    String = 1,
    Bool = 2,
    I64 = 3,
    U64 = 4,
    Bytes = 5,
    Sequence = 6,
    UnorderedCollection = 7,
    Mapping = 8,
    Option = 9,
    ContentHash = 10,
    RuleKey = 11,
}

/// Incrementally builds a digest the same way across every rule, so the same
/// logical value always produces the same bytes regardless of which field
/// contributed it.
///
/// This is the runtime counterpart of the key-contributing field markers:
/// callers invoke `hash_string`, `hash_path`, `hash_deps` and so on instead of
/// hashing fields through reflection.
pub struct DigestBuilder {
    hasher: Sha256,
}

impl Default for DigestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestBuilder {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    fn tag(&mut self, tag: TypeTag) -> &mut Self {
        self.hasher.update([tag as u8]);
        self
    }

    pub fn update_str(&mut self, name: &str, value: &str) -> &mut Self {
        self.field_name(name);
        self.tag(TypeTag::String);
        self.length_prefixed(value.as_bytes());
        self
    }

    pub fn update_bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.field_name(name);
        self.tag(TypeTag::Bool);
        self.hasher.update([value as u8]);
        self
    }

    pub fn update_i64(&mut self, name: &str, value: i64) -> &mut Self {
        self.field_name(name);
        self.tag(TypeTag::I64);
        self.hasher.update(value.to_le_bytes());
        self
    }

    pub fn update_u64(&mut self, name: &str, value: u64) -> &mut Self {
        self.field_name(name);
        self.tag(TypeTag::U64);
        self.hasher.update(value.to_le_bytes());
        self
    }

    pub fn update_bytes(&mut self, name: &str, value: &[u8]) -> &mut Self {
        self.field_name(name);
        self.tag(TypeTag::Bytes);
        self.length_prefixed(value);
        self
    }

    /// An ordered sequence: length-prefix followed by each element's digest,
    /// in order. `elements` must already be the per-element digest.
    pub fn update_sequence(&mut self, name: &str, elements: &[Digest]) -> &mut Self {
        self.field_name(name);
        self.tag(TypeTag::Sequence);
        self.hasher.update((elements.len() as u64).to_le_bytes());
        for e in elements {
            self.hasher.update(e.as_bytes());
        }
        self
    }

    /// An unordered collection: elements are sorted by their own digest
    /// before hashing, so insertion order never affects the result.
    pub fn update_unordered(&mut self, name: &str, elements: &mut [Digest]) -> &mut Self {
        self.field_name(name);
        self.tag(TypeTag::UnorderedCollection);
        elements.sort();
        self.hasher.update((elements.len() as u64).to_le_bytes());
        for e in elements {
            self.hasher.update(e.as_bytes());
        }
        self
    }

    /// A mapping: entries sorted by key digest, then `(key-digest,
    /// value-digest)` hashed in order.
    pub fn update_mapping(&mut self, name: &str, entries: &mut [(Digest, Digest)]) -> &mut Self {
        self.field_name(name);
        self.tag(TypeTag::Mapping);
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        self.hasher.update((entries.len() as u64).to_le_bytes());
        for (k, v) in entries {
            self.hasher.update(k.as_bytes());
            self.hasher.update(v.as_bytes());
        }
        self
    }

    /// An optional value: a presence bit followed by the inner encoding.
    pub fn update_option(&mut self, name: &str, value: Option<&Digest>) -> &mut Self {
        self.field_name(name);
        self.tag(TypeTag::Option);
        match value {
            Some(d) => {
                self.hasher.update([1u8]);
                self.hasher.update(d.as_bytes());
            }
            None => self.hasher.update([0u8]),
        }
        self
    }

    /// A source-path input, already resolved to its content hash. Path-like
    /// inputs are never hashed by their filesystem path.
    pub fn update_content_hash(&mut self, name: &str, content: Digest) -> &mut Self {
        self.field_name(name);
        self.tag(TypeTag::ContentHash);
        self.hasher.update(content.as_bytes());
        self
    }

    /// A reference to a build dependency, replaced by its own rule key.
    pub fn update_rule_key(&mut self, name: &str, key: Digest) -> &mut Self {
        self.field_name(name);
        self.tag(TypeTag::RuleKey);
        self.hasher.update(key.as_bytes());
        self
    }

    fn field_name(&mut self, name: &str) {
        // Field insertion order is significant and forms part of the digest;
        // the name itself also contributes so that swapping two
        // same-typed fields cannot produce equal keys.
        self.length_prefixed(name.as_bytes());
    }

    fn length_prefixed(&mut self, bytes: &[u8]) {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }

    pub fn finish(self) -> Digest {
        Digest(self.hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_fields_same_order_are_deterministic() {
        let mut a = DigestBuilder::new();
        a.update_str("name", "foo").update_bool("enabled", true);
        let mut b = DigestBuilder::new();
        b.update_str("name", "foo").update_bool("enabled", true);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn field_order_changes_the_digest() {
        let mut a = DigestBuilder::new();
        a.update_str("a", "1").update_str("b", "2");
        let mut b = DigestBuilder::new();
        b.update_str("b", "2").update_str("a", "1");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn unordered_collection_ignores_insertion_order() {
        let mut elems_a = vec![Digest::of_bytes(b"x"), Digest::of_bytes(b"y")];
        let mut elems_b = vec![Digest::of_bytes(b"y"), Digest::of_bytes(b"x")];
        let mut a = DigestBuilder::new();
        a.update_unordered("deps", &mut elems_a);
        let mut b = DigestBuilder::new();
        b.update_unordered("deps", &mut elems_b);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn content_differs_from_string_with_same_bytes() {
        let digest = Digest::of_bytes(b"hello");
        let mut a = DigestBuilder::new();
        a.update_content_hash("src", digest);
        let mut b = DigestBuilder::new();
        b.update_str("src", &digest.to_hex());
        assert_ne!(a.finish(), b.finish());
    }
}

//! Weak and strong fingerprints identifying memoized build steps.

use crate::hash::{ContentHash, HASH_LENGTH, decode_digest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Separator between the selector hash and its discriminator in key form.
const SELECTOR_DISCRIMINATOR_SEPARATOR: char = '.';

/// Primary identity of a build step (tool plus declared inputs).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeakFingerprint([u8; HASH_LENGTH]);

impl WeakFingerprint {
    pub fn from_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derive a weak fingerprint by hashing arbitrary identity data.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    pub fn from_hex(s: &str) -> crate::Result<Self> {
        decode_digest(s)
            .map(Self)
            .map_err(crate::Error::InvalidFingerprint)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for WeakFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakFingerprint({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for WeakFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for WeakFingerprint {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for WeakFingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for WeakFingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Secondary key disambiguating records that share a weak fingerprint.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Selector {
    content_hash: ContentHash,
    discriminator: Option<Vec<u8>>,
}

impl Selector {
    pub fn new(content_hash: ContentHash, discriminator: Option<Vec<u8>>) -> Self {
        // An empty discriminator and no discriminator are the same key.
        let discriminator = discriminator.filter(|d| !d.is_empty());
        Self {
            content_hash,
            discriminator,
        }
    }

    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    pub fn discriminator(&self) -> Option<&[u8]> {
        self.discriminator.as_deref()
    }

    /// Canonical key form: `<hash-hex>` or `<hash-hex>.<discriminator-hex>`.
    ///
    /// Safe to embed as a single path segment in object keys and URLs.
    pub fn to_key(&self) -> String {
        match &self.discriminator {
            Some(d) => format!(
                "{}{}{}",
                self.content_hash.to_hex(),
                SELECTOR_DISCRIMINATOR_SEPARATOR,
                hex::encode(d)
            ),
            None => self.content_hash.to_hex(),
        }
    }

    /// Parse the canonical key form produced by [`Selector::to_key`].
    pub fn from_key(key: &str) -> crate::Result<Self> {
        let (hash, discriminator) = match key.split_once(SELECTOR_DISCRIMINATOR_SEPARATOR) {
            Some((hash, disc)) => {
                let disc = hex::decode(disc)
                    .map_err(|e| crate::Error::InvalidSelector(format!("{key}: {e}")))?;
                (hash, Some(disc))
            }
            None => (key, None),
        };
        let content_hash = ContentHash::from_hex(hash)
            .map_err(|e| crate::Error::InvalidSelector(format!("{key}: {e}")))?;
        Ok(Self::new(content_hash, discriminator))
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({})", self.to_key())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_key())
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_key(&s).map_err(serde::de::Error::custom)
    }
}

/// The primary key of a metadata record: a weak fingerprint plus a selector.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StrongFingerprint {
    pub weak: WeakFingerprint,
    pub selector: Selector,
}

impl StrongFingerprint {
    pub fn new(weak: WeakFingerprint, selector: Selector) -> Self {
        Self { weak, selector }
    }

    /// Canonical byte encoding used for routing.
    ///
    /// `weak || selector hash || discriminator length (u32 LE) || discriminator`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let discriminator = self.selector.discriminator().unwrap_or_default();
        let mut out = Vec::with_capacity(HASH_LENGTH * 2 + 4 + discriminator.len());
        out.extend_from_slice(self.weak.as_bytes());
        out.extend_from_slice(self.selector.content_hash().as_bytes());
        out.extend_from_slice(&(discriminator.len() as u32).to_le_bytes());
        out.extend_from_slice(discriminator);
        out
    }
}

impl fmt::Display for StrongFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.weak, self.selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(seed: &str, disc: Option<&[u8]>) -> Selector {
        Selector::new(ContentHash::compute(seed.as_bytes()), disc.map(|d| d.to_vec()))
    }

    #[test]
    fn test_selector_key_roundtrip() {
        let plain = selector("a", None);
        assert_eq!(Selector::from_key(&plain.to_key()).unwrap(), plain);

        let with_disc = selector("a", Some(b"out/put"));
        let key = with_disc.to_key();
        assert!(!key.contains('/'));
        assert_eq!(Selector::from_key(&key).unwrap(), with_disc);
    }

    #[test]
    fn test_empty_discriminator_is_no_discriminator() {
        assert_eq!(selector("a", Some(b"")), selector("a", None));
    }

    #[test]
    fn test_strong_fingerprint_equality_is_structural() {
        let weak = WeakFingerprint::compute(b"tool");
        let a = StrongFingerprint::new(weak, selector("s", Some(b"x")));
        let b = StrongFingerprint::new(weak, selector("s", Some(b"x")));
        let c = StrongFingerprint::new(weak, selector("s", Some(b"y")));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a.to_bytes(), c.to_bytes());
    }

    #[test]
    fn test_strong_fingerprint_bytes_distinguish_discriminator_boundaries() {
        let weak = WeakFingerprint::compute(b"tool");
        let none = StrongFingerprint::new(weak, selector("s", None));
        let some = StrongFingerprint::new(weak, selector("s", Some(b"\0")));
        assert_ne!(none.to_bytes(), some.to_bytes());
    }

    #[test]
    fn test_weak_fingerprint_rejects_wrong_length() {
        assert!(WeakFingerprint::from_hex("abcd").is_err());
    }
}

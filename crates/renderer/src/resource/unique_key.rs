//! Content-derived keys for finding cacheable resources.
//!
//! A key is a domain plus a list of data words. The domain separates key
//! producers from one another and carries the collision policy; the words are
//! whatever identifies the content within that domain.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::sync::atomic::{AtomicU32, Ordering};
use rustc_hash::FxHasher;
use std::sync::Arc;

/// Next domain id handed out by [`KeyDomain::generate`]. Zero is reserved.
static NEXT_DOMAIN: AtomicU32 = AtomicU32::new(1);

/// What happens when a key already bound to a live resource is assigned again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyReuse {
    /// The previous resource loses the key and the new one takes it.
    InvalidateOnCollision,
    /// The assignment is refused while the previous resource is still alive.
    Exclusive,
}

/// Namespace for unique keys produced by one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyDomain {
    id: u32,
    reuse: KeyReuse,
}

impl KeyDomain {
    /// Domain of keys that were never built. Such keys are invalid.
    pub const INVALID: Self = Self {
        id: 0,
        reuse: KeyReuse::InvalidateOnCollision,
    };

    /// Allocate a fresh domain with the given collision policy.
    #[inline]
    pub fn generate(reuse: KeyReuse) -> Self {
        Self {
            id: NEXT_DOMAIN.fetch_add(1, Ordering::Relaxed),
            reuse,
        }
    }

    /// Collision policy of this domain.
    #[inline]
    pub const fn reuse(&self) -> KeyReuse {
        self.reuse
    }
}

/// Identifier of a cacheable resource.
///
/// Equality covers the domain and the data words; the optional tag is only a
/// debugging aid.
#[derive(Clone)]
pub struct UniqueKey {
    domain: KeyDomain,
    words: Arc<[u32]>,
    hash: u64,
    tag: Option<&'static str>,
}

impl UniqueKey {
    /// Start building a key in `domain`.
    #[inline]
    pub fn builder(domain: KeyDomain) -> UniqueKeyBuilder {
        UniqueKeyBuilder {
            domain,
            words: Vec::new(),
            tag: None,
        }
    }

    /// A key that never matches a resource.
    #[inline]
    pub fn invalid() -> Self {
        Self::builder(KeyDomain::INVALID).finish()
    }

    /// Whether this key was built in a real domain.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.domain != KeyDomain::INVALID
    }

    /// Domain the key belongs to.
    #[inline]
    pub const fn domain(&self) -> KeyDomain {
        self.domain
    }

    /// Digest of the domain and data words.
    #[inline]
    pub const fn digest(&self) -> u64 {
        self.hash
    }

    /// Debug tag, if one was attached.
    #[inline]
    pub const fn tag(&self) -> Option<&'static str> {
        self.tag
    }
}

impl PartialEq for UniqueKey {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.domain == other.domain && self.words == other.words
    }
}

impl Eq for UniqueKey {}

impl Hash for UniqueKey {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for UniqueKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("UniqueKey")
            .field("domain", &self.domain.id)
            .field("digest", &format_args!("{:#018x}", self.hash))
            .field("tag", &self.tag)
            .finish()
    }
}

/// Accumulates data words for a [`UniqueKey`].
#[derive(Debug)]
pub struct UniqueKeyBuilder {
    domain: KeyDomain,
    words: Vec<u32>,
    tag: Option<&'static str>,
}

impl UniqueKeyBuilder {
    /// Append one word.
    #[inline]
    #[must_use]
    pub fn push_u32(mut self, word: u32) -> Self {
        self.words.push(word);
        self
    }

    /// Append a 64-bit value as two words.
    #[inline]
    #[must_use]
    pub fn push_u64(self, value: u64) -> Self {
        self.push_u32(value as u32).push_u32((value >> 32) as u32)
    }

    /// Append a float by its bit pattern.
    #[inline]
    #[must_use]
    pub fn push_f32(self, value: f32) -> Self {
        self.push_u32(value.to_bits())
    }

    /// Append raw bytes, length-prefixed and packed little-endian into words.
    #[must_use]
    pub fn push_bytes(mut self, bytes: &[u8]) -> Self {
        self.words.push(bytes.len() as u32);
        for chunk in bytes.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.words.push(u32::from_le_bytes(word));
        }
        self
    }

    /// Attach a debug tag.
    #[inline]
    #[must_use]
    pub const fn tag(mut self, tag: &'static str) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Compute the digest and produce the key.
    pub fn finish(self) -> UniqueKey {
        let mut hasher = FxHasher::default();
        self.domain.id.hash(&mut hasher);
        self.words.hash(&mut hasher);
        UniqueKey {
            domain: self.domain,
            words: Arc::from(self.words),
            hash: hasher.finish(),
            tag: self.tag,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// # Panics
    /// Panics if equal content does not produce equal keys.
    #[test]
    fn same_content_same_key() {
        let domain = KeyDomain::generate(KeyReuse::InvalidateOnCollision);
        let first = UniqueKey::builder(domain).push_u32(7).push_f32(1.5).finish();
        let second = UniqueKey::builder(domain)
            .push_u32(7)
            .push_f32(1.5)
            .tag("quad")
            .finish();
        assert_eq!(first, second);
        assert_eq!(first.digest(), second.digest());
        assert!(first.is_valid());
    }

    /// # Panics
    /// Panics if keys from different domains compare equal.
    #[test]
    fn domains_separate_keys() {
        let first = KeyDomain::generate(KeyReuse::InvalidateOnCollision);
        let second = KeyDomain::generate(KeyReuse::InvalidateOnCollision);
        assert_ne!(first, second);
        let key_a = UniqueKey::builder(first).push_u32(1).finish();
        let key_b = UniqueKey::builder(second).push_u32(1).finish();
        assert_ne!(key_a, key_b);
    }

    /// # Panics
    /// Panics if byte length is not part of the key.
    #[test]
    fn bytes_are_length_prefixed() {
        let domain = KeyDomain::generate(KeyReuse::Exclusive);
        let short = UniqueKey::builder(domain).push_bytes(&[1, 2]).finish();
        let padded = UniqueKey::builder(domain).push_bytes(&[1, 2, 0]).finish();
        assert_ne!(short, padded);
        assert!(!UniqueKey::invalid().is_valid());
    }
}

use tel_types::Digest;

/// Domain-separated BLAKE3 hasher.
///
/// The domain tag and a `:` are fed ahead of the data, so an event digest
/// and a Merkle node over identical bytes never collide.
#[derive(Clone, Copy, Debug)]
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Event digests: `canonical bytes || previous digest`.
    pub const EVENT: Self = Self {
        domain: "tel-event-v1",
    };
    /// Internal Merkle nodes: `left || right`.
    pub const MERKLE: Self = Self {
        domain: "tel-merkle-v1",
    };
    /// Public-key fingerprints.
    pub const KEY: Self = Self {
        domain: "tel-key-v1",
    };

    pub fn hash(&self, data: &[u8]) -> Digest {
        self.hash_parts(&[data])
    }

    /// Hash the concatenation of `parts`.
    pub fn hash_parts(&self, parts: &[&[u8]]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        for part in parts {
            hasher.update(part);
        }
        Digest::from_hash(*hasher.finalize().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_never_collide() {
        let data = b"same bytes";
        let event = ContentHasher::EVENT.hash(data);
        let merkle = ContentHasher::MERKLE.hash(data);
        let key = ContentHasher::KEY.hash(data);
        assert_ne!(event, merkle);
        assert_ne!(event, key);
        assert_ne!(merkle, key);
        assert_ne!(event, Digest::of(data));
    }

    #[test]
    fn parts_hash_like_concatenation() {
        assert_eq!(
            ContentHasher::EVENT.hash(b"abcdef"),
            ContentHasher::EVENT.hash_parts(&[b"abc", b"def"])
        );
    }

    #[test]
    fn matches_prefixed_blake3() {
        let expected = blake3::hash(b"tel-merkle-v1:payload");
        assert_eq!(
            ContentHasher::MERKLE.hash(b"payload"),
            Digest::from_hash(*expected.as_bytes())
        );
    }
}

// Content fingerprinting: the sole key for the cache and the durable store.
//
// Text is hashed over its UTF-8 bytes. Images are hashed over the standard
// base64 encoding of their raw bytes, so an image re-encoded by a transport
// layer that hands us base64 lands on the same key as the raw upload.
// Both use SHA-256; the content type travels alongside the digest so text and
// image records never share a key even if their canonical bytes coincide.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Prefix shared by every ephemeral-tier key.
pub const CACHE_KEY_PREFIX: &str = "moderation:";

/// A 256-bit content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentFingerprint([u8; 32]);

impl ContentFingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> anyhow::Result<Self> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("fingerprint must be 32 bytes, got {} hex chars", s.len()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Hash arbitrary bytes. Pure and total.
pub fn fingerprint(bytes: &[u8]) -> ContentFingerprint {
    let digest = Sha256::digest(bytes);
    ContentFingerprint(digest.into())
}

/// The two content types sharing the key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentType::Text),
            "image" => Ok(ContentType::Image),
            other => Err(other.to_string()),
        }
    }
}

/// A piece of content submitted for moderation.
#[derive(Debug, Clone)]
pub enum Content {
    Text(String),
    Image(Vec<u8>),
}

impl Content {
    pub fn content_type(&self) -> ContentType {
        match self {
            Content::Text(_) => ContentType::Text,
            Content::Image(_) => ContentType::Image,
        }
    }

    /// Canonical byte form fed to the hash.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Content::Text(text) => text.as_bytes().to_vec(),
            Content::Image(bytes) => base64::engine::general_purpose::STANDARD
                .encode(bytes)
                .into_bytes(),
        }
    }

    pub fn fingerprint(&self) -> ContentFingerprint {
        fingerprint(&self.canonical_bytes())
    }
}

/// Ephemeral-tier key: `moderation:{type}:{hex}`.
pub fn cache_key(content_type: ContentType, fp: &ContentFingerprint) -> String {
    format!("{CACHE_KEY_PREFIX}{}:{}", content_type.as_str(), fp.to_hex())
}

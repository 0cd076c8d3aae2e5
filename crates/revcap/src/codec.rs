// Copyright (c) 2026 - present Nicholas D. Crosbie
// SPDX-License-Identifier: MIT

//! Compressed diff payloads
//!
//! Diff sets are stored as JSON, compressed with LZ4 (length-prefixed) and
//! encoded as standard base64 so they fit in a JSON document or a TEXT
//! column. [`DiffBlob::decode`] is the exact inverse of [`DiffBlob::encode`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use revcap_git::ParsedDiff;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while encoding or decoding a diff payload
#[derive(Debug, Error)]
pub enum CodecError {
    /// The diff set could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is not valid base64
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The payload is not a valid LZ4 block
    #[error("Invalid compressed payload: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),
}

/// An encoded, compressed list of [`ParsedDiff`]s
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiffBlob(String);

impl DiffBlob {
    /// Encode a diff set
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] if serialization fails.
    pub fn encode(diffs: &[ParsedDiff]) -> Result<Self, CodecError> {
        let json = serde_json::to_vec(diffs)?;
        let compressed = lz4_flex::compress_prepend_size(&json);
        Ok(Self(STANDARD.encode(compressed)))
    }

    /// Decode back into the diff set that was encoded
    ///
    /// An empty blob (as written by stores that predate a diff kind) decodes
    /// to an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is corrupt.
    pub fn decode(&self) -> Result<Vec<ParsedDiff>, CodecError> {
        if self.0.is_empty() {
            return Ok(Vec::new());
        }
        let compressed = STANDARD.decode(&self.0)?;
        let json = lz4_flex::decompress_size_prepended(&compressed)?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Wrap an already encoded payload
    #[must_use]
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// The encoded text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revcap_git::parse_patch;
    use similar_asserts::assert_eq;

    const PATCH: &str = "diff --git a.txt a.txt
--- a.txt
+++ a.txt
@@ -1,2 +1,2 @@
 keep
-old
+new
diff --git logo.png logo.png
Binary files logo.png and logo.png differ
";

    #[test]
    fn test_roundtrip() {
        let diffs = parse_patch(PATCH);
        let blob = DiffBlob::encode(&diffs).expect("encode");
        assert_eq!(blob.decode().expect("decode"), diffs);
    }

    #[test]
    fn test_empty_list_roundtrip() {
        let blob = DiffBlob::encode(&[]).expect("encode");
        assert!(!blob.as_str().is_empty());
        assert!(blob.decode().expect("decode").is_empty());
    }

    #[test]
    fn test_empty_blob_decodes_to_empty_list() {
        assert!(DiffBlob::default().decode().expect("decode").is_empty());
    }

    #[test]
    fn test_corrupt_payloads() {
        let not_base64 = DiffBlob::from_encoded("%%%");
        assert!(matches!(not_base64.decode(), Err(CodecError::Base64(_))));

        let not_lz4 = DiffBlob::from_encoded(STANDARD.encode([5, 0, 0, 0, 0xff]));
        assert!(matches!(not_lz4.decode(), Err(CodecError::Decompress(_))));
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let blob = DiffBlob::from_encoded("abc=");
        assert_eq!(serde_json::to_string(&blob).expect("json"), "\"abc=\"");
    }
}

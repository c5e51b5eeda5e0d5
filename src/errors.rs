// Copyright 2026 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Typed failure classes that steer fallback decisions.
//!
//! Plumbing uses `anyhow`; these enums exist where the caller has to branch
//! on *which* failure happened (retry on rate limit, log a dimension
//! mismatch as an operator problem).

use thiserror::Error;

/// Failure of an external embedding or generation provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rate limited the request")]
    RateLimited,

    #[error("provider did not answer within {0} seconds")]
    Timeout(u64),

    #[error("provider is not configured: {0}")]
    NotConfigured(String),

    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("provider response was malformed: {0}")]
    Malformed(String),

    #[error("provider request failed: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(0)
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Failure of a vector similarity query against the document store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored vectors and the query vector disagree on dimensionality.
    /// Needs an operator: re-create the index and re-ingest.
    #[error("vector dimension mismatch: index holds {expected} dimensions, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Backend rejected the query vector's shape; sizes are only in the text
    #[error("vector index rejected the query: {0}")]
    IncompatibleVectors(String),

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Classify a backend error message the way LanceDB/DataFusion phrase them
    pub fn from_backend_message(message: String) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("dimension") {
            StoreError::IncompatibleVectors(message)
        } else if lower.contains("index") || lower.contains("not found") {
            StoreError::IndexUnavailable(message)
        } else {
            StoreError::Backend(message)
        }
    }

    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(
            self,
            StoreError::DimensionMismatch { .. } | StoreError::IncompatibleVectors(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_message_classification() {
        let err = StoreError::from_backend_message(
            "query dim 1024 does not match column dimension 1536".to_string(),
        );
        assert!(err.is_dimension_mismatch());

        let err = StoreError::from_backend_message("No vector index found".to_string());
        assert!(matches!(err, StoreError::IndexUnavailable(_)));

        let err = StoreError::from_backend_message("io error".to_string());
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[test]
    fn test_dimension_message_kept() {
        let message = "query dim 1024 does not match column dimension 1536";
        let err = StoreError::from_backend_message(message.to_string());
        assert!(matches!(err, StoreError::IncompatibleVectors(_)));
        assert_eq!(
            err.to_string(),
            format!("vector index rejected the query: {}", message)
        );

        let err = StoreError::DimensionMismatch {
            expected: 1536,
            actual: 64,
        };
        assert!(err.is_dimension_mismatch());
        assert!(err.to_string().contains("1536"));
    }

    #[test]
    fn test_rate_limit_flag() {
        assert!(ProviderError::RateLimited.is_rate_limited());
        assert!(!ProviderError::Timeout(30).is_rate_limited());
    }
}

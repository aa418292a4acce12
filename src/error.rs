//! Ingestion error taxonomy

use thiserror::Error;

/// Why a window could not be ingested.
///
/// Each variant wraps the underlying `anyhow` chain; `{0:#}` prints it in full.
#[derive(Debug, Error)]
pub enum IngestError {
    /// RPC or network failure talking to the node.
    #[error("node unavailable: {0:#}")]
    NodeUnavailable(anyhow::Error),

    /// A matched log carried a malformed payload.
    #[error("decode anomaly: {0}")]
    DecodeAnomaly(String),

    /// Writing to the event store failed.
    #[error("persistence failure: {0:#}")]
    PersistenceFailure(anyhow::Error),
}

impl IngestError {
    /// Short label for structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::NodeUnavailable(_) => "node_unavailable",
            IngestError::DecodeAnomaly(_) => "decode_anomaly",
            IngestError::PersistenceFailure(_) => "persistence_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_display_includes_context_chain() {
        let err: anyhow::Result<()> = Err(anyhow::anyhow!("connection refused"));
        let err = err.context("Failed to send RPC request").unwrap_err();
        let ingest = IngestError::NodeUnavailable(err);
        assert_eq!(
            ingest.to_string(),
            "node unavailable: Failed to send RPC request: connection refused"
        );
        assert_eq!(ingest.kind(), "node_unavailable");
    }
}

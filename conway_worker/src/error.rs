//! Error types for the worker bridge.

use thiserror::Error;

/// Why a call through the bridge did not produce a value.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// An argument could not be turned into a wire value; the call was never sent.
    #[error("cannot encode arguments for `{method}`: {source}")]
    Encode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// The reply arrived but does not have the expected shape.
    #[error("cannot decode reply from `{method}`: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// The worker reported a failure for this call.
    #[error("`{method}` failed in worker: {message}")]
    Remote { method: String, message: String },

    /// The worker is gone: the bridge was terminated or the worker exited.
    #[error("worker has been terminated")]
    Terminated,

    /// The worker thread or its runtime could not be started.
    #[error("failed to start worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// The worker thread started but panicked while building its service.
    #[error("worker panicked during startup: {0}")]
    Startup(String),
}

impl BridgeError {
    /// The worker-side message, if this is a remote failure.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            BridgeError::Remote { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// A call argument the worker could not use.
#[derive(Debug, Error)]
pub enum ArgError {
    #[error("missing argument {0}")]
    Missing(usize),

    #[error("argument {index} has the wrong shape: {source}")]
    Invalid {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

//! Errors raised at the engine boundary.
//!
//! The planners themselves are total. Only decoding host input and talking to
//! host collaborators can fail, and none of these failures stop the loop.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Host JSON did not match the expected shape.
    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        source: serde_json::Error,
    },

    /// Failed to encode a value for the host.
    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        source: serde_json::Error,
    },

    /// A call across the wasm boundary threw or returned garbage.
    #[error("js bridge error: {0}")]
    Js(String),

    /// The order applier refused a plan.
    #[error("order applier rejected {plan} plan: {reason}")]
    Applier { plan: &'static str, reason: String },
}

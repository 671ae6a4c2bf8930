use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("transport error: {0}")]
    Transport(#[from] asya_transport::TransportError),

    #[error("runtime error: {0}")]
    Runtime(#[from] asya_runtime::RuntimeError),

    #[error("envelope error: {0}")]
    Envelope(#[from] asya_envelope::EnvelopeError),

    #[error("malformed message: {0}")]
    Malformed(String),
}

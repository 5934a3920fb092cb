//! Remote error classification.
//!
//! Decides whether a remote failure may be retried with the identical request.

/// Retry class of a remote error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry the same request after a fixed delay.
    Transient,
    /// Surface to the caller unchanged.
    Fatal,
}

/// Error codes known to be retryable without changing the request.
pub const TRANSIENT_CODES: [&str; 4] = [
    "TooManyRequestsException",
    "ThrottlingException",
    "NetworkingError",
    "UnknownEndpoint",
];

/// Classifies a remote error code. Unknown and empty codes are fatal.
pub fn classify(code: &str) -> ErrorClass {
    if TRANSIENT_CODES.contains(&code) {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal
    }
}

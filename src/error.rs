use thiserror::Error;

/// Error handling for JA4+ fingerprint derivation and packet capture.
#[derive(Error, Debug)]
pub enum Ja4PlusError {
    /// An error occurred while parsing data.
    ///
    /// The associated string provides additional context about the error.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A read went past the end of the available bytes.
    ///
    /// The associated string names the field that could not be read.
    #[error("Truncated input while reading {0}")]
    Truncated(&'static str),

    /// An unsupported protocol was encountered.
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// The engine or the capture driver was configured with invalid values.
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),
}

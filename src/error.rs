use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced to the caller of an encode, transmit or query call.
///
/// Per-item store failures are not part of this type: they are collected
/// into a [`crate::store::WriteReport`] and never abort a batch.
#[derive(Debug, Error)]
pub enum Error {
    #[error("encoding contract violated: {0}")]
    EncodingContract(String),

    #[error("could not decode remote-write message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("snappy compression failed: {0}")]
    Compression(#[from] snap::Error),

    #[error("failed to reach remote-write endpoint: {0}")]
    Transmission(#[source] reqwest::Error),

    #[error("query endpoint returned HTTP {status}: {body}")]
    QueryHttp { status: u16, body: String },

    #[error("query backend reported failure: {body}")]
    QueryBackend { body: serde_json::Value },

    #[error("query string is empty")]
    InvalidQuery,

    #[error("invalid query range: {0}")]
    InvalidRange(String),

    #[error("could not decode query response: {0}")]
    QueryDecode(String),

    #[error("query request failed: {0}")]
    QueryTransport(#[source] reqwest::Error),

    #[error("request signing failed: {0}")]
    Signing(String),

    #[error("invalid metric stream record: {0}")]
    InvalidRecord(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Short stable name of the error kind, used in logs and proxy replies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::EncodingContract(_) => "EncodingContractError",
            Error::Decode(_) => "DecodeError",
            Error::Compression(_) => "CompressionError",
            Error::Transmission(_) => "TransmissionError",
            Error::QueryHttp { .. } => "QueryHttpError",
            Error::QueryBackend { .. } => "QueryBackendError",
            Error::InvalidQuery => "InvalidQueryError",
            Error::InvalidRange(_) => "InvalidRangeError",
            Error::QueryDecode(_) => "QueryDecodeError",
            Error::QueryTransport(_) => "QueryTransportError",
            Error::Signing(_) => "SigningError",
            Error::InvalidRecord(_) => "InvalidRecordError",
            Error::Config(_) => "ConfigError",
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
        }
    }
}

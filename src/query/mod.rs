pub mod client;
pub mod response;
pub mod signer;

pub use client::{query, query_unsigned, QueryClient};
pub use response::{decode_result, DataPoint, QueryEnvelope, QueryKind, QueryResult};
pub use signer::{HeaderSigner, RequestSigner, Unsigned};

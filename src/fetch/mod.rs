//! Fetch execution: building requests, talking to the network, decoding bodies.

mod error;
mod executor;
mod payload;
mod transport;

pub use error::FetchError;
pub use executor::{build_request, decode_response, FetchExecutor};
pub use payload::Payload;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

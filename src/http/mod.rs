//! HTTP surface: request interception, 429 rendering and the server.

mod context;
mod middleware;
mod response;
pub mod routes;
mod server;

pub use context::request_context;
pub use middleware::{govern, ChainOutcome, GovernorChain};
pub use response::{apply_headers, rejection_response};
pub use server::HttpServer;

//! HTTP surface of the story index: `/index.json`, `/index-stats.json` and
//! the `/index-events` notification stream.

pub mod http;

pub use http::{router, serve_http, GENERATION_HEADER};

//! luahttpd: an HTTP server whose routing table is populated at startup
//! from Lua endpoint definitions.
//!
//! Each endpoint is one of three variants: a scripted handler run by the
//! embedded Lua runtime, a static file responder, or an alias that hands
//! the request to another endpoint without a client round trip. A request
//! passes from the connection loop through the framer to the dispatcher,
//! which resolves an endpoint and may loop on internal redirects before a
//! response is written back.
//!
//! Deliberately not supported: TLS, keep-alive, chunked transfer encoding,
//! path-pattern routing, request size limits, pipelining.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod endpoint;
pub mod framer;
pub mod http;
pub mod loader;
pub mod registry;
pub mod script;
pub mod server;
pub mod status;

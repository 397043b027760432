//! Mock Rancher v3 API server for testing.
//!
//! Serves list, create and replace over HTTP for any collection below
//! `/v3`, backed by an in-memory store, so the real HTTP transport can be
//! exercised end to end.

pub mod http;
mod store;

pub use http::{HttpMockRancherServer, RunningHttpMockRancherServer};
pub use store::{seed, Seed};

//! Test harness for integration tests against a live server.
//!
//! Spawns the real router on an ephemeral port and offers a thin client
//! that speaks the echo message format.

#![allow(dead_code)]

mod client;
mod server;

pub use client::{TestClient, http_get};
pub use server::{TestServer, wait_for};

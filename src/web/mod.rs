//! HTTP gateway: recommendation queries and case exports over axum.

pub mod server;
pub mod types;

pub use server::{GatewayState, router, start_server};

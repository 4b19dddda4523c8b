//! HTTP and WebSocket handlers

pub mod health;
pub mod ws;

//! WebSocket transport and message routing

pub mod dispatcher;
pub mod handler;
pub mod hub;
pub mod protocol;

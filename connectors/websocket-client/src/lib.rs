mod client;

pub use client::{ConnectionError, ConnectionState, WebsocketClient};

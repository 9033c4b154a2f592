//! RADIUS Change-of-Authorization and Disconnect dispatcher (§4.2).

pub mod client;
pub mod error;
pub mod packet;

pub use client::CoAClient;
pub use error::CoAClientError;

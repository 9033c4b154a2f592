//! RouterOS API client: length-prefixed sentence framing, plain and
//! MD5-challenge login, and the typed operations the reconciliation loops
//! drive edge routers with.

pub mod client;
pub mod error;
pub mod login;
pub mod protocol;
pub mod session;
pub mod words;

pub use client::{RouterClient, RouterOps};
pub use error::RouterClientError;
pub use session::{FirewallConnection, Session};

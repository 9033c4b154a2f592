//! Typed persistence contract (§6) plus its Postgres implementation.
//!
//! Every other crate in the workspace talks to the database only through
//! [`PersistenceGateway`]; no `sqlx` type crosses this boundary.

pub mod error;
pub mod gateway;
pub mod pool;
pub mod postgres;

pub use error::{PersistenceError, PersistenceResult};
pub use gateway::{PersistenceGateway, SubscriberSessionPatch};
pub use pool::init_pool;
pub use postgres::PgPersistenceGateway;

//! Client for the OTRS ticketing RPC interfaces
//!
//! Callers work with nested [`ParameterSet`]s; the client turns them into
//! either the legacy positional `Dispatch` call or a GenericInterface
//! named-parameter call, and turns the replies back into nested sets.

pub mod client;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod merge;
pub mod protocol;
#[cfg(test)]
mod testing;
pub mod transport;
pub mod value;

pub use client::{ClientError, CreatedTicket, TicketClient};
pub use config::ClientConfig;
pub use dispatch::WireDialect;
pub use value::{ParameterSet, Value};

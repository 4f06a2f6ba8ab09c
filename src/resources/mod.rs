//! Resource definitions and their CRUD bridges.

pub mod channel;
pub mod check;

pub use channel::{ChannelConfig, ChannelResource};
pub use check::{CheckConfig, CheckResource};

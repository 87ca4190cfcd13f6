pub mod access;
pub mod commands;
pub mod inbound;
pub mod payments;
pub mod pipeline;
pub mod router;
pub mod transport;

// HTTP surface for the relay.

pub mod handler;

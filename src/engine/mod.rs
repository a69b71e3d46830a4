// Relay engine: range parsing, resolution caching, and the streaming core.

pub mod cache;
pub mod range;
pub mod relay;

//! Domain model shared between the murmur server crates.

pub mod model;

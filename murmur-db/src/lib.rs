//! Postgres persistence for murmur.

pub mod client;
mod record;

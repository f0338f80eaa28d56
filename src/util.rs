//! Shared utility modules used across Tessera components.

pub mod bits;
pub mod varint;

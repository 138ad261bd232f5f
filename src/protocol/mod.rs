//! Kafka wire protocol, restricted to the requests needed to inspect consumer groups.
//!
//! # References
//! - <https://kafka.apache.org/protocol>

pub mod api_key;
pub mod api_version;
pub mod error;
pub mod frame;
pub mod messages;
pub mod primitives;
pub mod traits;
mod vec_builder;

#[cfg(test)]
mod test_utils;

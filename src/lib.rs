#![deny(rustdoc::broken_intra_doc_links, rust_2018_idioms)]
#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

//! Per-partition lag and ownership report for a Kafka consumer group.
//!
//! ```no_run
//! # async fn test() {
//! use kafka_lag::{client::ClientBuilder, lag};
//!
//! let client = lag::connect(ClientBuilder::new(vec!["localhost:9092".to_owned()]))
//!     .await
//!     .unwrap();
//! let group = client.group_client("payments");
//!
//! let report = lag::generate(&client, &group).await.unwrap();
//! for record in &report.records {
//!     println!("{record}");
//! }
//!
//! client.close().await;
//! # }
//! ```

mod build_info;

pub mod client;

mod connection;

pub mod lag;

mod messenger;

#[cfg(feature = "unstable-fuzzing")]
pub mod protocol;
#[cfg(not(feature = "unstable-fuzzing"))]
mod protocol;

mod throttle;

pub mod topic;

pub use build_info::DEFAULT_CLIENT_ID;
pub use connection::Broker;

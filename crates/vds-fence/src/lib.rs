#![doc = include_str!("../README.md")]

pub mod config;
pub mod connection;
pub mod partition;
pub mod request;
pub mod scheduler;
pub mod telemetry;

pub use connection::{Connection, ConnectionResolver};
pub use scheduler::{FenceQuery, Scheduler};
pub use vds_fence_core;

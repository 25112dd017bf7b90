pub mod client;

pub use client::{ApiClient, EventStream, WatchEvent};

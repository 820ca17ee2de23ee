mod client;
pub mod types;

pub use client::config::{Config, ConfigBuilder};
pub use client::{EventReader, StreamWriter, connect};

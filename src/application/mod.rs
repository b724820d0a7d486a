pub mod config;

pub use config::{parse_size, Config};

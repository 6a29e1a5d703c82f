pub mod server;

pub use server::{ServerConfig, DEFAULT_HOST, DEFAULT_PORT};

pub mod config;
pub mod dump;

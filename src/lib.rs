pub mod bluetooth;
pub mod buffer;
pub mod config;
pub mod console;
pub mod device;
pub mod error;
pub mod models;
pub mod utils;

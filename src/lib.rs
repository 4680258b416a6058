pub mod adb;
pub mod commands;
pub mod config;
pub mod error;
pub mod jdwp;
pub mod manifest;
pub mod sdk;
pub mod session;

pub use error::{Error, Result};

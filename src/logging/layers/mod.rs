//! Subscriber layers for the console and file sinks.

pub mod console;
pub mod file;

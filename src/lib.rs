//! Library crate for wifi-keysearch-rs exposing reusable modules.
pub mod checkpoint;
pub mod coordinator;
pub mod error;
pub mod progress;
pub mod radio;
pub mod server;
pub mod tester;
pub mod types;
pub mod wordlist;

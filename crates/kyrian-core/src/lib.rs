pub mod app;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod platform;
pub mod progress;
pub mod tree;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;

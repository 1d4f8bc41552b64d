pub mod burst;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod scoring;
pub mod sink;

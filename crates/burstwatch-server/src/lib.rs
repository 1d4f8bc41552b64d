pub mod app;
pub mod config;
pub mod decode;
pub mod delivery;
pub mod error;
pub mod geo;
pub mod rdns;
pub mod routes;
pub mod state;

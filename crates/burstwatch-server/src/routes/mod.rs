pub mod alert;
pub mod go;
pub mod health;
pub mod ping;
pub mod selftest;

pub mod artifact;
pub mod color;
pub mod common;
pub mod config;
pub mod error;
pub mod extract;
pub mod heuristic;
pub mod manifest;
pub mod oam;
pub mod palette;
pub mod persist;
pub mod reinsert;
pub mod resolve;
pub mod sheet;
pub mod tile;
pub mod validate;

// src/lib.rs

pub mod config;
pub mod pipeline;
pub mod tracking;
pub mod types;

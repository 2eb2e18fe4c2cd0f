// src/lib.rs
pub mod cli;
pub mod config;
pub mod pipelines;
pub mod services;
pub mod utils;

pub use cli::Arguments;
pub use pipelines::tophat2::{TopHatOutput, run};

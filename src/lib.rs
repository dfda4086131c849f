pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod stats;

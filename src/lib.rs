pub mod config;
pub mod error;
pub mod feedback;
pub mod model_download;
pub mod pipeline;
pub mod rules;
pub mod session;
pub mod speech;
pub mod types;

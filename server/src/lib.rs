//! LinguaChat server: axum HTTP API over the core services.

mod web_server;

pub use web_server::run_web_server;

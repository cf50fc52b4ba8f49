pub mod api;
pub mod config;
pub mod language;
pub mod pipeline;
pub mod prompt;
pub mod script;
pub mod session;
pub mod store;

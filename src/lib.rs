pub mod app;
pub mod config;
pub mod errors;
pub mod logging;
pub mod remote;
pub mod thread;
pub mod ui;

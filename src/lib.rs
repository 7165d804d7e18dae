pub mod analyzer;
pub mod base_urls;
pub mod cli;
pub mod codelens;
pub mod config;
pub mod debug;
pub mod document;
pub mod history;
pub mod i18n;
pub mod launch_settings;
pub mod model;
pub mod panel;
pub mod project;
pub mod scan;
pub mod server;
pub mod session;
pub mod store;
pub mod transport;
pub mod util;
pub mod watch;

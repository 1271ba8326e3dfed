pub mod aggregate;
pub mod api;
pub mod collector;
pub mod engine;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod logging;
pub mod markdown;
pub mod model;
pub mod report;
pub mod resolver;
pub mod settings;

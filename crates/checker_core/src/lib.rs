pub mod cache;
pub mod checker;
pub mod config;
pub mod hosts;
pub mod links;
pub mod namespaces;
pub mod render;
pub mod runtime;
pub mod selector;
pub mod server;
pub mod store;
pub mod title;

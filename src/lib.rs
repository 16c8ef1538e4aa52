pub mod app;
pub mod application;
pub mod backend;
pub mod commands;
pub mod config;
pub mod context;
pub mod http;
pub mod package;
pub mod plugin;
pub mod runtime;
pub mod service;

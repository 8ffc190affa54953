pub mod algorithm;
pub mod app;
pub mod config;
pub mod decompress;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod fs_util;
pub mod mirbase;
pub mod output;
pub mod pool;
pub mod remote;
pub mod source;

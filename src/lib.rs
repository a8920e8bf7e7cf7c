// Library for tests to access modules

pub mod config;
pub mod control;
pub mod models;
pub mod monitor;
pub mod provider;
pub mod render;
pub mod sampler;
pub mod sink;
pub mod version;

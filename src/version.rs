// Package identity baked in at build time

/// Crate name as published in Cargo.toml.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Crate version as published in Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// "netpulse 0.1.0", shown in the status bar and the startup log.
pub fn banner() -> String {
    format!("{NAME} {VERSION}")
}

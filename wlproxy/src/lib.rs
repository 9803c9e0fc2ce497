//! Typed, single-owner proxies over Wayland protocol objects.
//!
//! A [`Proxy`] owns one object handle, routes the object's events to the
//! handlers its owner installed and, once dropped, destroys the object on the
//! server only when the object's negotiated version defines a destructor.

use client::Connection;
use std::env;

pub mod client;
pub mod error;
pub mod listener;
pub mod protocol;
pub mod proxy;
pub mod runtime;
mod wire_format;

pub use error::{Error, Result};
pub use protocol::{Interface, Version, WaylandId};
pub use proxy::{Proxy, ProxyTag};
pub use runtime::{Handle, Runtime};
pub use wire_format::parsing::{self, WireReader};

/// Installs `pretty_env_logger`, filtering with `RUST_LOG` (`info` when unset).
/// Calling it more than once is harmless.
pub fn init_log() {
    let filters = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .try_init();
}

pub fn connect() -> Result<Connection> {
    Connection::connect()
}

pub fn connect_to(path: &str) -> Result<Connection> {
    Connection::connect_to(path)
}

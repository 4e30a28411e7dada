//! Connection handling: configuration, transport, framing and the client.

mod client;
mod config;
mod framed;
mod stream;

pub use client::{Authenticated, Client, NotAuthenticated, Selected};
pub use config::{Config, ConfigBuilder, Security};
pub use framed::{FramedStream, read_until_tagged};
pub use stream::{ImapStream, connect, create_tls_connector};

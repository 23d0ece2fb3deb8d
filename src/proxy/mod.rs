//! HTTP proxy surface: route table, forwarding pipeline, server.

mod handler;
mod routes;
mod server;

pub use handler::{forward, scrape, GatewayState};
pub use routes::{RouteEntry, RouteTable};
pub use server::GatewayServer;

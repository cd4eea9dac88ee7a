//! HTTP entry point

mod handler;
pub mod server;

pub use handler::Dispatcher;
pub use server::{build_router, run_server, ProxyState};

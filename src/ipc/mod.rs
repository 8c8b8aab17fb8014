//! IPC module for status queries and wake triggers

mod protocol;
mod server;

pub use server::Server;

//! Mediagate.
//!
//! Mediagate is a small authenticated gateway in front of a chat archive. It
//! serves paginated chat history from a local JSON log and media files pulled
//! on demand from a remote object source, keeping a local disk cache with
//! time-based eviction.

#![warn(missing_docs, missing_debug_implementations, clippy::all)]

mod auth;
mod cli;
mod endpoints;
mod logging;
mod server;
mod service;


fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}

//! The core services of the mediagate server.
//!
//! This crate contains the media cache resolver, the eviction scheduler, the
//! download service with its per-backend adapters, the chat-log bootstrap,
//! and the configuration they all share. The HTTP surface lives in the
//! `mediagate` binary crate and talks to this crate exclusively through
//! [`caching::MediaCache`] and [`chatlog::ChatLog`].

pub mod caching;
pub mod chatlog;
pub mod config;
pub mod download;

//! Subgate - an edge service for proxy subscription delivery
//!
//! This library provides a small HTTP edge service that:
//! - Gates access behind a static token or a time-rotating derived token
//! - Fetches candidate proxy addresses from configured upstream APIs
//! - Normalizes, deduplicates, and filters address lists per request
//! - Formats addresses into subscription URIs for proxy client apps
//! - Serves an embedded text editor over a persistent key-value store
//! - Fires best-effort access notifications via a Telegram bot

pub mod config;
pub mod editor;
pub mod error;
pub mod notify;
pub mod router;
pub mod store;
pub mod subscribe;
pub mod token;
pub mod util;

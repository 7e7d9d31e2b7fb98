// crates/sqlite-worker/src/lib.rs
// ============================================================================
// Module: SQLite Worker Library
// Description: Serialized, thread-safe access to SQLite databases.
// Purpose: Route every caller's statements through one owner thread per file.
// Dependencies: crossbeam-channel, rusqlite, serde, thiserror, toml, tracing
// ============================================================================

//! ## Overview
//! Any number of threads may hold a [`WorkerHandle`] to the same database.
//! Each handle forwards its statements to the single owner thread for that
//! file, which runs them one at a time in arrival order and sends each
//! result back to the thread that asked.
//! Invariants:
//! - One owner thread and one connection per normalized path in a
//!   [`Registry`]; `:memory:` always gets its own.
//! - The connection is only touched by its owner thread.
//! - A query error is returned to its submitter and never stops the owner.
//! - Closing the last handle drains queued requests, commits, and closes the
//!   connection before returning.
//!
//! [`connect`], [`Connection`], and [`Cursor`] provide a connection/cursor
//! surface on top of the handle.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod error;
pub mod facade;
mod owner;
pub mod path;
pub mod registry;
mod request;
pub mod rows;
pub mod worker;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::DEFAULT_BUSY_TIMEOUT_MS;
pub use config::DEFAULT_ENQUEUE_TIMEOUT_MS;
pub use config::DEFAULT_MAX_QUEUE_SIZE;
pub use config::PathCase;
pub use config::WorkerConfig;
pub use error::WorkerError;
pub use facade::Connection;
pub use facade::Cursor;
pub use facade::connect;
pub use owner::OwnerId;
pub use path::DatabasePath;
pub use path::MEMORY_SENTINEL;
pub use registry::Registry;
pub use rows::Column;
pub use rows::ExecuteOutput;
pub use rows::Row;
pub use rows::RowFactory;
pub use rows::TextFactory;
pub use rows::Value;
pub use worker::WorkerHandle;

//! Core data models for the file manager.
//!
//! `entry` holds the folder-shaped types handed to callers; `object` is the
//! metadata row of the local storage backend, mapped via `sqlx::FromRow`.

pub mod entry;
pub mod object;

//! SQLite database module for the Soko engine.

//!
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;

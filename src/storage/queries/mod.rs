//! Database query modules.
//!
//! Each module provides synchronous functions over a borrowed connection,
//! meant to be called inside [`Database::with_conn`](super::Database::with_conn).

pub mod memories;

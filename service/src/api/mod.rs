//! HTTP API handlers.

pub mod reservations;

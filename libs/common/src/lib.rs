//! Common library for the ticketing account backend
//!
//! This crate provides shared functionality used by the services in the
//! workspace: PostgreSQL connectivity, migrations and the database error type.

pub mod database;
pub mod error;

//! caseledger: legal case-management backend.
//!
//! Two independent pipelines over one data-source seam:
//! - `cases::query`: filtered, paginated reads of published compliance
//!   recommendations with an exact total count
//! - `cases::export`: one case and its related collections as CSV tables or a
//!   single JSON document
//!
//! `db` holds the store traits and the PostgreSQL, libSQL and in-memory
//! backends; `web` serves both pipelines over HTTP.

pub mod cases;
pub mod config;
pub mod db;
pub mod error;
pub mod settings;
pub mod web;

//! Server side of the point-of-sale replication bridge: the
//! per-connection Session Controller, row-operation dispatch, DDL
//! translation, schema materialisation, and CSV bulk bootstrap.
//!
//! The pure logic (payload decoding, statement building, DDL
//! translation) lives in [`replbridge_core`]; execution against the
//! physical databases lives in [`replbridge_store`]; tenant routing and
//! licensing live in [`replbridge_tenant`]. This crate wires those three
//! into a live Socket.IO-compatible transport.

#![warn(clippy::all, nonstandard_style, future_incompatible)]

pub mod app_state;
pub mod config;
pub mod csv_bootstrap;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod session_controller;
pub mod session_state;

pub use app_state::AppState;
pub use config::Config;
pub use error::{ServerError, ServerResult};

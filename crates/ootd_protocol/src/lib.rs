//! # OOTD Protocol
//!
//! Shared types for the OOTD client sync layer.
//!
//! This crate provides:
//! - The `Entity` trait and shallow-merge patches
//! - `Params`, the serializable query descriptor every store fetches with
//! - The cursor page envelope (`CursorResponse`) and `CursorState`
//! - Domain DTOs served by the API
//! - The `AuthProvider` collaborator surface
//!
//! This is a pure types crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
pub mod dto;
mod entity;
mod error;
mod page;
mod params;

pub use auth::{AuthProvider, StaticAuth};
pub use entity::{Entity, Patch};
pub use error::{ErrorResponse, ProtocolError, ProtocolResult};
pub use page::{CursorResponse, CursorState, PageQuery, SortDirection};
pub use params::{Params, RESERVED_PARAM_KEYS};

//! # beacon-core
//!
//! Foundation types for the Beacon presence hub.
//!
//! This crate provides the shared vocabulary the server crate depends on:
//!
//! - **Identity**: [`ClientId`], the hub-assigned identity newtype
//! - **Protocol**: [`Message`], the tagged wire message enum, with
//!   `decode`/`encode` over the JSON wire shape
//! - **Errors**: [`DecodeError`] via `thiserror`

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod protocol;

pub use errors::DecodeError;
pub use ids::ClientId;
pub use protocol::Message;

//! # teamboard-shared
//!
//! Types shared by every Teamboard crate: identifier newtypes, task status,
//! the explicit caller [`Identity`](identity::Identity), calendar day keys and
//! collection-name constants. Nothing here performs I/O.

pub mod calendar;
pub mod constants;
pub mod error;
pub mod identity;
pub mod types;

pub use error::ParseError;
pub use identity::Identity;
pub use types::*;

//! Shared plumbing for POWR crates
//!
//! - Record addresses (`kind:pubkey:identifier`)
//! - The unsigned/stored record shape and its canonical id
//! - Tracing setup for binaries

pub mod address;
pub mod error;
pub mod init;
pub mod record;

pub use address::{Address, EXERCISE_KIND, TEMPLATE_KIND, WORKOUT_RECORD_KIND};
pub use error::{AddressError, RecordError};
pub use init::init_tracing;
pub use record::{Record, Tag, UnsignedRecord};

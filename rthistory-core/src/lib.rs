//! Retrieval of a patient's external-beam radiotherapy history from a
//! clinical archive into a local record store.

pub mod archive;
pub mod error;
pub mod retrieval;
pub mod store;

pub use error::{Result, RetrievalError};

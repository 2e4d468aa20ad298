//! Archive transports bundled with the crate.

pub mod mirror;

pub use mirror::MirrorArchive;

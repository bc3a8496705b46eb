//! File chunking and change tracking
//!
//! The [`FileChunker`] splits files into content-addressable chunks with
//! SHA-256 checksums and reassembles them with integrity verification. The
//! [`ChangeTracker`] uses chunk comparison (with cheap metadata shortcuts)
//! to decide whether a file changed since the last sync and which chunks
//! the delta engine needs to move.

pub mod chunker;
pub mod tracker;

pub use chunker::FileChunker;
pub use tracker::ChangeTracker;

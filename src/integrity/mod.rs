//! Integrity tracking core
//!
//! Keeps a persistent fingerprint (content hash + modification time) for every
//! tracked file and classifies each freshly scanned file against it. The
//! modification time is what separates an ordinary edit from corruption.

pub mod detector;
pub mod fingerprint;
pub mod session;
pub mod store;

pub use detector::{classify, FileStatus};
pub use fingerprint::{Database, FileFingerprint, HandledSet};
pub use session::ScanStats;
pub use store::{LoadedDatabase, Store};

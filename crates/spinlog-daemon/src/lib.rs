//! Daemon internals: the HTTP surface, the CSV cleaner behind it, and the
//! artwork lookup client. Split out of the binary so the integration tests
//! can drive the real router.

pub mod artwork;
pub mod http;
pub mod ingest;

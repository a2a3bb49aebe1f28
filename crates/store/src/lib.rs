//! Per-user persistence: append-only session context logs, the long-term
//! memory document, and the date-partitioned audit log.
//!
//! Everything here is append-only by construction.  New writes are always
//! additions; nothing ever edits or deletes previously written data.

mod audit_log;
mod memory_doc;
mod paths;
mod session_store;

pub use audit_log::AuditLog;
pub use memory_doc::MemoryDoc;
pub use paths::UserPaths;
pub use session_store::SessionStore;

pub mod audit;
pub mod context;
pub mod db;
pub mod event;
pub mod session;

pub use audit::{AuditRecord, NewAuditEntry};
pub use context::ContextRecord;
pub use db::Database;
pub use event::EventRecord;
pub use session::{MessageRecord, SessionRecord};

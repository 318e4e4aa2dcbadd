mod model;
mod repository;

pub use model::SyncAuditDB;
pub use repository::SyncAuditRepository;

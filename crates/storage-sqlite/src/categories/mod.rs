mod model;
mod repository;

pub use model::CategoryRuleDB;
pub use repository::CategoryRuleRepository;

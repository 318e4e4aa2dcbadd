mod model;
mod repository;

pub use model::{LedgerRowChangeset, LedgerRowDB};
pub use repository::LedgerRepository;

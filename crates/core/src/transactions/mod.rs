//! Canonical transaction model and payload normalization.

mod normalize;
mod transactions_model;

pub use normalize::{
    is_contract_address, normalize, normalize_currency, normalize_with, parse_decimal,
    parse_timestamp, DisplayConverter,
};
pub use transactions_model::{Direction, NormalizedTransaction, TxType};

pub mod ledger;
pub mod models;
pub mod store;

pub mod audit;
pub mod committer;
pub mod gateway;
pub mod ledger;

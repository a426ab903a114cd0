pub mod currency;
pub mod error;
pub mod fee;
pub mod idempotency;
pub mod ids;
pub mod option;
pub mod record;
pub mod tier;
pub mod transaction;

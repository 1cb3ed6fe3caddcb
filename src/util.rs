pub(crate) mod error;
pub mod retry;
pub mod time;

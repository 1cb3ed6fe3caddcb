#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub(crate) mod api;
pub mod app;
pub mod config;
pub mod history;
pub mod observability;
pub mod scheduler;
pub mod store;
pub mod subject;
pub mod trending;
pub mod util;

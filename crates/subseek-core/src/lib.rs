//! Domain logic for subseek: file intake, identity resolution, collection
//! grouping, selection and downloads, plus configuration and the session
//! store. Everything here is runtime-agnostic; the remote services are
//! reached through the traits in `subseek-api`.

pub mod config;
pub mod download;
pub mod error;
pub mod identity;
pub mod intake;
pub mod models;
pub mod normalize;
pub mod organize;
pub mod search;
pub mod selection;
pub mod storage;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use config::AppConfig;
pub use error::SubseekError;

// shared/src/lib.rs

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("malformed record for key '{0}': {1}")]
    Malformed(String, String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod config;

pub use config::StoreConfig;

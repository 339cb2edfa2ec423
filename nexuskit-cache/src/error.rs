use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

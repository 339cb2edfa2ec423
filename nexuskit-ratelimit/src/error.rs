use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("rate limit exceeded for key '{key}': {cost} requested, {remaining} remaining")]
    Exceeded {
        key: String,
        cost: u64,
        remaining: u64,
    },

    #[error("invalid rate limit configuration: {0}")]
    InvalidConfig(String),
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("handoff channel closed before the producer finished")]
    ChannelClosed,

    #[error("timed out waiting for the next item")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

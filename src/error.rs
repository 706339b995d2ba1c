//! Error types for the switchboard client.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request never produced a response (connect, timeout, body read)
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Response arrived but carried neither a success status nor a readable body
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Backend answered `{ok: false}`
    #[error("{0}")]
    Rejected(String),

    #[error("event stream closed by server")]
    StreamClosed,
}

impl Error {
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }
}

use thiserror::Error;

/// Failure modes of a drop-table fetch.
///
/// Clone-able on purpose: a single-flight fetch is awaited by every caller
/// that requested the same creature, and each of them receives the same
/// error value. `reqwest::Error` is not `Clone`, so transport errors are
/// carried as rendered strings.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("http request failed: {0}")]
    Http(String),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("malformed response from {0}")]
    Malformed(String),

    #[error("item resolver is gone")]
    ResolverGone,
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Http(e.to_string())
    }
}

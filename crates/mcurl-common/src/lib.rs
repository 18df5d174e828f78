use std::path::PathBuf;

pub mod config;

pub type Result<T> = core::result::Result<T, McurlError>;

/// Errors that stop a run before (or instead of) sending requests.
///
/// Anything that goes wrong with an individual request once the run has
/// started is a `RequestFailure` in the transport crate, not one of these.
#[derive(thiserror::Error, Debug)]
pub enum McurlError {
    #[error("no HTTP method provided")]
    MissingMethod,
    #[error("no URL provided")]
    MissingUrl,
    #[error("the number of requests per batch must be at least 1")]
    InvalidConcurrency,
    #[error("could not read the given file '{path}': {source}")]
    ReadBody {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not load config file '{path}': {reason}")]
    ConfigFile { path: PathBuf, reason: String },
    #[error("invalid header '{0}', expected 'Name: Value'")]
    InvalidHeader(String),
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("could not build the HTTP client: {0}")]
    Client(String),
    #[error("issue while initialising a request: {0}")]
    Request(String),
}

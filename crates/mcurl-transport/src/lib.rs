use std::fmt;
use std::future::Future;
use std::pin::Pin;

use mcurl_common::Result;

mod http;

pub use http::HttpTransport;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What came back from a request whose body was fully read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Exchange {
    pub status: u16,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendErrorKind {
    Connect,
    Timeout,
    Redirect,
    Other,
}

impl fmt::Display for SendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SendErrorKind::Connect => "connection refused or host unreachable",
            SendErrorKind::Timeout => "timeout",
            SendErrorKind::Redirect => "redirect loop",
            SendErrorKind::Other => "network error",
        };
        f.write_str(text)
    }
}

/// A single request that did not complete. Never fatal for the run.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestFailure {
    #[error("issue while running a request ({kind}): {reason}")]
    Send { kind: SendErrorKind, reason: String },
    #[error("issue while reading the response body (status {status}): {reason}")]
    Body { status: u16, reason: String },
    #[error("request task aborted: {0}")]
    Aborted(String),
}

impl RequestFailure {
    /// Status of the response, if one arrived before things went wrong.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestFailure::Body { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Performs requests for the load generator.
///
/// Building a request and performing it are split so that only the network
/// part is timed, and so construction problems (which mean the settings are
/// wrong) can be told apart from per-request failures.
pub trait Transport: Send + Sync + 'static {
    type Request: Send + 'static;

    /// Builds the request with sequence number `seq` (1-based within a batch).
    fn prepare(&self, seq: usize) -> Result<Self::Request>;

    /// Sends the request and reads the whole response body. The response must
    /// be released before the returned future resolves, whatever the outcome.
    fn perform(&self, request: Self::Request) -> BoxFuture<'_, core::result::Result<Exchange, RequestFailure>>;
}

#[cfg(feature = "mock")]
pub mod mock {
    use super::*;
    use mcurl_common::McurlError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// One scripted request: how long it takes and how it ends.
    #[derive(Debug, Clone)]
    pub struct Step {
        pub latency: Duration,
        pub result: core::result::Result<Exchange, RequestFailure>,
        /// Panic once the latency has elapsed instead of returning.
        pub crash: bool,
    }

    impl Step {
        pub fn ok(latency: Duration) -> Self {
            Self { latency, result: Ok(Exchange { status: 200, bytes: 0 }), crash: false }
        }

        pub fn status(latency: Duration, status: u16) -> Self {
            Self { latency, result: Ok(Exchange { status, bytes: 0 }), crash: false }
        }

        pub fn fail(latency: Duration, failure: RequestFailure) -> Self {
            Self { latency, result: Err(failure), crash: false }
        }

        pub fn crash(latency: Duration) -> Self {
            Self { crash: true, ..Self::ok(latency) }
        }

        pub fn refused(latency: Duration) -> Self {
            Self::fail(
                latency,
                RequestFailure::Send {
                    kind: SendErrorKind::Connect,
                    reason: "connection refused".into(),
                },
            )
        }
    }

    type Script = Box<dyn Fn(usize) -> Step + Send + Sync>;

    /// Plays back a script keyed by request sequence number, sleeping on the
    /// tokio clock so tests can run with paused time.
    pub struct ScriptedTransport {
        script: Script,
        rejected_seq: Option<usize>,
        prepared: AtomicUsize,
        performed: AtomicUsize,
    }

    impl ScriptedTransport {
        pub fn new(script: impl Fn(usize) -> Step + Send + Sync + 'static) -> Self {
            Self {
                script: Box::new(script),
                rejected_seq: None,
                prepared: AtomicUsize::new(0),
                performed: AtomicUsize::new(0),
            }
        }

        pub fn constant(latency: Duration) -> Self {
            Self::new(move |_| Step::ok(latency))
        }

        /// Makes building request `seq` fail, as a malformed request would.
        pub fn reject_seq(mut self, seq: usize) -> Self {
            self.rejected_seq = Some(seq);
            self
        }

        pub fn prepared(&self) -> usize { self.prepared.load(Ordering::SeqCst) }
        pub fn performed(&self) -> usize { self.performed.load(Ordering::SeqCst) }
    }

    impl Transport for ScriptedTransport {
        type Request = usize;

        fn prepare(&self, seq: usize) -> Result<usize> {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            if self.rejected_seq == Some(seq) {
                return Err(McurlError::Request(format!("scripted rejection of request {seq}")));
            }
            Ok(seq)
        }

        fn perform(&self, seq: usize) -> BoxFuture<'_, core::result::Result<Exchange, RequestFailure>> {
            Box::pin(async move {
                self.performed.fetch_add(1, Ordering::SeqCst);
                let step = (self.script)(seq);
                tokio::time::sleep(step.latency).await;
                if step.crash {
                    panic!("scripted crash of request {seq}");
                }
                step.result
            })
        }
    }
}

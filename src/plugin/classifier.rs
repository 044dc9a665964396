//! Error Classification
//!
//! Folds every failure raised while serving a plugin call into one domain
//! [`Error`]. Errors raised on purpose by the plugin core pass through
//! untouched; session faults go through the decision table in [`classify_cim`];
//! anything else becomes a plugin bug carrying its trace.

use crate::domain::ports::CimFault;
use crate::error::Error;
use std::future::Future;
use tracing::error;

/// Failure inside the plugin core, before classification
#[derive(Debug)]
pub enum Fault {
    /// Intentional domain error, never reclassified
    Domain(Error),
    /// Fault raised by the provider session
    Cim(CimFault),
    /// Anything else: malformed provider data, arithmetic errors
    Unexpected(anyhow::Error),
}

impl From<Error> for Fault {
    fn from(err: Error) -> Self {
        Fault::Domain(err)
    }
}

impl From<CimFault> for Fault {
    fn from(fault: CimFault) -> Self {
        Fault::Cim(fault)
    }
}

impl From<anyhow::Error> for Fault {
    fn from(err: anyhow::Error) -> Self {
        Fault::Unexpected(err)
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fault::Domain(e) => write!(f, "{}", e),
            Fault::Cim(e) => write!(f, "{}", e),
            Fault::Unexpected(e) => write!(f, "{:#}", e),
        }
    }
}

/// Result type used inside the plugin core
pub type FaultResult<T> = std::result::Result<T, Fault>;

/// Map a session fault to its domain error
pub fn classify_cim(fault: CimFault) -> Error {
    match fault {
        CimFault::Cim { code, description } => {
            if code == 0 {
                if description.contains("Socket error") {
                    if description.contains("Errno 111") {
                        return Error::NetworkConnRefused("Connection refused".into());
                    }
                    if description.contains("Errno 113") {
                        return Error::NetworkHostDown("Host is down".into());
                    }
                } else if description.contains("SSL error")
                    || description.contains("bad status line")
                    || description.contains("HTTP error")
                {
                    return Error::TransportCommunication(description);
                }
            }
            Error::plugin_bug(description)
        }
        CimFault::Auth(_) => Error::PluginAuthFailed("Unauthorized user".into()),
        CimFault::Http(message) => Error::NetworkError(message),
    }
}

/// Map any core fault to its domain error
pub fn classify(fault: Fault) -> Error {
    match fault {
        Fault::Domain(err) => err,
        Fault::Cim(fault) => classify_cim(fault),
        Fault::Unexpected(err) => {
            let trace = format!("{:?}", err);
            error!("Unexpected exception:\n{}", trace);
            Error::PluginBug {
                message: format!("{:#}", err),
                debug: Some(trace),
            }
        }
    }
}

/// Run one plugin operation and classify its failure exactly once
pub async fn guard<T, Fut>(operation: &str, fut: Fut) -> crate::error::Result<T>
where
    Fut: Future<Output = FaultResult<T>>,
{
    fut.await.map_err(|fault| {
        let err = classify(fault);
        tracing::debug!("{} failed: {}", operation, err);
        err
    })
}

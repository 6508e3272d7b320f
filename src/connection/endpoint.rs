use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::utils::error::TransportError;

/// A parsed broker connection endpoint.
///
/// Only `memory://<namespace>` is understood today: a process-wide
/// in-memory broker registered under `<namespace>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Memory { namespace: String },
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| TransportError::InvalidEndpoint {
            endpoint: s.to_string(),
            reason,
        };

        let url = Url::parse(s).map_err(|e| invalid(e.to_string()))?;

        match url.scheme() {
            "memory" => {
                let namespace = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| invalid("missing namespace name".to_string()))?;
                Ok(Endpoint::Memory {
                    namespace: namespace.to_string(),
                })
            }
            other => Err(invalid(format!("unsupported scheme '{other}'"))),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Memory { namespace } => write!(f, "memory://{namespace}"),
        }
    }
}

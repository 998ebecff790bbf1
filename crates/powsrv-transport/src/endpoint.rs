use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TransportError;

/// Address of a powsrv listener.
///
/// Accepted spellings:
/// - `unix:/tmp/powSrv.sock`, `unix:///tmp/powSrv.sock` or a bare path
/// - `tcp://127.0.0.1:5000`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Filesystem-path Unix domain socket.
    Unix(PathBuf),
    /// TCP `host:port`.
    Tcp(String),
}

impl Endpoint {
    /// Default server socket path.
    pub const DEFAULT_UNIX_PATH: &'static str = "/tmp/powSrv.sock";

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Endpoint::Unix(_) => "unix-domain-socket",
            Endpoint::Tcp(_) => "tcp",
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Unix(PathBuf::from(Self::DEFAULT_UNIX_PATH))
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TransportError::InvalidEndpoint {
                input: input.to_string(),
                reason: "endpoint must not be empty",
            });
        }

        if let Some(addr) = trimmed.strip_prefix("tcp://") {
            let valid = addr
                .rsplit_once(':')
                .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(TransportError::InvalidEndpoint {
                    input: input.to_string(),
                    reason: "expected tcp://host:port",
                });
            }
            return Ok(Endpoint::Tcp(addr.to_string()));
        }

        let path = match trimmed.strip_prefix("unix://") {
            Some(rest) => rest,
            None => trimmed.strip_prefix("unix:").unwrap_or(trimmed),
        };
        if path.is_empty() {
            return Err(TransportError::InvalidEndpoint {
                input: input.to_string(),
                reason: "unix endpoint needs a socket path",
            });
        }
        Ok(Endpoint::Unix(PathBuf::from(path)))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

impl From<PathBuf> for Endpoint {
    fn from(path: PathBuf) -> Self {
        Endpoint::Unix(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_path_as_unix() {
        let ep: Endpoint = "/tmp/powSrv.sock".parse().unwrap();
        assert_eq!(ep, Endpoint::Unix(PathBuf::from("/tmp/powSrv.sock")));
    }

    #[test]
    fn parses_unix_prefixes() {
        let a: Endpoint = "unix:/run/pow.sock".parse().unwrap();
        let b: Endpoint = "unix:///run/pow.sock".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "unix:/run/pow.sock");
    }

    #[test]
    fn parses_tcp() {
        let ep: Endpoint = "tcp://127.0.0.1:5000".parse().unwrap();
        assert_eq!(ep, Endpoint::Tcp("127.0.0.1:5000".to_string()));
        assert_eq!(ep.to_string(), "tcp://127.0.0.1:5000");
        assert_eq!(ep.transport_name(), "tcp");
    }

    #[test]
    fn rejects_bad_input() {
        assert!("".parse::<Endpoint>().is_err());
        assert!("unix:".parse::<Endpoint>().is_err());
        assert!("tcp://localhost".parse::<Endpoint>().is_err());
        assert!("tcp://:5000".parse::<Endpoint>().is_err());
        assert!("tcp://host:notaport".parse::<Endpoint>().is_err());
    }
}

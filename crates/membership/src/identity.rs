//! Server identity type for cluster membership

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::MembershipError;

/// Address and port of one server in the cluster.
///
/// Two identities are equal when their normalized forms (lowercase
/// `host:port`) are equal, so `HTTP://Node1:9554/` and `node1:9554` name the
/// same server.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ServerIdentity {
    host: String,
    port: u16,
}

impl ServerIdentity {
    /// Parses an identity from either `host:port` or `scheme://host[:port]`.
    ///
    /// URLs without an explicit port fall back to the scheme's default port.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError::Configuration`] naming the input if it is
    /// empty, not a valid address, carries a path, query or credentials, or
    /// has no port.
    pub fn parse(input: &str) -> Result<Self, MembershipError> {
        let trimmed = input.trim();
        let bad = |reason: &str| MembershipError::Configuration(format!("[{input}]: {reason}"));

        if trimmed.is_empty() {
            return Err(bad("empty address"));
        }

        // Bare `host:port` is parsed through a non-special scheme so IPv6
        // literals and port validation come from the same URL grammar.
        let has_scheme = trimmed.contains("://");
        let url = if has_scheme {
            Url::parse(trimmed)
        } else {
            Url::parse(&format!("qdb://{trimmed}"))
        }
        .map_err(|e| bad(&e.to_string()))?;

        if !url.username().is_empty() || url.password().is_some() {
            return Err(bad("credentials are not allowed"));
        }
        if !matches!(url.path(), "" | "/") || url.query().is_some() || url.fragment().is_some() {
            return Err(bad("only host and port are allowed"));
        }

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| bad("missing host"))?
            .to_ascii_lowercase();

        let port = if has_scheme {
            url.port_or_known_default()
        } else {
            url.port()
        }
        .ok_or_else(|| bad("missing port"))?;

        Ok(Self { host, port })
    }

    /// The normalized host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ServerIdentity {
    type Err = MembershipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ServerIdentity {
    type Error = MembershipError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ServerIdentity> for String {
    fn from(identity: ServerIdentity) -> Self {
        identity.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_host_port() {
        let identity = ServerIdentity::parse(" Node1:9554 ").unwrap();
        assert_eq!(identity.host(), "node1");
        assert_eq!(identity.port(), 9554);
        assert_eq!(identity.to_string(), "node1:9554");
    }

    #[test]
    fn test_parse_url_forms() {
        assert_eq!(
            ServerIdentity::parse("http://node1:9554/").unwrap(),
            ServerIdentity::parse("node1:9554").unwrap()
        );
        assert_eq!(
            ServerIdentity::parse("https://node1").unwrap().port(),
            443
        );
        assert_eq!(
            ServerIdentity::parse("[::1]:9554").unwrap().to_string(),
            "[::1]:9554"
        );
    }

    #[test]
    fn test_parse_rejects_bad_addresses() {
        for bad in ["", "node1", "node1:notaport", "node1:70000", "http://node1:1/x", "u:p@node1:1"] {
            assert_matches!(
                ServerIdentity::parse(bad),
                Err(MembershipError::Configuration(message)) if message.contains(bad),
                "expected [{bad}] to be rejected"
            );
        }
    }

    #[test]
    fn test_serde_as_string() {
        let identity = ServerIdentity::parse("node1:9554").unwrap();
        let json = serde_json::to_string(&identity).unwrap();
        assert_eq!(json, "\"node1:9554\"");

        let back: ServerIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, identity);
    }
}

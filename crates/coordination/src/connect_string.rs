use std::fmt;
use std::str::FromStr;

use crate::Error;

/// A parsed coordination service connect string:
/// `host:port[,host:port...][/chroot]`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectString {
    hosts: Vec<(String, u16)>,
    chroot: Option<String>,
}

impl ConnectString {
    /// Parses a connect string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConnectString`] if the string is empty, a host
    /// is missing or blank, a port is not a valid number, or the chroot suffix
    /// is `/` alone.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::InvalidConnectString {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("no hosts given"));
        }

        let (host_list, chroot) = match trimmed.find('/') {
            Some(idx) => {
                let chroot = trimmed[idx..].trim_end_matches('/');
                if chroot.is_empty() {
                    return Err(invalid("chroot must not be the root path"));
                }
                (&trimmed[..idx], Some(chroot.to_string()))
            }
            None => (trimmed, None),
        };

        let mut hosts = Vec::new();
        for entry in host_list.split(',') {
            let entry = entry.trim();
            let (host, port) = entry
                .rsplit_once(':')
                .ok_or_else(|| invalid(&format!("entry [{entry}] has no port")))?;
            if host.is_empty() {
                return Err(invalid(&format!("entry [{entry}] has no host")));
            }
            let port = port
                .parse::<u16>()
                .map_err(|e| invalid(&format!("entry [{entry}] has a bad port: {e}")))?;
            hosts.push((host.to_ascii_lowercase(), port));
        }

        Ok(Self { hosts, chroot })
    }

    /// The `(host, port)` pairs of the ensemble, in the order given.
    #[must_use]
    pub fn hosts(&self) -> &[(String, u16)] {
        &self.hosts
    }

    /// The chroot suffix applied to every path, if any.
    #[must_use]
    pub fn chroot(&self) -> Option<&str> {
        self.chroot.as_deref()
    }
}

impl FromStr for ConnectString {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hosts = self
            .hosts
            .iter()
            .map(|(host, port)| format!("{host}:{port}"))
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{hosts}{}", self.chroot.as_deref().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_ensemble_with_chroot() {
        let parsed = ConnectString::parse("zk1:2181, ZK2:2182/qdb/").unwrap();

        assert_eq!(
            parsed.hosts(),
            &[("zk1".to_string(), 2181), ("zk2".to_string(), 2182)]
        );
        assert_eq!(parsed.chroot(), Some("/qdb"));
        assert_eq!(parsed.to_string(), "zk1:2181,zk2:2182/qdb");
    }

    #[test]
    fn test_parse_rejects_bad_entries() {
        assert_matches!(
            ConnectString::parse(""),
            Err(Error::InvalidConnectString { .. })
        );
        assert_matches!(
            ConnectString::parse("zk1"),
            Err(Error::InvalidConnectString { reason, .. }) if reason.contains("no port")
        );
        assert_matches!(
            ConnectString::parse("zk1:abc"),
            Err(Error::InvalidConnectString { reason, .. }) if reason.contains("bad port")
        );
        assert_matches!(
            ConnectString::parse(":2181"),
            Err(Error::InvalidConnectString { reason, .. }) if reason.contains("no host")
        );
        assert_matches!(
            ConnectString::parse("zk1:2181/"),
            Err(Error::InvalidConnectString { .. })
        );
    }
}

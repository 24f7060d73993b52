//! Fixed cluster membership taken from configuration

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{MembershipError, ServerIdentity};

/// Capacity of the announcement channel. Only one message is ever sent.
const ANNOUNCEMENT_CAPACITY: usize = 1;

/// Announcement carrying the resolved cluster membership.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MembershipResolved {
    /// Every server in the cluster, in configuration order.
    pub servers: Vec<ServerIdentity>,
}

/// Resolves the servers of the cluster from a static server list.
///
/// All servers in the cluster are named in configuration. An empty list means
/// a single-node cluster made of this server only. The resolved list never
/// changes for the lifetime of the process.
#[derive(Debug)]
pub struct MembershipResolver {
    own_identity: ServerIdentity,
    servers: Vec<ServerIdentity>,
    announced: AtomicBool,
    sender: broadcast::Sender<MembershipResolved>,
}

impl MembershipResolver {
    /// Resolves `servers`, a comma-separated list of server addresses, for the
    /// server identified by `own_identity`.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError::Configuration`] if an entry cannot be parsed,
    /// an entry appears twice, or the list does not contain `own_identity`.
    pub fn resolve(
        own_identity: ServerIdentity,
        servers: &str,
    ) -> Result<Self, MembershipError> {
        let servers = if servers.trim().is_empty() {
            vec![own_identity.clone()]
        } else {
            let mut seen = HashSet::new();
            let mut resolved = Vec::new();

            for entry in servers.split(',') {
                let server = ServerIdentity::parse(entry).map_err(|e| {
                    MembershipError::Configuration(format!(
                        "servers property contains bad entry: {e}"
                    ))
                })?;

                if !seen.insert(server.clone()) {
                    return Err(MembershipError::Configuration(format!(
                        "servers property contains duplicate: [{}]",
                        entry.trim()
                    )));
                }

                resolved.push(server);
            }

            if !seen.contains(&own_identity) {
                return Err(MembershipError::Configuration(format!(
                    "servers property does not contain this server: {own_identity}"
                )));
            }

            resolved
        };

        info!("Resolved cluster of {} server(s) for {}", servers.len(), own_identity);

        let (sender, _) = broadcast::channel(ANNOUNCEMENT_CAPACITY);

        Ok(Self {
            own_identity,
            servers,
            announced: AtomicBool::new(false),
            sender,
        })
    }

    /// This server's identity.
    #[must_use]
    pub const fn own_identity(&self) -> &ServerIdentity {
        &self.own_identity
    }

    /// Every server in the cluster, this one included.
    #[must_use]
    pub fn servers(&self) -> &[ServerIdentity] {
        &self.servers
    }

    /// Subscribe to the membership announcement.
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipResolved> {
        self.sender.subscribe()
    }

    /// Publishes the resolved membership to current subscribers. Only the first
    /// call publishes; returns whether this call did.
    pub fn announce(&self) -> bool {
        if self
            .announced
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Membership already announced");
            return false;
        }

        let event = MembershipResolved {
            servers: self.servers.clone(),
        };
        match self.sender.send(event) {
            Ok(receivers) => debug!("Announced membership to {} subscriber(s)", receivers),
            Err(_) => debug!("Announced membership with no subscribers"),
        }

        true
    }

    /// Human-readable summary of the resolved membership.
    #[must_use]
    pub fn status(&self) -> String {
        let servers = self
            .servers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        format!("Found [{servers}]")
    }

    /// Nothing to release; present for lifecycle symmetry with the other
    /// components.
    #[allow(clippy::unused_async)]
    pub async fn close(&self) -> Result<(), MembershipError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn identity(s: &str) -> ServerIdentity {
        ServerIdentity::parse(s).unwrap()
    }

    #[test]
    fn test_empty_list_is_single_node_cluster() {
        let resolver = MembershipResolver::resolve(identity("a:9554"), "  ").unwrap();
        assert_eq!(resolver.servers(), &[identity("a:9554")]);
    }

    #[test]
    fn test_distinct_entries_resolve() {
        let resolver =
            MembershipResolver::resolve(identity("b:9554"), "a:9554, b:9554,http://c:9554").unwrap();
        assert_eq!(resolver.servers().len(), 3);
        assert_eq!(resolver.status(), "Found [a:9554, b:9554, c:9554]");
    }

    #[test]
    fn test_duplicate_is_rejected() {
        let err = MembershipResolver::resolve(identity("a:9554"), "a:9554,b:9554,A:9554")
            .unwrap_err();
        assert_matches!(err, MembershipError::Configuration(message) if message.contains("duplicate: [A:9554]"));
    }

    #[test]
    fn test_missing_self_is_rejected() {
        let err = MembershipResolver::resolve(identity("a:9554"), "b:9554,c:9554").unwrap_err();
        assert_matches!(err, MembershipError::Configuration(message) if message.contains("a:9554"));
    }

    #[test]
    fn test_bad_entry_is_rejected() {
        let err = MembershipResolver::resolve(identity("a:9554"), "a:9554,,b:9554").unwrap_err();
        assert_matches!(err, MembershipError::Configuration(message) if message.contains("bad entry"));
    }

    #[tokio::test]
    async fn test_announces_exactly_once() {
        let resolver = MembershipResolver::resolve(identity("a:9554"), "a:9554,b:9554").unwrap();
        let mut rx = resolver.subscribe();

        assert!(resolver.announce());
        assert!(!resolver.announce());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.servers, vec![identity("a:9554"), identity("b:9554")]);
        assert_matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Empty));

        resolver.close().await.unwrap();
    }
}

use std::time::Duration;

use assert_matches::assert_matches;
use qdb_coordination::{
    ConnectString, ConnectionState, CoordinationErrorKind, CoordinationService,
};
use qdb_coordination_memory::{MemoryCoordination, MemoryEnsemble};
use qdb_metadata::{
    ADMIN_USER_ID, Database, Node, Queue, Repository, RepositoryError, RepositoryOptions,
    RepositoryStatus, SessionOptions, StoreError, User,
};
use tracing_test::traced_test;

const ADMIN_HASH: &str = "$2a$10$initialadminhash";

fn options() -> RepositoryOptions {
    let session = SessionOptions::new(ConnectString::parse("127.0.0.1:2181").unwrap());
    let mut options = RepositoryOptions::new(session, ADMIN_HASH);
    options.cluster_name = "c1".to_string();
    options
}

async fn wait_until<F>(repository: &Repository<MemoryCoordination>, predicate: F) -> RepositoryStatus
where
    F: Fn(&RepositoryStatus) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let status = repository.get_status();
            if predicate(&status) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("status never matched, last: {:?}", repository.get_status()))
}

async fn ready_repository() -> (Repository<MemoryCoordination>, MemoryCoordination) {
    let memory = MemoryCoordination::new();
    let repository = Repository::new(memory.clone(), options()).unwrap();
    repository.start().await.unwrap();
    wait_until(&repository, |s| s.ready).await;
    (repository, memory)
}

fn expected_schema() -> Vec<&'static str> {
    vec![
        "/qdb",
        "/qdb/c1",
        "/qdb/c1/databases",
        "/qdb/c1/nodes",
        "/qdb/c1/queues",
        "/qdb/c1/users",
        "/qdb/c1/users/admin",
    ]
}

#[tokio::test]
#[traced_test]
async fn test_bootstrap_creates_schema_and_admin() {
    let (repository, memory) = ready_repository().await;

    let status = repository.get_status();
    assert_eq!(status.state, ConnectionState::Connected);
    assert!(status.ready_since.is_some());
    assert!(!status.read_only);
    assert_eq!(status.detail, None);

    assert_eq!(memory.ensemble().paths().await, expected_schema());

    let admin = repository.find_user(ADMIN_USER_ID).await.unwrap().unwrap();
    assert_eq!(admin.id, ADMIN_USER_ID);
    assert_eq!(admin.password_hash, ADMIN_HASH);
    assert!(admin.is_admin);

    repository.shutdown().await;
    let status = repository.get_status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert!(!status.ready);
}

#[tokio::test]
#[traced_test]
async fn test_concurrent_bootstrap_converges() {
    let ensemble = MemoryEnsemble::new();
    let first = Repository::new(ensemble.client(), options()).unwrap();
    let second = Repository::new(ensemble.client(), options()).unwrap();

    let (a, b) = tokio::join!(first.start(), second.start());
    a.unwrap();
    b.unwrap();

    wait_until(&first, |s| s.ready).await;
    wait_until(&second, |s| s.ready).await;

    assert_eq!(ensemble.paths().await, expected_schema());
    assert_eq!(first.count_users().await.unwrap(), 1);

    first.shutdown().await;
    second.shutdown().await;
}

#[tokio::test]
async fn test_bootstrap_is_idempotent_across_restarts() {
    let ensemble = MemoryEnsemble::new();

    let repository = Repository::new(ensemble.client(), options()).unwrap();
    repository.start().await.unwrap();
    wait_until(&repository, |s| s.ready).await;
    repository
        .create_user(&User::new("alice", "h", false))
        .await
        .unwrap();
    repository.shutdown().await;

    let restarted = Repository::new(ensemble.client(), options()).unwrap();
    restarted.start().await.unwrap();
    wait_until(&restarted, |s| s.ready).await;

    assert_eq!(restarted.count_users().await.unwrap(), 2);
    restarted.shutdown().await;
}

#[tokio::test]
async fn test_expiry_clears_readiness_until_reconnect() {
    let (repository, memory) = ready_repository().await;
    let first_ready = repository.get_status().ready_since.unwrap();

    memory.expire_session().await;
    let status = wait_until(&repository, |s| s.state == ConnectionState::Expired).await;
    assert!(!status.ready);
    assert_eq!(status.ready_since, None);

    memory.reconnect().await;
    let status = wait_until(&repository, |s| s.ready).await;
    assert_eq!(status.state, ConnectionState::Connected);
    assert!(status.ready_since.unwrap() >= first_ready);

    repository.shutdown().await;
}

#[tokio::test]
async fn test_status_subscribers_see_every_transition() {
    let memory = MemoryCoordination::new();
    let repository = Repository::new(memory.clone(), options()).unwrap();
    let mut subscription = repository.subscribe();

    repository.start().await.unwrap();

    let connecting = subscription.recv().await.unwrap();
    assert_eq!(connecting.state, ConnectionState::Connected);
    assert!(!connecting.ready);

    let ready = subscription.recv().await.unwrap();
    assert!(ready.ready);

    memory.drop_connection().await;
    let dropped = subscription.recv().await.unwrap();
    assert_eq!(dropped.state, ConnectionState::Disconnected);
    assert!(!dropped.ready);

    repository.shutdown().await;
}

#[tokio::test]
#[traced_test]
async fn test_partial_bootstrap_failure_recovers() {
    let memory = MemoryCoordination::new();
    memory
        .fail_path("/qdb/c1/queues", CoordinationErrorKind::ConnectionLoss)
        .await;

    let repository = Repository::new(memory.clone(), options()).unwrap();
    repository.start().await.unwrap();

    let status = wait_until(&repository, |s| s.detail.is_some()).await;
    assert_eq!(status.state, ConnectionState::Connected);
    assert!(!status.ready);
    assert!(status.detail.unwrap().contains("/qdb/c1/queues"));

    // Namespaces before the failing one were ensured, the rest were not.
    let paths = memory.ensemble().paths().await;
    assert!(paths.contains(&"/qdb/c1/databases".to_string()));
    assert!(!paths.contains(&"/qdb/c1/users".to_string()));

    memory.clear_faults().await;
    memory.drop_connection().await;
    wait_until(&repository, |s| s.state == ConnectionState::Disconnected).await;
    memory.reconnect().await;

    let status = wait_until(&repository, |s| s.ready).await;
    assert_eq!(status.detail, None);
    assert_eq!(memory.ensemble().paths().await, expected_schema());

    repository.shutdown().await;
}

#[tokio::test]
async fn test_create_and_find_user() {
    let (repository, _memory) = ready_repository().await;

    let alice = User::new("alice", "hash-a", false);
    repository.create_user(&alice).await.unwrap();

    let found = repository.find_user("alice").await.unwrap().unwrap();
    assert_eq!(found, alice);

    assert_matches!(
        repository.create_user(&User::new("alice", "other", true)).await,
        Err(RepositoryError::DuplicateEntity { kind: "user", id }) if id == "alice"
    );
    assert_eq!(repository.find_user("bob").await.unwrap(), None);

    repository.shutdown().await;
}

#[tokio::test]
async fn test_stored_body_has_no_id() {
    let (repository, memory) = ready_repository().await;
    repository
        .create_user(&User::new("alice", "hash-a", false))
        .await
        .unwrap();

    let reader = memory.ensemble().client();
    let (watcher, _events) = tokio::sync::mpsc::unbounded_channel();
    reader
        .connect(
            &ConnectString::parse("127.0.0.1:2181").unwrap(),
            Duration::from_secs(1),
            watcher,
        )
        .await
        .unwrap();

    let body = reader.get_data("/qdb/c1/users/alice").await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "passwordHash": "hash-a", "isAdmin": false })
    );

    repository.shutdown().await;
}

#[tokio::test]
async fn test_user_listing_and_count_agree() {
    let (repository, _memory) = ready_repository().await;

    for id in ["dave", "bob", "carol"] {
        repository
            .create_user(&User::new(id, "h", false))
            .await
            .unwrap();
    }

    let all = repository.find_users(0, usize::MAX).await.unwrap();
    assert_eq!(repository.count_users().await.unwrap(), all.len());

    let ids: Vec<_> = all.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["admin", "bob", "carol", "dave"]);

    // Listings carry the id only.
    assert!(all.iter().all(|u| u.password_hash.is_empty() && !u.is_admin));

    let page: Vec<_> = repository
        .find_users(1, 2)
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.id)
        .collect();
    assert_eq!(page, vec!["bob", "carol"]);
    assert!(repository.find_users(10, 5).await.unwrap().is_empty());

    repository.shutdown().await;
}

#[tokio::test]
async fn test_transient_failure_is_storage_unavailable() {
    let (repository, memory) = ready_repository().await;

    memory.fail_next(CoordinationErrorKind::ConnectionLoss).await;
    assert_matches!(
        repository.create_user(&User::new("alice", "h", false)).await,
        Err(RepositoryError::StorageUnavailable(StoreError::Transient {
            kind: CoordinationErrorKind::ConnectionLoss,
            ..
        }))
    );

    memory.fail_next(CoordinationErrorKind::SessionExpired).await;
    assert_matches!(
        repository.count_users().await,
        Err(RepositoryError::StorageUnavailable(_))
    );

    // The ambiguous create did not happen.
    assert_eq!(repository.find_user("alice").await.unwrap(), None);

    repository.shutdown().await;
}

#[tokio::test]
async fn test_read_only_session_serves_reads() {
    let (repository, memory) = ready_repository().await;

    memory.degrade().await;
    let status =
        wait_until(&repository, |s| s.state == ConnectionState::ConnectedReadOnly).await;
    assert!(status.read_only);
    assert!(!status.ready);

    assert!(repository.find_user(ADMIN_USER_ID).await.unwrap().is_some());
    assert_matches!(
        repository.create_user(&User::new("alice", "h", false)).await,
        Err(RepositoryError::StorageUnavailable(StoreError::Transient {
            kind: CoordinationErrorKind::NotReadOnly,
            ..
        }))
    );

    memory.reconnect().await;
    wait_until(&repository, |s| s.ready).await;
    repository.shutdown().await;
}

#[tokio::test]
async fn test_invalid_ids_are_rejected() {
    let (repository, _memory) = ready_repository().await;

    assert_matches!(
        repository.create_user(&User::new("a/b", "h", false)).await,
        Err(RepositoryError::InvalidId { kind: "user", .. })
    );
    assert_matches!(
        repository.find_node("").await,
        Err(RepositoryError::InvalidId { kind: "node", .. })
    );

    repository.shutdown().await;
}

#[tokio::test]
async fn test_nodes() {
    let (repository, _memory) = ready_repository().await;

    let node = Node {
        id: "node-1".to_string(),
        address: "10.0.0.1:9554".to_string(),
    };
    repository.create_node(&node).await.unwrap();

    assert_eq!(repository.find_node("node-1").await.unwrap(), Some(node.clone()));
    assert_eq!(repository.find_nodes().await.unwrap(), vec![node.clone()]);
    assert_eq!(repository.count_nodes().await.unwrap(), 1);
    assert_matches!(
        repository.create_node(&node).await,
        Err(RepositoryError::DuplicateEntity { kind: "node", .. })
    );

    repository.shutdown().await;
}

#[tokio::test]
async fn test_databases_and_queues() {
    let (repository, _memory) = ready_repository().await;

    for (id, owner) in [("orders", "alice"), ("billing", "bob")] {
        repository
            .create_database(&Database {
                id: id.to_string(),
                owner: owner.to_string(),
            })
            .await
            .unwrap();
    }
    assert_eq!(repository.count_databases().await.unwrap(), 2);

    let alice = User::new("alice", "h", false);
    let visible = repository.find_databases_visible_to(&alice).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, "orders");

    let admin = repository.find_user(ADMIN_USER_ID).await.unwrap().unwrap();
    assert_eq!(
        repository.find_databases_visible_to(&admin).await.unwrap().len(),
        2
    );

    let incoming = Queue {
        id: "q1".to_string(),
        database: "orders".to_string(),
        name: "incoming".to_string(),
    };
    repository.create_queue(&incoming).await.unwrap();
    repository
        .create_queue(&Queue {
            id: "q2".to_string(),
            database: "billing".to_string(),
            name: "incoming".to_string(),
        })
        .await
        .unwrap();

    assert_matches!(
        repository
            .create_queue(&Queue {
                id: "q3".to_string(),
                database: "orders".to_string(),
                name: "incoming".to_string(),
            })
            .await,
        Err(RepositoryError::DuplicateEntity { kind: "queue", .. })
    );

    assert_eq!(repository.find_queues("orders").await.unwrap(), vec![incoming.clone()]);
    assert_eq!(
        repository.find_queue("orders", "q1").await.unwrap(),
        Some(incoming.clone())
    );
    assert_eq!(
        repository.find_queue("orders", "incoming").await.unwrap(),
        Some(incoming)
    );
    // An id from another database does not match.
    assert_eq!(repository.find_queue("orders", "q2").await.unwrap(), None);

    repository.shutdown().await;
}

#[tokio::test]
async fn test_expiry_during_bootstrap_never_reports_ready() {
    let memory = MemoryCoordination::new();
    memory.set_latency(Some(Duration::from_millis(100))).await;

    let repository = Repository::new(memory.clone(), options()).unwrap();
    let mut subscription = repository.subscribe();
    repository.start().await.unwrap();

    // Wait until bootstrap is working on the admin user.
    tokio::time::timeout(Duration::from_secs(5), async {
        while !memory
            .ensemble()
            .paths()
            .await
            .contains(&"/qdb/c1/users".to_string())
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(!repository.get_status().ready);

    memory.expire_session().await;

    let mut published = Vec::new();
    while let Ok(Some(status)) =
        tokio::time::timeout(Duration::from_millis(500), subscription.recv()).await
    {
        published.push(status);
    }

    assert!(
        published.iter().all(|s| !s.ready),
        "ready published for an expired session: {published:?}"
    );
    assert_eq!(
        published.last().map(|s| s.state),
        Some(ConnectionState::Expired)
    );
    assert_eq!(repository.get_status().state, ConnectionState::Expired);

    memory.set_latency(None).await;
    memory.reconnect().await;
    wait_until(&repository, |s| s.ready).await;

    repository.shutdown().await;
}

//! Session-oriented client to the coordination service.

use std::error::Error as StdError;
use std::fmt::{self, Debug};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use qdb_coordination::{
    ConnectString, ConnectionState, CoordinationErrorKind, CoordinationService, SessionEvent,
};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::StoreError;

/// Default session timeout negotiated with the coordination service.
const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(20);

/// Default bound on a single primitive call.
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// How long shutdown waits for the session task to finish.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for the metadata store session.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Where the coordination service ensemble is.
    pub connect_string: ConnectString,

    /// Session timeout requested from the coordination service.
    pub session_timeout: Duration,

    /// Upper bound on a single primitive call; elapsing maps to a transient error.
    pub operation_timeout: Duration,
}

impl SessionOptions {
    /// Options for `connect_string` with default timeouts.
    #[must_use]
    pub const fn new(connect_string: ConnectString) -> Self {
        Self {
            connect_string,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

/// A connection state change, stamped with the session generation it opened.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Transition {
    /// State before the change.
    pub previous: ConnectionState,

    /// State after the change.
    pub current: ConnectionState,

    /// Generation reached by this change. Every applied transition bumps it.
    pub generation: u64,
}

/// Reacts to connection state transitions of a [`MetadataStoreClient`].
///
/// Transitions are handed over one at a time, in order; the next one is not
/// delivered until the previous call returns. Session events keep being
/// applied to the client's state while a handler runs, so a handler can ask
/// [`MetadataStoreClient::is_current`] whether its transition is still the
/// latest.
#[async_trait]
pub trait SessionHandler
where
    Self: Send + Sync + 'static,
{
    /// Handle `transition`.
    async fn on_transition(
        &self,
        transition: Transition,
    ) -> Result<(), Box<dyn StdError + Send + Sync>>;
}

/// Bootable state for the session task
#[derive(Debug, Default)]
struct BootableState {
    session_task: Option<JoinHandle<()>>,
    shutdown_signal: Option<oneshot::Sender<()>>,
}

/// Long-lived session to the coordination service plus the primitive node
/// operations the metadata layer needs.
///
/// Raw coordination errors never leave this type: they are translated into
/// [`StoreError`] at the call site.
pub struct MetadataStoreClient<C>
where
    C: CoordinationService,
{
    service: C,
    options: SessionOptions,
    state: Arc<watch::Sender<ConnectionState>>,
    generation: Arc<AtomicU64>,
    bootable_state: Arc<Mutex<BootableState>>,
}

impl<C> MetadataStoreClient<C>
where
    C: CoordinationService,
{
    /// Creates a client. No session is opened until [`start`](Self::start).
    pub fn new(service: C, options: SessionOptions) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            service,
            options,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
            bootable_state: Arc::new(Mutex::new(BootableState::default())),
        }
    }

    /// Opens the session and starts handing transitions to `handler`.
    ///
    /// # Errors
    ///
    /// Returns a transient [`StoreError`] if the session cannot be opened.
    pub async fn start<H: SessionHandler>(&self, handler: Arc<H>) -> Result<(), StoreError> {
        let mut bootable_state = self.bootable_state.lock().await;
        if bootable_state.session_task.is_some() {
            warn!("Metadata store session already started");
            return Ok(());
        }

        info!(
            "Connecting to coordination service [{}] sessionTimeout {:?}",
            self.options.connect_string, self.options.session_timeout
        );

        let (watcher, events) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        self.call("/", async {
            self.service
                .connect(
                    &self.options.connect_string,
                    self.options.session_timeout,
                    watcher,
                )
                .await
        })
        .await?;

        let task = tokio::spawn(Self::run_session(
            Arc::clone(&self.state),
            Arc::clone(&self.generation),
            events,
            shutdown_rx,
            handler,
        ));

        bootable_state.session_task = Some(task);
        bootable_state.shutdown_signal = Some(shutdown_tx);

        Ok(())
    }

    /// Closes the session and stops the session task.
    pub async fn shutdown(&self) {
        info!("Closing metadata store session");

        if let Err(e) = self.service.close().await {
            warn!("Failed to close coordination session cleanly: {}", e);
        }

        let mut bootable_state = self.bootable_state.lock().await;

        if let Some(shutdown_signal) = bootable_state.shutdown_signal.take() {
            let _ = shutdown_signal.send(());
        }

        if let Some(task) = bootable_state.session_task.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await {
                Ok(Ok(())) => debug!("Session task completed"),
                Ok(Err(e)) => warn!("Session task failed: {}", e),
                Err(_) => warn!("Session task did not shut down within timeout"),
            }
        }

        self.generation.fetch_add(1, Ordering::AcqRel);
        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// The current connection state. Never blocks.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Generation of the latest applied transition.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether no transition was applied after the one that reached
    /// `generation`.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Creates a node holding `data`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the node exists, `NotFound` if its parent does not,
    /// `Transient` otherwise.
    pub async fn create_node(&self, path: &str, data: Bytes) -> Result<(), StoreError> {
        self.call(path, self.service.create(path, data)).await
    }

    /// Reads the payload of a node.
    ///
    /// # Errors
    ///
    /// `NotFound` if the node does not exist, `Transient` otherwise.
    pub async fn get_node(&self, path: &str) -> Result<Bytes, StoreError> {
        self.call(path, self.service.get_data(path)).await
    }

    /// Lists the child names of a node, sorted.
    ///
    /// # Errors
    ///
    /// `NotFound` if the node does not exist, `Transient` otherwise.
    pub async fn list_children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let mut children = self.call(path, self.service.get_children(path)).await?;
        children.sort_unstable();
        Ok(children)
    }

    /// Counts the children of a node.
    ///
    /// # Errors
    ///
    /// `NotFound` if the node does not exist, `Transient` otherwise.
    pub async fn child_count(&self, path: &str) -> Result<usize, StoreError> {
        self.call(path, self.service.exists(path))
            .await?
            .map(|stat| stat.num_children)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    /// Runs one call against the service, bounded by the operation timeout,
    /// translating its error.
    async fn call<T, F>(&self, path: &str, operation: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, C::Error>>,
    {
        match tokio::time::timeout(self.options.operation_timeout, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let translated = StoreError::from_coordination(path, &e);
                debug!(path, error = %e, "Metadata store call failed");
                Err(translated)
            }
            Err(_) => Err(StoreError::Transient {
                path: path.to_string(),
                kind: CoordinationErrorKind::Timeout,
                reason: format!("timed out after {:?}", self.options.operation_timeout),
            }),
        }
    }

    /// Applies session events to the connection state as they arrive, and
    /// hands the resulting transitions to `handler` in order on a separate
    /// task, until shutdown or until the service drops the watcher.
    async fn run_session<H: SessionHandler>(
        state: Arc<watch::Sender<ConnectionState>>,
        generation: Arc<AtomicU64>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        mut shutdown_rx: oneshot::Receiver<()>,
        handler: Arc<H>,
    ) {
        let (transitions_tx, transitions_rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(Self::dispatch(transitions_rx, handler));

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("Session watcher closed");
                        break;
                    };

                    let previous = *state.borrow();
                    let Some(current) = previous.transition(event) else {
                        debug!("Ignoring {:?} in state {}", event, previous);
                        continue;
                    };

                    info!(from = %previous, to = %current, "Metadata store connection state changed");

                    // Bump first so no handler sees the new state as current.
                    let stamp = generation.fetch_add(1, Ordering::AcqRel) + 1;
                    state.send_replace(current);

                    let _ = transitions_tx.send(Transition {
                        previous,
                        current,
                        generation: stamp,
                    });
                }
                _ = &mut shutdown_rx => {
                    info!("Session task shutting down");
                    break;
                }
            }
        }

        drop(transitions_tx);
        if let Err(e) = dispatcher.await {
            warn!("Session handler task failed: {}", e);
        }
    }

    async fn dispatch<H: SessionHandler>(
        mut transitions: mpsc::UnboundedReceiver<Transition>,
        handler: Arc<H>,
    ) {
        while let Some(transition) = transitions.recv().await {
            let current = transition.current;

            // A failing or panicking handler must not stop the loop.
            match AssertUnwindSafe(handler.on_transition(transition))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Failed to handle transition to {}: {}", current, e),
                Err(_) => error!("Session handler panicked on transition to {}", current),
            }
        }
    }
}

impl<C> Clone for MetadataStoreClient<C>
where
    C: CoordinationService,
{
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            options: self.options.clone(),
            state: Arc::clone(&self.state),
            generation: Arc::clone(&self.generation),
            bootable_state: Arc::clone(&self.bootable_state),
        }
    }
}

impl<C> Debug for MetadataStoreClient<C>
where
    C: CoordinationService,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataStoreClient")
            .field("connect_string", &self.options.connect_string.to_string())
            .field("state", &self.connection_state())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

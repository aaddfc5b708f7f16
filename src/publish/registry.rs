use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A running file server, owned by the registry while it is bound
#[derive(Debug)]
pub struct ServerHandle {
    id: u64,
    file: PathBuf,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn new(id: u64, file: PathBuf, shutdown: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            id,
            file,
            shutdown,
            task,
        }
    }

    /// Signal graceful shutdown and wait for the serving task to finish
    async fn stop(self) {
        // Err means the server already stopped on its own
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            debug!(error = %e, "File server task ended abnormally");
        }
    }
}

/// Port → running server map shared by the publisher and the retention scheduler.
///
/// A port is present exactly while its server is bound; entries are removed
/// before the server is stopped.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: Arc<Mutex<HashMap<u16, ServerHandle>>>,
    next_id: Arc<AtomicU64>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier distinguishing successive servers on the same port
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register(&self, port: u16, handle: ServerHandle) {
        Self::insert(&mut self.lock(), port, handle);
    }

    /// Start a server task and register it under one lock.
    ///
    /// `spawn` runs while the map is locked, so a server that exits at once
    /// cannot `forget` itself before its entry exists.
    pub fn spawn_registered<F>(
        &self,
        port: u16,
        id: u64,
        file: PathBuf,
        shutdown: oneshot::Sender<()>,
        spawn: F,
    ) where
        F: FnOnce() -> JoinHandle<()>,
    {
        let mut servers = self.lock();
        let task = spawn();
        Self::insert(&mut servers, port, ServerHandle::new(id, file, shutdown, task));
    }

    fn insert(servers: &mut HashMap<u16, ServerHandle>, port: u16, handle: ServerHandle) {
        if let Some(stale) = servers.insert(port, handle) {
            // Cannot happen while the OS refuses a second bind on the port
            stale.task.abort();
        }
    }

    pub fn contains(&self, port: u16) -> bool {
        self.lock().contains_key(&port)
    }

    pub fn file_for(&self, port: u16) -> Option<PathBuf> {
        self.lock().get(&port).map(|h| h.file.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.lock().keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    /// Remove and stop the server on `port`. Returns `false` when nothing was
    /// registered there, which is not an error.
    pub async fn shutdown(&self, port: u16) -> bool {
        let handle = self.lock().remove(&port);
        match handle {
            Some(handle) => {
                handle.stop().await;
                info!(port, "File server shut down");
                true
            }
            None => {
                debug!(port, "No file server registered on port");
                false
            }
        }
    }

    /// Drop the entry for `port` only if it still belongs to server `id`.
    /// Used by a server whose serve loop ended without a shutdown request.
    pub(crate) fn forget(&self, port: u16, id: u64) {
        let mut servers = self.lock();
        if servers.get(&port).is_some_and(|h| h.id == id) {
            servers.remove(&port);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u16, ServerHandle>> {
        self.servers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_server(registry: &ServerRegistry, file: &str) -> (u64, ServerHandle) {
        let id = registry.next_id();
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _ = rx.await;
        });
        (id, ServerHandle::new(id, PathBuf::from(file), tx, task))
    }

    #[tokio::test]
    async fn test_register_and_shutdown() {
        let registry = ServerRegistry::new();
        let (_, handle) = idle_server(&registry, "temp/a.mp4");

        registry.register(8123, handle);
        assert!(registry.contains(8123));
        assert_eq!(registry.file_for(8123), Some(PathBuf::from("temp/a.mp4")));

        assert!(registry.shutdown(8123).await);
        assert!(!registry.contains(8123));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let registry = ServerRegistry::new();
        let (_, handle) = idle_server(&registry, "temp/a.mp4");
        registry.register(8123, handle);

        assert!(registry.shutdown(8123).await);
        assert!(!registry.shutdown(8123).await);
        assert!(!registry.shutdown(9999).await);
    }

    #[tokio::test]
    async fn test_forget_ignores_newer_server() {
        let registry = ServerRegistry::new();
        let (old_id, old) = idle_server(&registry, "temp/old.mp4");
        registry.register(8123, old);
        registry.shutdown(8123).await;

        let (_, new) = idle_server(&registry, "temp/new.mp4");
        registry.register(8123, new);

        // The old server's exit must not evict the replacement
        registry.forget(8123, old_id);
        assert_eq!(registry.file_for(8123), Some(PathBuf::from("temp/new.mp4")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_server_exiting_immediately_leaves_no_entry() {
        let registry = ServerRegistry::new();

        for port in 8200..8232 {
            let id = registry.next_id();
            let (tx, _rx) = oneshot::channel();
            let exiting = registry.clone();
            registry.spawn_registered(port, id, PathBuf::from("temp/x.mp4"), tx, || {
                tokio::spawn(async move {
                    exiting.forget(port, id);
                })
            });
        }

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_ports_sorted() {
        let registry = ServerRegistry::new();
        for port in [8500, 8100, 8300] {
            let (_, handle) = idle_server(&registry, "temp/x");
            registry.register(port, handle);
        }
        assert_eq!(registry.ports(), vec![8100, 8300, 8500]);
        assert_eq!(registry.len(), 3);
    }
}

//! Save/delete orchestration and the reconciliation engine
//!
//! [`SyncEngine`] owns the routing decision between the remote service and
//! the local cache, reconciles offline-made changes once connectivity
//! returns, and folds push notifications into the sync state store. It is
//! the only writer of both the cache and the store; everything else reads
//! snapshots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::cache::{CacheStore, CREDENTIAL_KEY};
use crate::error::{Error, Result};
use crate::models::{is_local_id, mint_local_id, Item};
use crate::net::ConnectivityMonitor;
use crate::remote::{ChangeKind, PushHandle, PushMessage, RemoteApi};
use crate::store::{SyncEvent, SyncStore};

/// Aggregate outcome of one reconciliation run.
///
/// Per-record failures are isolated and reported here in aggregate rather
/// than per record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Cache records examined
    pub examined: usize,
    /// Entities created remotely (no remote twin existed)
    pub created: usize,
    /// Entities updated remotely (fields diverged)
    pub updated: usize,
    /// Entities already field-equal with their remote twin
    pub unchanged: usize,
    /// Records that could not be reconciled
    pub failed: usize,
}

impl ReconcileReport {
    /// Corrective calls issued against the remote service
    #[must_use]
    pub const fn corrective_calls(&self) -> usize {
        self.created + self.updated
    }

    /// Whether every record reconciled without error
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

enum RecordOutcome {
    Created,
    Updated,
    Unchanged,
}

/// The offline-first synchronization engine.
///
/// Constructed once at startup and injected into callers; `start` spawns
/// the connectivity and push listener tasks, `shutdown` revokes them so a
/// torn-down engine is never mutated afterwards.
pub struct SyncEngine {
    remote: Arc<dyn RemoteApi>,
    cache: Arc<dyn CacheStore>,
    store: SyncStore,
    monitor: ConnectivityMonitor,
    credential: RwLock<String>,
    // Serializes reconciliation runs; the pending flag coalesces requests
    // arriving while a run is in flight into a single follow-up run.
    reconcile_gate: Mutex<()>,
    reconcile_pending: AtomicBool,
    push_tx: mpsc::UnboundedSender<PushMessage>,
    push_rx: Mutex<Option<mpsc::UnboundedReceiver<PushMessage>>>,
    push_handle: Mutex<Option<PushHandle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl SyncEngine {
    /// Build an engine over its collaborators.
    ///
    /// The credential is persisted to the cache's reserved key so a later
    /// offline session can enumerate entities around it.
    pub fn new(
        remote: Arc<dyn RemoteApi>,
        cache: Arc<dyn CacheStore>,
        store: SyncStore,
        monitor: ConnectivityMonitor,
        credential: impl Into<String>,
    ) -> Arc<Self> {
        let credential = credential.into();
        if let Err(error) = cache.set(CREDENTIAL_KEY, &credential) {
            tracing::warn!("Failed to persist credential: {error}");
        }
        store.dispatch(SyncEvent::ConnectivityChanged(monitor.current()));

        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let (shutdown, _shutdown_rx) = watch::channel(false);

        Arc::new(Self {
            remote,
            cache,
            store,
            monitor,
            credential: RwLock::new(credential),
            reconcile_gate: Mutex::new(()),
            reconcile_pending: AtomicBool::new(false),
            push_tx,
            push_rx: Mutex::new(Some(push_rx)),
            push_handle: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            shutdown,
        })
    }

    /// The state store this engine writes to
    #[must_use]
    pub const fn store(&self) -> &SyncStore {
        &self.store
    }

    /// The connectivity monitor this engine listens to
    #[must_use]
    pub const fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    /// Spawn the connectivity listener and push listener, and open the
    /// push channel (best-effort; the engine works without it).
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;

        {
            let engine = Arc::clone(self);
            let mut connectivity = self.monitor.subscribe();
            let mut shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        changed = connectivity.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let online = *connectivity.borrow_and_update();
                            engine.store.dispatch(SyncEvent::ConnectivityChanged(online));
                            if online {
                                tracing::info!("Connectivity restored, reconciling offline changes");
                                if let Err(error) = engine.reconcile().await {
                                    tracing::warn!("Reconciliation failed: {error}");
                                }
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }

        if let Some(mut receiver) = self.push_rx.lock().await.take() {
            let engine = Arc::clone(self);
            let mut shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        message = receiver.recv() => {
                            let Some(message) = message else { break };
                            engine.apply_push(message);
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }
        drop(tasks);

        if let Err(error) = self.open_push_channel().await {
            tracing::warn!("Push channel unavailable: {error}");
        }
    }

    /// Tear the engine down: close the push channel and revoke every
    /// spawned task. In-flight results are suppressed, not delivered.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.push_handle.lock().await.take() {
            handle.close();
        }
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
    }

    /// Replace the credential and reopen the push channel with it.
    pub async fn set_credential(&self, credential: impl Into<String>) {
        let credential = credential.into();
        {
            let mut guard = match self.credential.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.clone_from(&credential);
        }
        if let Err(error) = self.cache.set(CREDENTIAL_KEY, &credential) {
            tracing::warn!("Failed to persist credential: {error}");
        }
        // The channel authenticates at open time only
        if let Err(error) = self.open_push_channel().await {
            tracing::warn!("Failed to reopen push channel: {error}");
        }
    }

    /// Load the collection.
    ///
    /// Online the remote service is authoritative and the result is
    /// mirrored into the cache; offline (or when the remote call fails at
    /// the transport level) the cached entities are served instead.
    pub async fn fetch(&self) -> Result<()> {
        self.store.dispatch(SyncEvent::FetchStarted);

        if self.monitor.current() {
            match self.remote.list(&self.credential()).await {
                Ok(items) => {
                    for item in &items {
                        self.mirror_to_cache(item);
                    }
                    self.store.dispatch(SyncEvent::FetchSucceeded(items));
                    return Ok(());
                }
                Err(error) if error.is_transport() => {
                    tracing::warn!("Remote fetch failed, serving cached entities: {error}");
                }
                Err(error) => {
                    self.store.dispatch(SyncEvent::FetchFailed(error.to_string()));
                    return Err(error);
                }
            }
        }

        match self.cached_items() {
            Ok(items) => {
                self.store.dispatch(SyncEvent::FetchSucceeded(items));
                Ok(())
            }
            Err(error) => {
                self.store.dispatch(SyncEvent::FetchFailed(error.to_string()));
                Err(error)
            }
        }
    }

    /// Save an entity, routing to the remote service or the local cache.
    ///
    /// Returns the entity as persisted: with the canonical identifier after
    /// a remote save, with a locally-minted one after an offline save.
    pub async fn save(&self, item: Item) -> Result<Item> {
        self.store.dispatch(SyncEvent::SaveStarted);

        if self.monitor.current() {
            match self.save_remote(&item).await {
                Ok(saved) => {
                    // A locally-minted identifier is superseded by the
                    // canonical one; drop the stale record
                    if let Some(local_id) = item.id.as_deref().filter(|id| is_local_id(id)) {
                        self.prune_cache_key(local_id);
                    }
                    self.mirror_to_cache(&saved);
                    self.store.dispatch(SyncEvent::SaveSucceeded(saved.clone()));
                    return Ok(saved);
                }
                Err(error) if error.is_transport() => {
                    tracing::warn!("Remote save failed, keeping the change locally: {error}");
                }
                Err(error) => {
                    self.store.dispatch(SyncEvent::SaveFailed(error.to_string()));
                    return Err(error);
                }
            }
        }

        self.save_offline(item)
    }

    /// Delete an entity, routing to the remote service or the local cache.
    pub async fn delete(&self, item: Item) -> Result<()> {
        self.store.dispatch(SyncEvent::DeleteStarted);

        if self.monitor.current() {
            if let Some(id) = item.id.clone().filter(|id| !is_local_id(id)) {
                match self.remote.delete(&self.credential(), &id).await {
                    Ok(()) => {
                        self.prune_cache_key(&id);
                        self.store.dispatch(SyncEvent::DeleteSucceeded(item));
                        return Ok(());
                    }
                    Err(error) if error.is_transport() => {
                        tracing::warn!("Remote delete failed, removing locally: {error}");
                    }
                    Err(error) => {
                        // The entity stays visible for a retry
                        self.store.dispatch(SyncEvent::DeleteFailed(error.to_string()));
                        return Err(error);
                    }
                }
            }
        }

        self.delete_offline(item)
    }

    /// Reconcile offline-made changes with the remote service.
    ///
    /// Runs are serialized; a request arriving while a run is in flight is
    /// coalesced into a single follow-up run instead of running twice.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        self.reconcile_pending.store(true, Ordering::SeqCst);
        let _gate = self.reconcile_gate.lock().await;
        if !self.reconcile_pending.swap(false, Ordering::SeqCst) {
            // A run that started after this request already covered it
            return Ok(ReconcileReport::default());
        }
        self.run_reconciliation().await
    }

    async fn run_reconciliation(&self) -> Result<ReconcileReport> {
        let credential = self.credential();
        let remote_items = self.remote.list(&credential).await?;

        let mut report = ReconcileReport::default();
        for key in self.entity_keys()? {
            report.examined += 1;
            match self.reconcile_record(&credential, &key, &remote_items).await {
                Ok(RecordOutcome::Created) => report.created += 1,
                Ok(RecordOutcome::Updated) => report.updated += 1,
                Ok(RecordOutcome::Unchanged) => report.unchanged += 1,
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!("Failed to reconcile cache record {key}: {error}");
                }
            }
        }

        // Refresh from the service so the collection shows canonical
        // identifiers, and mirror the authoritative copies
        let refreshed = self.remote.list(&credential).await?;
        for item in &refreshed {
            self.mirror_to_cache(item);
        }
        self.store.dispatch(SyncEvent::FetchSucceeded(refreshed));

        if report.is_clean() {
            self.store.dispatch(SyncEvent::PendingSync(false));
        }

        tracing::info!(
            examined = report.examined,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            failed = report.failed,
            "Reconciliation finished"
        );
        Ok(report)
    }

    /// Reconcile one cached record against the fetched remote collection.
    ///
    /// Remote state is authoritative for identifiers, local state for field
    /// values: a diverging remote twin is overwritten with the cached copy.
    async fn reconcile_record(
        &self,
        credential: &str,
        key: &str,
        remote_items: &[Item],
    ) -> Result<RecordOutcome> {
        let Some(value) = self.cache.get(key)? else {
            // Record disappeared mid-run
            return Ok(RecordOutcome::Unchanged);
        };
        let cached: Item = serde_json::from_str(&value)?;

        match remote_items.iter().find(|it| it.id.as_deref() == Some(key)) {
            Some(remote) if cached.same_fields(remote) => Ok(RecordOutcome::Unchanged),
            Some(_) => {
                let mut outbound = cached;
                outbound.id = Some(key.to_string());
                let updated = self.remote.update(credential, &outbound).await?;
                self.mirror_to_cache(&updated);
                Ok(RecordOutcome::Updated)
            }
            None => {
                let mut outbound = cached;
                outbound.id = None;
                let created = self.remote.create(credential, &outbound).await?;
                self.prune_cache_key(key);
                self.mirror_to_cache(&created);
                Ok(RecordOutcome::Created)
            }
        }
    }

    async fn save_remote(&self, item: &Item) -> Result<Item> {
        let credential = self.credential();
        match item.id.as_deref() {
            Some(id) if !is_local_id(id) => self.remote.update(&credential, item).await,
            // Absent or locally-minted identifier: the service has never
            // seen this entity, so create and let it assign the id
            _ => {
                let mut outbound = item.clone();
                outbound.id = None;
                self.remote.create(&credential, &outbound).await
            }
        }
    }

    /// Offline save: the cache is the sole persistence path here, so a
    /// failing cache write fails the operation.
    fn save_offline(&self, mut item: Item) -> Result<Item> {
        let id = item.id.get_or_insert_with(mint_local_id).clone();
        let result = serde_json::to_string(&item)
            .map_err(Error::from)
            .and_then(|json| self.cache.set(&id, &json));

        match result {
            Ok(()) => {
                self.store.dispatch(SyncEvent::SaveSucceeded(item.clone()));
                self.store.dispatch(SyncEvent::PendingSync(true));
                Ok(item)
            }
            Err(error) => {
                self.store.dispatch(SyncEvent::SaveFailed(error.to_string()));
                Err(error)
            }
        }
    }

    fn delete_offline(&self, mut item: Item) -> Result<()> {
        // Mint an identifier if none exists, to have something to remove
        let id = item.id.get_or_insert_with(mint_local_id).clone();
        match self.cache.remove(&id) {
            Ok(()) => {
                self.store.dispatch(SyncEvent::DeleteSucceeded(item));
                self.store.dispatch(SyncEvent::PendingSync(true));
                Ok(())
            }
            Err(error) => {
                self.store.dispatch(SyncEvent::DeleteFailed(error.to_string()));
                Err(error)
            }
        }
    }

    /// Fold one push notification into the state store
    fn apply_push(&self, message: PushMessage) {
        tracing::debug!(kind = ?message.kind, "Push notification received");
        match message.kind {
            ChangeKind::Created | ChangeKind::Updated => {
                self.mirror_to_cache(&message.payload);
                self.store.dispatch(SyncEvent::SaveSucceeded(message.payload));
            }
            ChangeKind::Deleted => {
                if let Some(id) = message.payload.id.as_deref() {
                    self.prune_cache_key(id);
                }
                self.store.dispatch(SyncEvent::DeleteSucceeded(message.payload));
            }
        }
    }

    async fn open_push_channel(&self) -> Result<()> {
        let handle = self
            .remote
            .open_channel(&self.credential(), self.push_tx.clone())
            .await?;
        if let Some(previous) = self.push_handle.lock().await.replace(handle) {
            previous.close();
        }
        Ok(())
    }

    fn credential(&self) -> String {
        match self.credential.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Cache keys that name entities (the reserved credential key excluded)
    fn entity_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .cache
            .keys()?
            .into_iter()
            .filter(|key| key != CREDENTIAL_KEY)
            .collect())
    }

    fn cached_items(&self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for key in self.entity_keys()? {
            let Some(value) = self.cache.get(&key)? else {
                continue;
            };
            match serde_json::from_str::<Item>(&value) {
                Ok(item) => items.push(item),
                Err(error) => {
                    tracing::warn!("Skipping unreadable cache record {key}: {error}");
                }
            }
        }
        Ok(items)
    }

    /// Best-effort cache mirror of a successful remote result; failures are
    /// logged, never escalated.
    fn mirror_to_cache(&self, item: &Item) {
        let Some(id) = item.id.as_deref() else { return };
        let result = serde_json::to_string(item)
            .map_err(Error::from)
            .and_then(|json| self.cache.set(id, &json));
        if let Err(error) = result {
            tracing::warn!("Cache mirror failed for {id}: {error}");
        }
    }

    fn prune_cache_key(&self, key: &str) {
        if let Err(error) = self.cache.remove(key) {
            tracing::warn!("Failed to prune cache record {key}: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use crate::cache::SqliteCacheStore;

    use super::*;

    fn trek() -> Item {
        Item {
            id: None,
            name: "Trek".to_string(),
            condition: "new".to_string(),
            warranty: true,
            price: 500.0,
            lat: None,
            lng: None,
        }
    }

    #[derive(Default)]
    struct FakeRemote {
        items: StdMutex<Vec<Item>>,
        next_id: AtomicUsize,
        list_calls: AtomicUsize,
        create_calls: AtomicUsize,
        update_calls: AtomicUsize,
        delete_calls: AtomicUsize,
        fail_transport: AtomicBool,
        reject_validation: AtomicBool,
        list_delay: StdMutex<Option<Duration>>,
        push_sender: StdMutex<Option<mpsc::UnboundedSender<PushMessage>>>,
    }

    impl FakeRemote {
        fn seed(&self, items: Vec<Item>) {
            *self.items.lock().unwrap() = items;
        }

        fn remote_items(&self) -> Vec<Item> {
            self.items.lock().unwrap().clone()
        }

        fn check_transport(&self) -> Result<()> {
            if self.fail_transport.load(Ordering::SeqCst) {
                return Err(Error::Transport("connection refused".to_string()));
            }
            Ok(())
        }

        fn check_content(&self, item: &Item) -> Result<()> {
            if self.reject_validation.load(Ordering::SeqCst) || item.name.trim().is_empty() {
                return Err(Error::Validation("Missing name property (400)".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteApi for FakeRemote {
        async fn list(&self, _credential: &str) -> Result<Vec<Item>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.list_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.check_transport()?;
            Ok(self.remote_items())
        }

        async fn create(&self, _credential: &str, item: &Item) -> Result<Item> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            self.check_transport()?;
            self.check_content(item)?;
            let mut saved = item.clone();
            saved.id = Some(format!(
                "srv-{}",
                self.next_id.fetch_add(1, Ordering::SeqCst) + 1
            ));
            self.items.lock().unwrap().push(saved.clone());
            Ok(saved)
        }

        async fn update(&self, _credential: &str, item: &Item) -> Result<Item> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            self.check_transport()?;
            self.check_content(item)?;
            let mut items = self.items.lock().unwrap();
            let Some(existing) = items.iter_mut().find(|it| it.id == item.id) else {
                return Err(Error::Transport("HTTP 405".to_string()));
            };
            *existing = item.clone();
            Ok(item.clone())
        }

        async fn delete(&self, _credential: &str, id: &str) -> Result<()> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            self.check_transport()?;
            self.items
                .lock()
                .unwrap()
                .retain(|it| it.id.as_deref() != Some(id));
            Ok(())
        }

        async fn open_channel(
            &self,
            _credential: &str,
            sender: mpsc::UnboundedSender<PushMessage>,
        ) -> Result<PushHandle> {
            *self.push_sender.lock().unwrap() = Some(sender);
            Ok(PushHandle::new(Arc::new(AtomicBool::new(false)), None))
        }
    }

    struct Harness {
        engine: Arc<SyncEngine>,
        remote: Arc<FakeRemote>,
        cache: Arc<SqliteCacheStore>,
        monitor: ConnectivityMonitor,
    }

    fn harness(online: bool) -> Harness {
        let remote = Arc::new(FakeRemote::default());
        let cache = Arc::new(SqliteCacheStore::open_in_memory().unwrap());
        let monitor = ConnectivityMonitor::new(online);
        let engine = SyncEngine::new(
            Arc::clone(&remote) as Arc<dyn RemoteApi>,
            Arc::clone(&cache) as Arc<dyn CacheStore>,
            SyncStore::new(),
            monitor.clone(),
            "secret",
        );
        Harness {
            engine,
            remote,
            cache,
            monitor,
        }
    }

    fn entity_keys(cache: &SqliteCacheStore) -> Vec<String> {
        cache
            .keys()
            .unwrap()
            .into_iter()
            .filter(|key| key != CREDENTIAL_KEY)
            .collect()
    }

    async fn wait_until(predicate: impl Fn() -> bool) {
        for _ in 0..100 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_offline_create_is_cached_under_local_id() {
        let h = harness(false);

        let saved = h.engine.save(trek()).await.unwrap();
        let id = saved.id.clone().unwrap();
        assert!(is_local_id(&id));

        let state = h.engine.store().snapshot();
        assert_eq!(state.items.len(), 1);
        assert!(state.pending_sync);
        assert!(state.save_error.is_none());

        let keys = entity_keys(&h.cache);
        assert_eq!(keys, vec![id.clone()]);
        let cached: Item = serde_json::from_str(&h.cache.get(&id).unwrap().unwrap()).unwrap();
        assert!(cached.same_fields(&trek()));
    }

    #[tokio::test]
    async fn test_online_update_issues_single_put() {
        let h = harness(true);
        let mut existing = trek();
        existing.id = Some("42".to_string());
        h.remote.seed(vec![existing.clone()]);
        h.engine.fetch().await.unwrap();

        let mut updated = existing;
        updated.price = 450.0;
        h.engine.save(updated).await.unwrap();

        assert_eq!(h.remote.update_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.remote.create_calls.load(Ordering::SeqCst), 0);

        let state = h.engine.store().snapshot();
        assert_eq!(state.items.len(), 1);
        let item = state
            .items
            .iter()
            .find(|it| it.id.as_deref() == Some("42"))
            .unwrap();
        assert_eq!(item.price, 450.0);
        assert_eq!(h.remote.remote_items()[0].price, 450.0);
    }

    #[tokio::test]
    async fn test_reconcile_creates_entities_unknown_to_remote() {
        let h = harness(false);
        h.engine.save(trek()).await.unwrap();

        h.monitor.set_online(true);
        let report = h.engine.reconcile().await.unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(h.remote.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.remote.update_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.remote.delete_calls.load(Ordering::SeqCst), 0);

        let remote_items = h.remote.remote_items();
        assert_eq!(remote_items.len(), 1);
        assert!(remote_items[0].same_fields(&trek()));
        assert!(remote_items[0].id.as_deref().unwrap().starts_with("srv-"));

        // canonical identifier replaced the local one in the collection
        let state = h.engine.store().snapshot();
        assert_eq!(state.items.len(), 1);
        assert!(!state.items[0].has_local_id());
        assert!(!state.pending_sync);
    }

    #[tokio::test]
    async fn test_reconcile_twice_is_idempotent() {
        let h = harness(false);
        h.engine.save(trek()).await.unwrap();
        h.monitor.set_online(true);
        h.engine.reconcile().await.unwrap();

        let report = h.engine.reconcile().await.unwrap();
        assert_eq!(report.corrective_calls(), 0);
        assert_eq!(h.remote.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.remote.update_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.remote.remote_items().len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_overwrites_differing_remote_fields() {
        let h = harness(true);
        let mut remote_copy = trek();
        remote_copy.id = Some("42".to_string());
        h.remote.seed(vec![remote_copy.clone()]);

        // the cached copy diverged while offline; local field values win
        let mut cached = remote_copy;
        cached.price = 450.0;
        h.cache
            .set("42", &serde_json::to_string(&cached).unwrap())
            .unwrap();

        let report = h.engine.reconcile().await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.created, 0);
        assert_eq!(h.remote.remote_items()[0].price, 450.0);
    }

    #[tokio::test]
    async fn test_reconcile_isolates_record_failures() {
        let h = harness(true);
        let mut broken = trek();
        broken.name = String::new();
        broken.id = Some("local-broken".to_string());
        h.cache
            .set("local-broken", &serde_json::to_string(&broken).unwrap())
            .unwrap();
        let mut good = trek();
        good.id = Some("local-good".to_string());
        h.cache
            .set("local-good", &serde_json::to_string(&good).unwrap())
            .unwrap();

        let report = h.engine.reconcile().await.unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.created, 1);
        assert!(!report.is_clean());
        assert_eq!(h.remote.remote_items().len(), 1);

        // the failed record stays cached for a later attempt
        assert!(h.cache.get("local-broken").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_online_operations_converge_with_remote() {
        let h = harness(true);

        let first = h.engine.save(trek()).await.unwrap();
        let mut second = trek();
        second.name = "Giant".to_string();
        let second = h.engine.save(second).await.unwrap();

        let mut second_update = second.clone();
        second_update.price = 777.0;
        h.engine.save(second_update).await.unwrap();
        h.engine.delete(first).await.unwrap();

        let state = h.engine.store().snapshot();
        let remote = h.remote.remote_items();
        assert_eq!(state.items.len(), 1);
        assert_eq!(remote.len(), 1);
        assert_eq!(state.items[0], remote[0]);
        assert_eq!(state.items[0].price, 777.0);
        assert!(!state.pending_sync);
    }

    #[tokio::test]
    async fn test_offline_save_never_validates_content() {
        let h = harness(false);
        let mut item = trek();
        item.price = 0.0;

        // Offline persistence is unconditional; content validation is the
        // service's job and happens at reconciliation time
        let saved = h.engine.save(item.clone()).await.unwrap();
        let id = saved.id.clone().unwrap();
        assert!(is_local_id(&id));

        let state = h.engine.store().snapshot();
        assert_eq!(state.items.len(), 1);
        assert!(state.pending_sync);
        assert!(state.save_error.is_none());

        let cached: Item = serde_json::from_str(&h.cache.get(&id).unwrap().unwrap()).unwrap();
        assert!(cached.same_fields(&item));
    }

    #[tokio::test]
    async fn test_remote_validation_error_is_not_retried_offline() {
        let h = harness(true);
        h.remote.reject_validation.store(true, Ordering::SeqCst);

        let error = h.engine.save(trek()).await.unwrap_err();
        assert!(error.is_validation());

        let state = h.engine.store().snapshot();
        assert!(state.save_error.is_some());
        assert!(state.items.is_empty());
        assert!(!state.pending_sync);
        assert!(entity_keys(&h.cache).is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_falls_back_to_offline_save() {
        let h = harness(true);
        h.remote.fail_transport.store(true, Ordering::SeqCst);

        let saved = h.engine.save(trek()).await.unwrap();
        assert!(saved.has_local_id());

        let state = h.engine.store().snapshot();
        assert!(state.pending_sync);
        assert!(state.save_error.is_none());
        assert_eq!(state.items.len(), 1);
    }

    #[tokio::test]
    async fn test_offline_fetch_serves_cached_entities() {
        let h = harness(false);
        h.engine.save(trek()).await.unwrap();
        h.engine.store().dispatch(SyncEvent::FetchSucceeded(Vec::new()));

        h.engine.fetch().await.unwrap();
        let state = h.engine.store().snapshot();
        assert_eq!(state.items.len(), 1);
        assert_eq!(h.remote.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_cache_on_transport_error() {
        let h = harness(false);
        h.engine.save(trek()).await.unwrap();
        h.monitor.set_online(true);
        h.remote.fail_transport.store(true, Ordering::SeqCst);

        h.engine.fetch().await.unwrap();
        let state = h.engine.store().snapshot();
        assert_eq!(state.items.len(), 1);
        assert!(state.fetch_error.is_none());
    }

    #[tokio::test]
    async fn test_offline_delete_removes_cache_record() {
        let h = harness(false);
        let saved = h.engine.save(trek()).await.unwrap();
        let id = saved.id.clone().unwrap();

        h.engine.delete(saved).await.unwrap();
        assert_eq!(h.cache.get(&id).unwrap(), None);

        let state = h.engine.store().snapshot();
        assert!(state.items.is_empty());
        assert!(state.pending_sync);
    }

    #[tokio::test]
    async fn test_online_save_of_locally_identified_item_creates_remotely() {
        let h = harness(false);
        let saved = h.engine.save(trek()).await.unwrap();
        let local_id = saved.id.clone().unwrap();
        h.monitor.set_online(true);

        let resaved = h.engine.save(saved).await.unwrap();
        assert!(!resaved.has_local_id());
        assert_eq!(h.remote.create_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.remote.update_calls.load(Ordering::SeqCst), 0);

        // the stale local record was pruned
        assert_eq!(h.cache.get(&local_id).unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_notifications_fold_into_state() {
        let h = harness(true);
        h.engine.start().await;

        let sender = h.remote.push_sender.lock().unwrap().clone().unwrap();
        let mut created = trek();
        created.id = Some("7".to_string());
        sender
            .send(PushMessage {
                kind: ChangeKind::Created,
                payload: created.clone(),
            })
            .unwrap();
        wait_until(|| h.engine.store().snapshot().items.len() == 1).await;

        sender
            .send(PushMessage {
                kind: ChangeKind::Deleted,
                payload: created,
            })
            .unwrap();
        wait_until(|| h.engine.store().snapshot().items.is_empty()).await;

        // deleting an absent identifier is a clean no-op
        let mut ghost = trek();
        ghost.id = Some("9".to_string());
        sender
            .send(PushMessage {
                kind: ChangeKind::Deleted,
                payload: ghost,
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = h.engine.store().snapshot();
        assert!(state.items.is_empty());
        assert!(state.delete_error.is_none());

        h.engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_online_transition_triggers_one_reconciliation() {
        let h = harness(false);
        h.engine.save(trek()).await.unwrap();
        h.engine.start().await;

        h.monitor.set_online(true);
        wait_until(|| h.remote.create_calls.load(Ordering::SeqCst) == 1).await;
        assert!(h.remote.remote_items()[0].same_fields(&trek()));

        h.engine.shutdown().await;

        // transitions after teardown no longer reach the engine
        let lists_before = h.remote.list_calls.load(Ordering::SeqCst);
        h.monitor.set_online(false);
        h.monitor.set_online(true);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.remote.list_calls.load(Ordering::SeqCst), lists_before);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_reconcile_requests_coalesce() {
        let h = harness(true);
        *h.remote.list_delay.lock().unwrap() = Some(Duration::from_millis(50));

        let (a, b, c) = tokio::join!(
            h.engine.reconcile(),
            h.engine.reconcile(),
            h.engine.reconcile()
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        // at most the initial run plus one coalesced follow-up (two remote
        // fetches per run), never one run per request
        let lists = h.remote.list_calls.load(Ordering::SeqCst);
        assert!((2..=4).contains(&lists), "list calls: {lists}");
    }
}

//! In-memory implementations of the storage capabilities, for testing.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cloudbox_common::{Error, ObjectId, Result};

use crate::credentials::{CredentialStore, Tokens};
use crate::provider::{Connector, Content, ListQuery, NewFile, RemoteObject, StorageClient};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Credential store that keeps the bundle in memory.
#[derive(Default)]
pub struct MemoryCredentialStore {
    tokens: Mutex<Option<Tokens>>,
    fail_loads: Mutex<Option<String>>,
    saves: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a bundle.
    pub fn with_tokens(tokens: Tokens) -> Self {
        let store = Self::default();
        *lock(&store.tokens) = Some(tokens);
        store
    }

    /// Make every subsequent `load` fail with the given message.
    pub fn fail_loads(&self, message: impl Into<String>) {
        *lock(&self.fail_loads) = Some(message.into());
    }

    /// Currently stored bundle.
    pub fn tokens(&self) -> Option<Tokens> {
        lock(&self.tokens).clone()
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<Tokens>> {
        if let Some(message) = lock(&self.fail_loads).clone() {
            return Err(Error::Serialization(message));
        }
        Ok(lock(&self.tokens).clone())
    }

    async fn save(&self, tokens: &Tokens) -> Result<()> {
        *lock(&self.tokens) = Some(tokens.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// An object held by [`MemoryStorageClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub metadata: NewFile,
    pub data: Vec<u8>,
}

/// In-memory storage client.
///
/// Records every object created through it and hands out sequential ids
/// unless an explicit id is queued with [`MemoryStorageClient::queue_id`].
#[derive(Default)]
pub struct MemoryStorageClient {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    queued_ids: Mutex<Vec<String>>,
    failure: Mutex<Option<String>>,
    next_id: AtomicUsize,
    create_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl MemoryStorageClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `id` for the next created object.
    pub fn queue_id(&self, id: impl Into<String>) {
        lock(&self.queued_ids).insert(0, id.into());
    }

    /// Make every subsequent call fail with a network error.
    pub fn fail_with(&self, message: impl Into<String>) {
        *lock(&self.failure) = Some(message.into());
    }

    /// Clear an injected failure.
    pub fn recover(&self) {
        *lock(&self.failure) = None;
    }

    /// Insert an object directly, bypassing `create_file`.
    pub fn insert(&self, id: impl Into<String>, metadata: NewFile, data: Vec<u8>) {
        lock(&self.objects).insert(id.into(), StoredObject { metadata, data });
    }

    pub fn get(&self, id: &str) -> Option<StoredObject> {
        lock(&self.objects).get(id).cloned()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<()> {
        match lock(&self.failure).as_ref() {
            Some(message) => Err(Error::Network(message.clone())),
            None => Ok(()),
        }
    }

    fn allocate_id(&self) -> String {
        lock(&self.queued_ids).pop().unwrap_or_else(|| {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            format!("mem-{}", n + 1)
        })
    }
}

#[async_trait]
impl StorageClient for MemoryStorageClient {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_file(&self, metadata: &NewFile, content: Content) -> Result<ObjectId> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let data = content.collect().await?;
        let id = self.allocate_id();
        self.insert(id.clone(), metadata.clone(), data);

        Ok(ObjectId::new(id))
    }

    async fn list_files(&self, query: &ListQuery) -> Result<Vec<RemoteObject>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let objects = lock(&self.objects);
        Ok(objects
            .iter()
            .filter(|(_, object)| object.metadata.parents.contains(&query.parent))
            .map(|(id, object)| RemoteObject {
                id: ObjectId::new(id.clone()),
                name: object.metadata.name.clone(),
            })
            .collect())
    }
}

/// Connector handing out a shared [`MemoryStorageClient`].
pub struct MemoryConnector {
    client: Arc<MemoryStorageClient>,
    connects: AtomicUsize,
    fail_connects: Mutex<Option<String>>,
}

impl MemoryConnector {
    pub fn new(client: Arc<MemoryStorageClient>) -> Self {
        Self {
            client,
            connects: AtomicUsize::new(0),
            fail_connects: Mutex::new(None),
        }
    }

    /// Make every subsequent `connect` fail.
    pub fn fail_connects(&self, message: impl Into<String>) {
        *lock(&self.fail_connects) = Some(message.into());
    }

    pub fn client(&self) -> &Arc<MemoryStorageClient> {
        &self.client
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    fn name(&self) -> &str {
        "memory"
    }

    fn connect(&self, tokens: &Tokens) -> Result<Arc<dyn StorageClient>> {
        if let Some(message) = lock(&self.fail_connects).clone() {
            return Err(Error::Authentication(message));
        }
        if tokens.access_token.is_empty() {
            return Err(Error::Authentication("Empty access token".to_string()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.client.clone())
    }
}

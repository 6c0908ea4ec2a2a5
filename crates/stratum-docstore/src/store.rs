use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use serde_json::Value;

enum DocOp {
    Store {
        collection: String,
        id: String,
        body: Value,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl DocOp {
    fn matches(&self, collection: &str, id: &str) -> bool {
        match self {
            DocOp::Store {
                collection: c,
                id: i,
                ..
            }
            | DocOp::Delete {
                collection: c,
                id: i,
            } => c == collection && i == id,
        }
    }
}

/// A process-wide document-store client: named collections of JSON documents.
/// Sessions are cheap; open one per unit of work.
pub struct DocumentStore {
    collections: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore").finish()
    }
}

impl DocumentStore {
    /// Creates an empty store.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            collections: RwLock::new(HashMap::new()),
        })
    }

    /// Opens a session against this store.
    pub fn open_session(self: &Arc<Self>) -> DocumentSession {
        DocumentSession {
            store: self.clone(),
            pending: Mutex::new(Vec::new()),
        }
    }

    fn committed(&self, collection: &str, id: &str) -> Option<Value> {
        self.collections
            .read()
            .expect("RwLock should not be poisoned")
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }
}

/// A unit of work over a [DocumentStore].
///
/// Stores and deletes are tracked in the session until [DocumentSession::save_changes]
/// applies them. `load` observes the session's own pending changes;
/// `list` and `count` answer over the committed documents only, the way a
/// document store's query side does.
pub struct DocumentSession {
    store: Arc<DocumentStore>,
    pending: Mutex<Vec<DocOp>>,
}

impl DocumentSession {
    /// Loads a document by collection and identifier.
    pub fn load(&self, collection: &str, id: &str) -> Option<Value> {
        let pending = self.pending.lock().expect("Mutex should not be poisoned");
        if let Some(op) = pending.iter().rev().find(|op| op.matches(collection, id)) {
            return match op {
                DocOp::Store { body, .. } => Some(body.clone()),
                DocOp::Delete { .. } => None,
            };
        }
        drop(pending);

        self.store.committed(collection, id)
    }

    /// Tracks a document to be written at the next [DocumentSession::save_changes].
    pub fn store(&self, collection: &str, id: &str, body: Value) {
        self.pending
            .lock()
            .expect("Mutex should not be poisoned")
            .push(DocOp::Store {
                collection: collection.to_string(),
                id: id.to_string(),
                body,
            });
    }

    /// Tracks a document to be deleted at the next [DocumentSession::save_changes].
    pub fn delete(&self, collection: &str, id: &str) {
        self.pending
            .lock()
            .expect("Mutex should not be poisoned")
            .push(DocOp::Delete {
                collection: collection.to_string(),
                id: id.to_string(),
            });
    }

    /// Applies every tracked change to the store, in order.
    pub fn save_changes(&self) {
        let ops: Vec<DocOp> = {
            let mut pending = self.pending.lock().expect("Mutex should not be poisoned");
            std::mem::take(&mut *pending)
        };
        if ops.is_empty() {
            return;
        }

        let mut collections = self
            .store
            .collections
            .write()
            .expect("RwLock should not be poisoned");
        for op in ops {
            match op {
                DocOp::Store {
                    collection,
                    id,
                    body,
                } => {
                    collections.entry(collection).or_default().insert(id, body);
                }
                DocOp::Delete { collection, id } => {
                    if let Some(docs) = collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
    }

    /// All committed documents of a collection.
    pub fn list(&self, collection: &str) -> Vec<Value> {
        self.store
            .collections
            .read()
            .expect("RwLock should not be poisoned")
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The number of committed documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.store
            .collections
            .read()
            .expect("RwLock should not be poisoned")
            .get(collection)
            .map_or(0, HashMap::len)
    }
}

//! Document-database collaborator.
//!
//! Handlers reach the managed document database through [`DocumentStore`].
//! The runtime treats documents as opaque JSON objects; the only fields it
//! adds are the `$id`, `$collectionId` and `$databaseId` metadata keys.

use std::collections::HashMap;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ApiError, Result};

/// Metadata key holding the document id.
pub const ID_KEY: &str = "$id";
/// Metadata key holding the collection id.
pub const COLLECTION_KEY: &str = "$collectionId";
/// Metadata key holding the database id.
pub const DATABASE_KEY: &str = "$databaseId";

fn default_database_id() -> String {
    "default".to_string()
}

/// Document store settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentStoreConfig {
    /// Database used when a target does not name one
    #[serde(default = "default_database_id")]
    pub default_database_id: String,
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            default_database_id: default_database_id(),
        }
    }
}

/// Where a document operation applies.
///
/// # Examples
///
/// ```
/// use invocation_core::document::DocumentTarget;
///
/// let target = DocumentTarget::collection("tasks").document("t-1").in_database("prod");
/// assert_eq!(target.collection_id, "tasks");
/// assert_eq!(target.require_document_id().unwrap(), "t-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTarget {
    /// Overrides the store's default database
    pub database_id: Option<String>,
    /// Collection holding the document
    pub collection_id: String,
    /// Document id; required by get, update and delete
    pub document_id: Option<String>,
}

impl DocumentTarget {
    /// Targets a whole collection.
    pub fn collection(collection_id: impl Into<String>) -> Self {
        Self {
            database_id: None,
            collection_id: collection_id.into(),
            document_id: None,
        }
    }

    /// Narrows the target to one document.
    pub fn document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    /// Overrides the database.
    pub fn in_database(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = Some(database_id.into());
        self
    }

    /// The document id, or a 400 error when none was given.
    pub fn require_document_id(&self) -> Result<&str> {
        self.document_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::bad_request("Document ID is required").into())
    }
}

/// Create, list, get, update and delete operations over JSON documents.
pub trait DocumentStore: Send + Sync {
    /// Stores `data` and returns the stored document with its metadata.
    ///
    /// Uses the target's document id when given, a fresh UUID otherwise.
    fn create(&self, target: &DocumentTarget, data: Value) -> Result<Value>;

    /// Lists the documents of the target collection in creation order.
    fn list(&self, target: &DocumentTarget) -> Result<Vec<Value>>;

    /// Fetches one document.
    fn get(&self, target: &DocumentTarget) -> Result<Value>;

    /// Merges the top-level keys of `data` into a document and returns it.
    fn update(&self, target: &DocumentTarget, data: Value) -> Result<Value>;

    /// Deletes one document.
    fn delete(&self, target: &DocumentTarget) -> Result<()>;
}

type CollectionKey = (String, String);

/// In-process [`DocumentStore`].
///
/// Holds documents in memory for the lifetime of the value. Used to run
/// handlers locally and in tests.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    config: DocumentStoreConfig,
    collections: RwLock<HashMap<CollectionKey, IndexMap<String, Map<String, Value>>>>,
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    pub fn new(config: DocumentStoreConfig) -> Self {
        Self {
            config,
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn database_id<'a>(&'a self, target: &'a DocumentTarget) -> &'a str {
        target
            .database_id
            .as_deref()
            .unwrap_or(&self.config.default_database_id)
    }

    fn key(&self, target: &DocumentTarget) -> CollectionKey {
        (
            self.database_id(target).to_string(),
            target.collection_id.clone(),
        )
    }
}

fn into_object(data: Value) -> Result<Map<String, Value>> {
    match data {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::bad_request("Document data must be a JSON object").into()),
    }
}

fn not_found(id: &str) -> crate::Error {
    ApiError::not_found(format!("Document '{id}' not found")).into()
}

impl DocumentStore for MemoryDocumentStore {
    fn create(&self, target: &DocumentTarget, data: Value) -> Result<Value> {
        let mut doc = into_object(data)?;
        let id = target
            .document_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let key = self.key(target);
        doc.insert(ID_KEY.to_string(), Value::String(id.clone()));
        doc.insert(COLLECTION_KEY.to_string(), Value::String(key.1.clone()));
        doc.insert(DATABASE_KEY.to_string(), Value::String(key.0.clone()));

        let mut collections = self.collections.write();
        let collection = collections.entry(key).or_default();
        if collection.contains_key(&id) {
            return Err(ApiError::new(409, format!("Document '{id}' already exists")).into());
        }
        collection.insert(id.clone(), doc.clone());
        debug!(collection = %target.collection_id, document_id = %id, "document created");
        Ok(Value::Object(doc))
    }

    fn list(&self, target: &DocumentTarget) -> Result<Vec<Value>> {
        let collections = self.collections.read();
        Ok(collections
            .get(&self.key(target))
            .map(|c| c.values().cloned().map(Value::Object).collect())
            .unwrap_or_default())
    }

    fn get(&self, target: &DocumentTarget) -> Result<Value> {
        let id = target.require_document_id()?;
        let collections = self.collections.read();
        collections
            .get(&self.key(target))
            .and_then(|c| c.get(id))
            .cloned()
            .map(Value::Object)
            .ok_or_else(|| not_found(id))
    }

    fn update(&self, target: &DocumentTarget, data: Value) -> Result<Value> {
        let id = target.require_document_id()?;
        let patch = into_object(data)?;

        let mut collections = self.collections.write();
        let doc = collections
            .get_mut(&self.key(target))
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| not_found(id))?;

        for (field, value) in patch {
            if !field.starts_with('$') {
                doc.insert(field, value);
            }
        }
        debug!(collection = %target.collection_id, document_id = %id, "document updated");
        Ok(Value::Object(doc.clone()))
    }

    fn delete(&self, target: &DocumentTarget) -> Result<()> {
        let id = target.require_document_id()?;
        let mut collections = self.collections.write();
        collections
            .get_mut(&self.key(target))
            .and_then(|c| c.shift_remove(id))
            .ok_or_else(|| not_found(id))?;
        debug!(collection = %target.collection_id, document_id = %id, "document deleted");
        Ok(())
    }
}

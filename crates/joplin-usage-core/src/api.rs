use crate::error::DataApiError;
use crate::model::{Note, Notebook, Resource};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const RESOURCE_FIELDS: &[&str] = &["id", "title", "size"];
pub const NOTE_FIELDS: &[&str] = &["id", "title", "parent_id"];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewDocument {
    pub title: String,
    pub notebook_id: String,
    pub body: String,
}

/// Capabilities the report engine consumes from the document store.
///
/// Every call blocks until the store answers; the engine never issues two
/// calls at once unless it is explicitly run with a worker pool.
pub trait DataApi {
    fn list_resources(&self, page: usize, page_size: usize, fields: &[&str])
        -> Result<Page<Resource>>;
    fn list_notes_referencing(&self, resource_id: &str, fields: &[&str]) -> Result<Vec<Note>>;
    fn get_notebook(&self, notebook_id: &str) -> Result<Notebook>;
    fn create_document(&self, document: &NewDocument) -> Result<String>;
    fn delete_document(&self, document_id: &str) -> Result<()>;
    fn current_notebook(&self) -> Result<Option<Notebook>>;
}

impl<T: DataApi + ?Sized> DataApi for Box<T> {
    fn list_resources(
        &self,
        page: usize,
        page_size: usize,
        fields: &[&str],
    ) -> Result<Page<Resource>> {
        (**self).list_resources(page, page_size, fields)
    }

    fn list_notes_referencing(&self, resource_id: &str, fields: &[&str]) -> Result<Vec<Note>> {
        (**self).list_notes_referencing(resource_id, fields)
    }

    fn get_notebook(&self, notebook_id: &str) -> Result<Notebook> {
        (**self).get_notebook(notebook_id)
    }

    fn create_document(&self, document: &NewDocument) -> Result<String> {
        (**self).create_document(document)
    }

    fn delete_document(&self, document_id: &str) -> Result<()> {
        (**self).delete_document(document_id)
    }

    fn current_notebook(&self) -> Result<Option<Notebook>> {
        (**self).current_notebook()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApiOperation {
    ListResources,
    ListNotesReferencing,
    GetNotebook,
    CreateDocument,
    DeleteDocument,
    CurrentNotebook,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiCall {
    ListResources { page: usize, page_size: usize },
    ListNotesReferencing(String),
    GetNotebook(String),
    CreateDocument { title: String, notebook_id: String },
    DeleteDocument(String),
    CurrentNotebook,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryDocument {
    pub id: String,
    pub title: String,
    pub notebook_id: String,
    pub body: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceLink {
    pub resource_id: String,
    pub note_id: String,
}

/// Serializable picture of a store, used for fixtures.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub notebooks: Vec<Notebook>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub links: Vec<ResourceLink>,
    #[serde(default)]
    pub current_notebook: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    snapshot: StoreSnapshot,
    documents: BTreeMap<String, MemoryDocument>,
    next_document: u64,
    calls: Vec<ApiCall>,
    failing: Option<(ApiOperation, usize)>,
}

/// In-process store used by tests and the perf harness. Records every call.
#[derive(Debug, Default)]
pub struct MemoryDataApi {
    state: Mutex<MemoryState>,
}

impl MemoryDataApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                snapshot,
                ..MemoryState::default()
            }),
        }
    }

    pub fn with_notebook(self, id: &str, title: &str) -> Self {
        self.lock().snapshot.notebooks.push(Notebook::new(id, title));
        self
    }

    pub fn with_note(self, id: &str, title: &str, notebook_id: &str) -> Self {
        self.lock()
            .snapshot
            .notes
            .push(Note::new(id, title, notebook_id));
        self
    }

    pub fn with_resource(self, id: &str, title: &str, size_bytes: u64) -> Self {
        self.lock()
            .snapshot
            .resources
            .push(Resource::new(id, title, size_bytes));
        self
    }

    pub fn with_link(self, resource_id: &str, note_id: &str) -> Self {
        self.lock().snapshot.links.push(ResourceLink {
            resource_id: resource_id.to_string(),
            note_id: note_id.to_string(),
        });
        self
    }

    pub fn with_current_notebook(self, notebook_id: &str) -> Self {
        self.lock().snapshot.current_notebook = Some(notebook_id.to_string());
        self
    }

    /// Makes the `nth` (zero-based) call of `operation` fail with a transport error.
    pub fn fail_on(self, operation: ApiOperation, nth: usize) -> Self {
        self.lock().failing = Some((operation, nth));
        self
    }

    /// Seeds an existing document, e.g. a placeholder left by an interrupted run.
    pub fn insert_document(&self, document: MemoryDocument) {
        self.lock().documents.insert(document.id.clone(), document);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, operation: ApiOperation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call_operation(call) == operation)
            .count()
    }

    pub fn documents(&self) -> Vec<MemoryDocument> {
        self.lock().documents.values().cloned().collect()
    }

    pub fn document(&self, id: &str) -> Option<MemoryDocument> {
        self.lock().documents.get(id).cloned()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.lock().snapshot.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: ApiCall) -> Result<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        let operation = call_operation(&call);
        let seen = state
            .calls
            .iter()
            .filter(|existing| call_operation(existing) == operation)
            .count();
        state.calls.push(call);
        if state.failing == Some((operation, seen)) {
            return Err(DataApiError::Transport(format!("injected failure on {operation:?}")).into());
        }
        Ok(state)
    }
}

impl DataApi for MemoryDataApi {
    fn list_resources(
        &self,
        page: usize,
        page_size: usize,
        _fields: &[&str],
    ) -> Result<Page<Resource>> {
        let state = self.record(ApiCall::ListResources { page, page_size })?;
        if page == 0 || page_size == 0 {
            return Err(anyhow!(
                "invalid page request: page={page} page_size={page_size}"
            ));
        }

        let resources = &state.snapshot.resources;
        let start = (page - 1).saturating_mul(page_size).min(resources.len());
        let end = start.saturating_add(page_size).min(resources.len());
        Ok(Page {
            items: resources[start..end].to_vec(),
            has_more: end < resources.len(),
        })
    }

    fn list_notes_referencing(&self, resource_id: &str, _fields: &[&str]) -> Result<Vec<Note>> {
        let state = self.record(ApiCall::ListNotesReferencing(resource_id.to_string()))?;
        let snapshot = &state.snapshot;
        let notes = snapshot
            .links
            .iter()
            .filter(|link| link.resource_id == resource_id)
            .filter_map(|link| snapshot.notes.iter().find(|note| note.id == link.note_id))
            .cloned()
            .collect();
        Ok(notes)
    }

    fn get_notebook(&self, notebook_id: &str) -> Result<Notebook> {
        let state = self.record(ApiCall::GetNotebook(notebook_id.to_string()))?;
        state
            .snapshot
            .notebooks
            .iter()
            .find(|notebook| notebook.id == notebook_id)
            .cloned()
            .ok_or_else(|| DataApiError::NotFound(format!("notebook {notebook_id}")).into())
    }

    fn create_document(&self, document: &NewDocument) -> Result<String> {
        let mut state = self.record(ApiCall::CreateDocument {
            title: document.title.clone(),
            notebook_id: document.notebook_id.clone(),
        })?;
        state.next_document += 1;
        let id = format!("doc-{:04}", state.next_document);
        state.documents.insert(
            id.clone(),
            MemoryDocument {
                id: id.clone(),
                title: document.title.clone(),
                notebook_id: document.notebook_id.clone(),
                body: document.body.clone(),
            },
        );
        Ok(id)
    }

    fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut state = self.record(ApiCall::DeleteDocument(document_id.to_string()))?;
        match state.documents.remove(document_id) {
            Some(_) => Ok(()),
            None => Err(DataApiError::NotFound(format!("document {document_id}")).into()),
        }
    }

    fn current_notebook(&self) -> Result<Option<Notebook>> {
        let state = self.record(ApiCall::CurrentNotebook)?;
        let Some(current) = state.snapshot.current_notebook.as_deref() else {
            return Ok(None);
        };
        Ok(state
            .snapshot
            .notebooks
            .iter()
            .find(|notebook| notebook.id == current)
            .cloned())
    }
}

fn call_operation(call: &ApiCall) -> ApiOperation {
    match call {
        ApiCall::ListResources { .. } => ApiOperation::ListResources,
        ApiCall::ListNotesReferencing(_) => ApiOperation::ListNotesReferencing,
        ApiCall::GetNotebook(_) => ApiOperation::GetNotebook,
        ApiCall::CreateDocument { .. } => ApiOperation::CreateDocument,
        ApiCall::DeleteDocument(_) => ApiOperation::DeleteDocument,
        ApiCall::CurrentNotebook => ApiOperation::CurrentNotebook,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_api_pages_resources_in_order() {
        let mut api = MemoryDataApi::new();
        for ix in 0..5 {
            api = api.with_resource(&format!("r{ix}"), "", 1);
        }

        let first = api.list_resources(1, 2, RESOURCE_FIELDS).expect("page 1");
        let last = api.list_resources(3, 2, RESOURCE_FIELDS).expect("page 3");
        let past_end = api.list_resources(4, 2, RESOURCE_FIELDS).expect("page 4");

        assert_eq!(first.items.len(), 2);
        assert!(first.has_more);
        assert_eq!(last.items[0].id, "r4");
        assert!(!last.has_more);
        assert!(past_end.items.is_empty());
        assert!(api.list_resources(0, 2, RESOURCE_FIELDS).is_err());
    }

    #[test]
    fn memory_api_injected_failure_hits_the_requested_call() {
        let api = MemoryDataApi::new()
            .with_notebook("f1", "Inbox")
            .fail_on(ApiOperation::GetNotebook, 1);

        assert!(api.get_notebook("f1").is_ok());
        assert!(api.get_notebook("f1").is_err());
        assert!(api.get_notebook("f1").is_ok());
        assert_eq!(api.count_calls(ApiOperation::GetNotebook), 3);
    }

    #[test]
    fn memory_api_document_create_and_delete() {
        let api = MemoryDataApi::new();
        let id = api
            .create_document(&NewDocument {
                title: "t".to_string(),
                notebook_id: "f1".to_string(),
                body: "b".to_string(),
            })
            .expect("create");

        assert_eq!(api.document(&id).map(|doc| doc.body), Some("b".to_string()));
        api.delete_document(&id).expect("delete");
        assert!(api.documents().is_empty());

        let err = api.delete_document(&id).expect_err("second delete fails");
        let api_err = err.downcast_ref::<DataApiError>().expect("typed error");
        assert!(api_err.is_not_found());
    }

    #[test]
    fn snapshot_json_drives_memory_api() {
        let json = r#"{
            "notebooks": [{"id": "f1", "title": "Inbox"}],
            "notes": [{"id": "n1", "title": "Plans", "parent_id": "f1"}],
            "resources": [{"id": "r1", "title": "diagram.png", "size": 10}],
            "links": [{"resource_id": "r1", "note_id": "n1"}],
            "current_notebook": "f1"
        }"#;
        let snapshot: StoreSnapshot = serde_json::from_str(json).expect("parse snapshot");
        let api = MemoryDataApi::from_snapshot(snapshot);

        let notes = api
            .list_notes_referencing("r1", NOTE_FIELDS)
            .expect("linked notes");
        assert_eq!(notes, vec![Note::new("n1", "Plans", "f1")]);
        assert_eq!(
            api.current_notebook().expect("current"),
            Some(Notebook::new("f1", "Inbox"))
        );
    }
}

use crate::api::{DataApi, NewDocument};
use crate::error::{DataApiError, PreconditionError};
use crate::model::Notebook;
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingPlaceholder {
    pub document_id: String,
    pub notebook_id: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
struct LedgerFile {
    #[serde(default)]
    pending: Vec<PendingPlaceholder>,
}

/// Placeholder documents created but not yet replaced by a final report.
///
/// Every change is written through to disk when the ledger is file-backed,
/// so an interrupted run leaves enough behind for the next run to clean up.
#[derive(Clone, Debug, Default)]
pub struct PendingLedger {
    path: Option<PathBuf>,
    pending: Vec<PendingPlaceholder>,
}

impl PendingLedger {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let pending = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("read pending ledger: {}", path.display()))?;
            let file: LedgerFile = serde_json::from_str(&raw)
                .with_context(|| format!("parse pending ledger: {}", path.display()))?;
            file.pending
        } else {
            Vec::new()
        };
        Ok(Self {
            path: Some(path),
            pending,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn pending(&self) -> &[PendingPlaceholder] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn record(&mut self, placeholder: PendingPlaceholder) -> Result<()> {
        self.pending
            .retain(|existing| existing.document_id != placeholder.document_id);
        self.pending.push(placeholder);
        self.persist()
    }

    pub fn clear(&mut self, document_id: &str) -> Result<()> {
        self.pending
            .retain(|existing| existing.document_id != document_id);
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create ledger dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&LedgerFile {
            pending: self.pending.clone(),
        })?;
        fs::write(path, json)
            .with_context(|| format!("write pending ledger: {}", path.display()))?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingReport {
    pub placeholder_id: String,
    pub notebook: Notebook,
}

/// The notebook that receives the report.
///
/// Fails with [`PreconditionError::NoActiveNotebook`] when the store has none.
/// Call it before touching any document.
pub fn active_notebook<A: DataApi + ?Sized>(api: &A) -> Result<Notebook> {
    let notebook = api
        .current_notebook()
        .context("determine active notebook")?
        .ok_or(PreconditionError::NoActiveNotebook)?;
    Ok(notebook)
}

/// Phase one: publish the placeholder in `notebook` and record it.
pub fn begin<A: DataApi + ?Sized>(
    api: &A,
    ledger: &mut PendingLedger,
    notebook: &Notebook,
    title: &str,
    placeholder_body: &str,
) -> Result<PendingReport> {
    let placeholder_id = api
        .create_document(&NewDocument {
            title: title.to_string(),
            notebook_id: notebook.id.clone(),
            body: placeholder_body.to_string(),
        })
        .context("create placeholder document")?;
    tracing::info!(placeholder_id = %placeholder_id, notebook_id = %notebook.id, "placeholder created");

    ledger.record(PendingPlaceholder {
        document_id: placeholder_id.clone(),
        notebook_id: notebook.id.clone(),
        created_at: chrono::Local::now().to_rfc3339(),
    })?;

    Ok(PendingReport {
        placeholder_id,
        notebook: notebook.clone(),
    })
}

/// Phase two: publish the final report next to the placeholder, then remove
/// the placeholder. Returns the id of the report document.
pub fn publish<A: DataApi + ?Sized>(
    api: &A,
    ledger: &mut PendingLedger,
    pending: &PendingReport,
    title: &str,
    body: &str,
) -> Result<String> {
    let report_id = api
        .create_document(&NewDocument {
            title: title.to_string(),
            notebook_id: pending.notebook.id.clone(),
            body: body.to_string(),
        })
        .context("create report document")?;
    tracing::info!(report_id = %report_id, "report published");

    api.delete_document(&pending.placeholder_id)
        .with_context(|| format!("delete placeholder {}", pending.placeholder_id))?;
    ledger.clear(&pending.placeholder_id)?;
    Ok(report_id)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub deleted: Vec<String>,
    pub kept: Vec<String>,
}

/// Deletes placeholders left behind by earlier interrupted runs.
///
/// A placeholder the store no longer knows about counts as deleted. Any other
/// failure keeps the entry for a later sweep.
pub fn sweep_pending<A: DataApi + ?Sized>(
    api: &A,
    ledger: &mut PendingLedger,
) -> Result<SweepOutcome> {
    let mut outcome = SweepOutcome::default();
    for placeholder in ledger.pending().to_vec() {
        let id = placeholder.document_id;
        match api.delete_document(&id) {
            Ok(()) => outcome.deleted.push(id),
            Err(err)
                if err
                    .downcast_ref::<DataApiError>()
                    .is_some_and(DataApiError::is_not_found) =>
            {
                outcome.deleted.push(id)
            }
            Err(err) => {
                let detail = format!("{err:#}");
                tracing::warn!(document_id = %id, error = %detail, "stale placeholder not deleted");
                outcome.kept.push(id);
            }
        }
    }

    for id in &outcome.deleted {
        ledger.clear(id)?;
    }
    if !outcome.deleted.is_empty() {
        tracing::info!(count = outcome.deleted.len(), "stale placeholders removed");
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiCall, ApiOperation, MemoryDataApi, MemoryDocument};

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "joplin_usage_lifecycle_test_{}_{}",
            name,
            std::process::id()
        ))
    }

    fn store() -> MemoryDataApi {
        MemoryDataApi::new()
            .with_notebook("f1", "Inbox")
            .with_current_notebook("f1")
    }

    #[test]
    fn begin_then_publish_replaces_placeholder() {
        let api = store();
        let mut ledger = PendingLedger::in_memory();

        let notebook = active_notebook(&api).expect("active notebook");
        let pending =
            begin(&api, &mut ledger, &notebook, "Report", "Processing...").expect("begin");
        assert_eq!(ledger.pending().len(), 1);
        assert_eq!(
            api.document(&pending.placeholder_id).map(|d| d.body),
            Some("Processing...".to_string())
        );

        let report_id = publish(&api, &mut ledger, &pending, "Report", "# body").expect("publish");

        assert!(api.document(&pending.placeholder_id).is_none());
        let docs = api.documents();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, report_id);
        assert_eq!(docs[0].notebook_id, "f1");
        assert_eq!(docs[0].body, "# body");
        assert!(ledger.is_empty());
    }

    #[test]
    fn report_is_created_before_placeholder_is_deleted() {
        let api = store();
        let mut ledger = PendingLedger::in_memory();
        let notebook = active_notebook(&api).expect("active notebook");
        let pending = begin(&api, &mut ledger, &notebook, "Report", "...").expect("begin");
        publish(&api, &mut ledger, &pending, "Report", "body").expect("publish");

        let tail = api.calls().into_iter().rev().take(2).collect::<Vec<_>>();
        assert!(matches!(tail[0], ApiCall::DeleteDocument(_)));
        assert!(matches!(tail[1], ApiCall::CreateDocument { .. }));
    }

    #[test]
    fn missing_active_notebook_is_a_precondition_error() {
        let api = MemoryDataApi::new().with_notebook("f1", "Inbox");

        let err = active_notebook(&api).expect_err("no notebook");

        assert_eq!(
            err.downcast_ref::<PreconditionError>(),
            Some(&PreconditionError::NoActiveNotebook)
        );
        assert_eq!(api.count_calls(ApiOperation::CreateDocument), 0);
    }

    #[test]
    fn failed_delete_leaves_placeholder_recorded() {
        let api = store().fail_on(ApiOperation::DeleteDocument, 0);
        let mut ledger = PendingLedger::in_memory();
        let notebook = active_notebook(&api).expect("active notebook");
        let pending = begin(&api, &mut ledger, &notebook, "Report", "...").expect("begin");

        assert!(publish(&api, &mut ledger, &pending, "Report", "body").is_err());
        assert_eq!(ledger.pending()[0].document_id, pending.placeholder_id);
    }

    #[test]
    fn sweep_removes_leftovers_and_forgets_missing_ones() {
        let api = store();
        api.insert_document(MemoryDocument {
            id: "stale-1".to_string(),
            title: "Report".to_string(),
            notebook_id: "f1".to_string(),
            body: "...".to_string(),
        });
        let mut ledger = PendingLedger::in_memory();
        for id in ["stale-1", "already-gone"] {
            ledger
                .record(PendingPlaceholder {
                    document_id: id.to_string(),
                    notebook_id: "f1".to_string(),
                    created_at: String::new(),
                })
                .expect("record");
        }

        let outcome = sweep_pending(&api, &mut ledger).expect("sweep");

        assert_eq!(outcome.deleted, vec!["stale-1", "already-gone"]);
        assert!(outcome.kept.is_empty());
        assert!(ledger.is_empty());
        assert!(api.document("stale-1").is_none());
    }

    #[test]
    fn sweep_keeps_entries_that_fail_to_delete() {
        let api = store().fail_on(ApiOperation::DeleteDocument, 0);
        let mut ledger = PendingLedger::in_memory();
        ledger
            .record(PendingPlaceholder {
                document_id: "stale-1".to_string(),
                notebook_id: "f1".to_string(),
                created_at: String::new(),
            })
            .expect("record");

        let outcome = sweep_pending(&api, &mut ledger).expect("sweep");

        assert_eq!(outcome.kept, vec!["stale-1"]);
        assert_eq!(ledger.pending().len(), 1);
    }

    #[test]
    fn file_ledger_survives_reload() {
        let dir = temp_dir("reload");
        if dir.exists() {
            let _ = fs::remove_dir_all(&dir);
        }
        let path = dir.join("pending_placeholders.json");

        let mut ledger = PendingLedger::load(&path).expect("load empty");
        assert!(ledger.is_empty());
        ledger
            .record(PendingPlaceholder {
                document_id: "p1".to_string(),
                notebook_id: "f1".to_string(),
                created_at: "2026-01-01T00:00:00+00:00".to_string(),
            })
            .expect("record");

        let reloaded = PendingLedger::load(&path).expect("reload");
        assert_eq!(reloaded.pending(), ledger.pending());

        let mut reloaded = reloaded;
        reloaded.clear("p1").expect("clear");
        assert!(PendingLedger::load(&path).expect("reload").is_empty());

        let _ = fs::remove_dir_all(&dir);
    }
}

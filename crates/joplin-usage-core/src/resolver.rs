use crate::api::{DataApi, NOTE_FIELDS};
use crate::model::{LinkEntry, Note, Resource, UNTITLED_NOTEBOOK};
use anyhow::{bail, Context as _, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

pub const MAX_LINKAGE_WORKERS: usize = 16;

/// Notebook titles resolved during one report run.
///
/// Owned by the caller and threaded through the resolver; nothing here
/// outlives the run that created it.
#[derive(Clone, Debug, Default)]
pub struct NotebookCache {
    titles: HashMap<String, String>,
    fetches: usize,
    hits: usize,
}

impl NotebookCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(&self, notebook_id: &str) -> Option<&str> {
        self.titles.get(notebook_id).map(String::as_str)
    }

    pub fn display_title(&self, notebook_id: &str) -> &str {
        self.title(notebook_id).unwrap_or(UNTITLED_NOTEBOOK)
    }

    pub fn insert(&mut self, notebook_id: impl Into<String>, title: impl Into<String>) {
        self.titles.insert(notebook_id.into(), title.into());
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// Number of notebook records fetched from the store.
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Ensures `notebook_id` has a cached title, fetching it on first sight.
    pub fn resolve<A: DataApi + ?Sized>(&mut self, api: &A, notebook_id: &str) -> Result<()> {
        if self.titles.contains_key(notebook_id) {
            self.hits += 1;
            tracing::debug!(notebook_id, "notebook cache hit");
            return Ok(());
        }

        // Notes without a parent never hit the store.
        if notebook_id.is_empty() {
            self.insert(notebook_id, UNTITLED_NOTEBOOK);
            return Ok(());
        }

        tracing::debug!(notebook_id, "notebook cache miss");
        let notebook = api
            .get_notebook(notebook_id)
            .with_context(|| format!("get notebook {notebook_id}"))?;
        self.fetches += 1;
        self.insert(notebook_id, notebook.display_title());
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Linkage {
    pub entries: Vec<LinkEntry>,
    /// Resources no note references. They never appear in the report.
    pub orphaned_resources: usize,
}

/// Resolves each resource to its referencing notes, one resource at a time.
pub fn resolve_links<A: DataApi + ?Sized>(
    api: &A,
    resources: &[Resource],
    cache: &mut NotebookCache,
) -> Result<Linkage> {
    let mut linkage = Linkage::default();
    for resource in resources {
        let notes = list_referencing_notes(api, resource)?;
        link_resource(api, resource, &notes, cache, &mut linkage)?;
    }
    Ok(linkage)
}

/// Same result as [`resolve_links`], but note lookups run on a fixed pool of
/// `workers` threads. Notebook resolution still happens afterwards in
/// resource order, so output and cache contents do not depend on timing.
pub fn resolve_links_concurrent<A: DataApi + Sync + ?Sized>(
    api: &A,
    resources: &[Resource],
    cache: &mut NotebookCache,
    workers: usize,
) -> Result<Linkage> {
    let workers = workers
        .clamp(1, MAX_LINKAGE_WORKERS)
        .min(resources.len().max(1));
    if workers == 1 {
        return resolve_links(api, resources, cache);
    }

    let next = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<(usize, Result<Vec<Note>>)>();

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let next = &next;
            let failed = &failed;
            scope.spawn(move || loop {
                if failed.load(Ordering::Relaxed) {
                    break;
                }
                let ix = next.fetch_add(1, Ordering::Relaxed);
                let Some(resource) = resources.get(ix) else {
                    break;
                };
                let result = list_referencing_notes(api, resource);
                if result.is_err() {
                    failed.store(true, Ordering::Relaxed);
                }
                if tx.send((ix, result)).is_err() {
                    break;
                }
            });
        }
    });
    drop(tx);

    let mut slots: Vec<Option<Result<Vec<Note>>>> = resources.iter().map(|_| None).collect();
    for (ix, result) in rx {
        slots[ix] = Some(result);
    }

    let mut linkage = Linkage::default();
    for (resource, slot) in resources.iter().zip(slots) {
        match slot {
            Some(Ok(notes)) => link_resource(api, resource, &notes, cache, &mut linkage)?,
            Some(Err(err)) => return Err(err),
            None => bail!("linkage lookup for resource {} did not complete", resource.id),
        }
    }
    Ok(linkage)
}

fn list_referencing_notes<A: DataApi + ?Sized>(api: &A, resource: &Resource) -> Result<Vec<Note>> {
    api.list_notes_referencing(&resource.id, NOTE_FIELDS)
        .with_context(|| format!("list notes referencing resource {}", resource.id))
}

fn link_resource<A: DataApi + ?Sized>(
    api: &A,
    resource: &Resource,
    notes: &[Note],
    cache: &mut NotebookCache,
    linkage: &mut Linkage,
) -> Result<()> {
    if notes.is_empty() {
        linkage.orphaned_resources += 1;
        return Ok(());
    }

    for note in notes {
        cache.resolve(api, &note.notebook_id)?;
        linkage.entries.push(LinkEntry::new(resource, note));
    }
    Ok(())
}

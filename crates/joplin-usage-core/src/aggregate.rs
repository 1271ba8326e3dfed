use crate::model::{LinkEntry, NotebookAggregate};
use std::collections::HashMap;

/// Groups link entries by notebook, keeping first-seen notebook order.
///
/// Totals are summed per link entry, not per distinct resource: a resource
/// referenced by three notes of one notebook adds its size three times, while
/// the rendered list shows that resource once.
pub fn aggregate(entries: Vec<LinkEntry>) -> Vec<NotebookAggregate> {
    let mut notebooks: Vec<NotebookAggregate> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        let slot = *index.entry(entry.notebook_id.clone()).or_insert_with(|| {
            notebooks.push(NotebookAggregate::new(entry.notebook_id.clone()));
            notebooks.len() - 1
        });
        let notebook = &mut notebooks[slot];
        notebook.total_size_bytes = notebook
            .total_size_bytes
            .saturating_add(entry.resource_size_bytes);
        notebook.entries.push(entry);
    }

    notebooks
}

/// Orders notebooks by total size and each notebook's entries by resource
/// size, both descending. Sorts are stable, so ties keep first-seen order.
pub fn rank(mut notebooks: Vec<NotebookAggregate>) -> Vec<NotebookAggregate> {
    notebooks.sort_by(|a, b| b.total_size_bytes.cmp(&a.total_size_bytes));
    for notebook in &mut notebooks {
        notebook
            .entries
            .sort_by(|a, b| b.resource_size_bytes.cmp(&a.resource_size_bytes));
    }
    notebooks
}

pub fn ranked_notebook_ids(notebooks: &[NotebookAggregate]) -> Vec<&str> {
    notebooks
        .iter()
        .map(|notebook| notebook.notebook_id.as_str())
        .collect()
}

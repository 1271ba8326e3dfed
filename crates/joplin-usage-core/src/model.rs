use serde::{Deserialize, Deserializer, Serialize};

pub const UNTITLED_RESOURCE: &str = "Untitled";
pub const UNTITLED_NOTE: &str = "Untitled Note";
pub const UNTITLED_NOTEBOOK: &str = "Untitled Notebook";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resource {
    pub id: String,
    /// Byte size as reported by the store. Joplin reports `-1` for resources
    /// whose blob has not been fetched yet; those count as zero.
    #[serde(rename = "size", default, deserialize_with = "deserialize_size")]
    pub size_bytes: u64,
    #[serde(default)]
    pub title: String,
}

impl Resource {
    pub fn new(id: impl Into<String>, title: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            id: id.into(),
            size_bytes,
            title: title.into(),
        }
    }

    pub fn display_title(&self) -> &str {
        title_or(&self.title, UNTITLED_RESOURCE)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "parent_id", default)]
    pub notebook_id: String,
}

impl Note {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        notebook_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            notebook_id: notebook_id.into(),
        }
    }

    pub fn display_title(&self) -> &str {
        title_or(&self.title, UNTITLED_NOTE)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notebook {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

impl Notebook {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }

    pub fn display_title(&self) -> &str {
        title_or(&self.title, UNTITLED_NOTEBOOK)
    }
}

/// One (resource, referencing note) pair. A resource linked from three notes
/// yields three entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkEntry {
    pub resource_id: String,
    pub resource_title: String,
    pub resource_size_bytes: u64,
    pub note_id: String,
    pub note_title: String,
    pub notebook_id: String,
}

impl LinkEntry {
    pub fn new(resource: &Resource, note: &Note) -> Self {
        Self {
            resource_id: resource.id.clone(),
            resource_title: resource.display_title().to_string(),
            resource_size_bytes: resource.size_bytes,
            note_id: note.id.clone(),
            note_title: note.display_title().to_string(),
            notebook_id: note.notebook_id.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotebookAggregate {
    pub notebook_id: String,
    pub total_size_bytes: u64,
    pub entries: Vec<LinkEntry>,
}

impl NotebookAggregate {
    pub fn new(notebook_id: impl Into<String>) -> Self {
        Self {
            notebook_id: notebook_id.into(),
            total_size_bytes: 0,
            entries: Vec::new(),
        }
    }
}

fn title_or<'a>(title: &'a str, fallback: &'a str) -> &'a str {
    if title.is_empty() {
        fallback
    } else {
        title
    }
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?;
    Ok(raw.map(|value| value.max(0) as u64).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_titles_fall_back_to_defaults() {
        assert_eq!(Resource::new("r1", "", 1).display_title(), "Untitled");
        assert_eq!(Note::new("n1", "", "f1").display_title(), "Untitled Note");
        assert_eq!(Notebook::new("f1", "").display_title(), "Untitled Notebook");
        assert_eq!(Resource::new("r1", "a.png", 1).display_title(), "a.png");
    }

    #[test]
    fn whitespace_titles_are_kept_verbatim() {
        assert_eq!(Resource::new("r1", " ", 1).display_title(), " ");
        assert_eq!(Note::new("n1", "   ", "f1").display_title(), "   ");
        assert_eq!(Notebook::new("f1", "\t").display_title(), "\t");

        let entry = LinkEntry::new(&Resource::new("r1", " ", 1), &Note::new("n1", "", "f1"));
        assert_ne!(entry.resource_title, UNTITLED_RESOURCE);
    }

    #[test]
    fn resource_decodes_joplin_fields() {
        let json = r#"{"id":"abc","title":"scan.pdf","size":2048}"#;
        let resource: Resource = serde_json::from_str(json).expect("decode resource");
        assert_eq!(resource, Resource::new("abc", "scan.pdf", 2048));
    }

    #[test]
    fn resource_with_negative_or_missing_size_counts_as_zero() {
        let pending: Resource =
            serde_json::from_str(r#"{"id":"a","title":"x","size":-1}"#).expect("decode");
        assert_eq!(pending.size_bytes, 0);

        let missing: Resource = serde_json::from_str(r#"{"id":"b"}"#).expect("decode");
        assert_eq!(missing.size_bytes, 0);
        assert_eq!(missing.display_title(), "Untitled");
    }

    #[test]
    fn note_decodes_parent_id_as_notebook() {
        let note: Note = serde_json::from_str(r#"{"id":"n","title":"","parent_id":"f"}"#)
            .expect("decode note");
        assert_eq!(note.notebook_id, "f");
        assert_eq!(note.display_title(), "Untitled Note");
    }

    #[test]
    fn link_entry_copies_defaulted_titles() {
        let resource = Resource::new("r1", "", 10);
        let note = Note::new("n1", "", "f1");
        let entry = LinkEntry::new(&resource, &note);
        assert_eq!(entry.resource_title, "Untitled");
        assert_eq!(entry.note_title, "Untitled Note");
        assert_eq!(entry.resource_size_bytes, 10);
        assert_eq!(entry.notebook_id, "f1");
    }
}

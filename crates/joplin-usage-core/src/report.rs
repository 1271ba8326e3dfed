use crate::model::{LinkEntry, NotebookAggregate};
use crate::resolver::NotebookCache;
use std::collections::HashMap;

pub const REPORT_HEADING: &str = "# Joplin Disk Usage Report";
pub const TOC_MARKER: &str = "[toc]";
pub const BYTES_PER_MEGABYTE: u64 = 1_048_576;

/// Formats bytes as megabytes with two decimals, rounding half up.
pub fn format_megabytes(bytes: u64) -> String {
    let divisor = u128::from(BYTES_PER_MEGABYTE);
    let hundredths = (u128::from(bytes) * 100 + divisor / 2) / divisor;
    format!("{}.{:02}", hundredths / 100, hundredths % 100)
}

/// Renders ranked notebooks as the markdown report body.
///
/// Within a notebook, resources are grouped by title rather than id: two
/// distinct resources sharing a title render as one block listing the notes
/// of both. Titles are emitted as-is, without markdown escaping.
pub fn render_report(notebooks: &[NotebookAggregate], titles: &NotebookCache) -> String {
    let mut out = String::new();
    out.push_str(REPORT_HEADING);
    out.push_str("\n\n");
    out.push_str(TOC_MARKER);
    out.push_str("\n\n");

    for notebook in notebooks {
        render_notebook(
            &mut out,
            notebook,
            titles.display_title(&notebook.notebook_id),
        );
    }
    out
}

struct ResourceBlock<'a> {
    first: &'a LinkEntry,
    notes: Vec<&'a LinkEntry>,
}

fn render_notebook(out: &mut String, notebook: &NotebookAggregate, title: &str) {
    out.push_str(&format!(
        "## {title} ({} MB)\n\n",
        format_megabytes(notebook.total_size_bytes)
    ));

    for block in group_by_title(&notebook.entries) {
        let resource = block.first;
        out.push_str(&format!("- **Resource**: \"{}\"\n", resource.resource_title));
        out.push_str(&format!(
            "  - Size: {} MB\n",
            format_megabytes(resource.resource_size_bytes)
        ));
        out.push_str(&format!("  - ID: {}\n", resource.resource_id));
        out.push_str("  - Notes:\n");
        for note in block.notes {
            out.push_str(&format!("    - [{}](:/{})\n", note.note_title, note.note_id));
        }
    }
    out.push('\n');
}

fn group_by_title(entries: &[LinkEntry]) -> Vec<ResourceBlock<'_>> {
    let mut blocks: Vec<ResourceBlock<'_>> = Vec::new();
    let mut by_title: HashMap<&str, usize> = HashMap::new();

    for entry in entries {
        match by_title.get(entry.resource_title.as_str()) {
            Some(&slot) => blocks[slot].notes.push(entry),
            None => {
                by_title.insert(entry.resource_title.as_str(), blocks.len());
                blocks.push(ResourceBlock {
                    first: entry,
                    notes: vec![entry],
                });
            }
        }
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(resource: &str, title: &str, size: u64, note: &str, notebook: &str) -> LinkEntry {
        LinkEntry {
            resource_id: resource.to_string(),
            resource_title: title.to_string(),
            resource_size_bytes: size,
            note_id: note.to_string(),
            note_title: format!("Note {note}"),
            notebook_id: notebook.to_string(),
        }
    }

    fn notebook(id: &str, entries: Vec<LinkEntry>) -> NotebookAggregate {
        NotebookAggregate {
            notebook_id: id.to_string(),
            total_size_bytes: entries.iter().map(|e| e.resource_size_bytes).sum(),
            entries,
        }
    }

    #[test]
    fn megabytes_use_two_decimals() {
        assert_eq!(format_megabytes(1_048_576), "1.00");
        assert_eq!(format_megabytes(1_572_864), "1.50");
        assert_eq!(format_megabytes(0), "0.00");
        assert_eq!(format_megabytes(4_194_304), "4.00");
    }

    #[test]
    fn megabytes_round_half_up() {
        // 0.005 MB sits between 5242 and 5243 bytes.
        assert_eq!(format_megabytes(5_242_880 / 1000 + 1), "0.01");
        assert_eq!(format_megabytes(5_242), "0.00");
        assert_eq!(format_megabytes(131_072), "0.13");
    }

    #[test]
    fn header_and_toc_come_first() {
        let mut titles = NotebookCache::new();
        titles.insert("f1", "Inbox");
        let report = render_report(
            &[notebook("f1", vec![entry("r1", "a", 1, "n1", "f1")])],
            &titles,
        );

        let mut lines = report.lines();
        assert_eq!(lines.next(), Some("# Joplin Disk Usage Report"));
        assert_eq!(lines.next(), Some(""));
        assert_eq!(lines.next(), Some("[toc]"));
    }

    #[test]
    fn renders_block_with_size_id_and_note_links() {
        let mut titles = NotebookCache::new();
        titles.insert("f1", "Inbox");
        let report = render_report(
            &[notebook(
                "f1",
                vec![
                    entry("r1", "diagram.png", 2_097_152, "n1", "f1"),
                    entry("r1", "diagram.png", 2_097_152, "n2", "f1"),
                ],
            )],
            &titles,
        );

        let expected = "\
# Joplin Disk Usage Report

[toc]

## Inbox (4.00 MB)

- **Resource**: \"diagram.png\"
  - Size: 2.00 MB
  - ID: r1
  - Notes:
    - [Note n1](:/n1)
    - [Note n2](:/n2)

";
        assert_eq!(report, expected);
    }

    #[test]
    fn same_title_different_ids_merge_into_first_block() {
        let mut titles = NotebookCache::new();
        titles.insert("f1", "Inbox");
        let report = render_report(
            &[notebook(
                "f1",
                vec![
                    entry("r1", "image.png", 10, "n1", "f1"),
                    entry("r2", "image.png", 5, "n2", "f1"),
                ],
            )],
            &titles,
        );

        assert_eq!(report.matches("**Resource**").count(), 1);
        assert!(report.contains("  - ID: r1\n"));
        assert!(!report.contains("ID: r2"));
        assert!(report.contains("[Note n2](:/n2)"));
    }

    #[test]
    fn unknown_notebook_title_falls_back() {
        let report = render_report(
            &[notebook("gone", vec![entry("r1", "a", 1, "n1", "gone")])],
            &NotebookCache::new(),
        );
        assert!(report.contains("## Untitled Notebook (0.00 MB)"));
    }

    #[test]
    fn empty_report_is_heading_and_toc_only() {
        let report = render_report(&[], &NotebookCache::new());
        assert_eq!(report, "# Joplin Disk Usage Report\n\n[toc]\n\n");
    }
}

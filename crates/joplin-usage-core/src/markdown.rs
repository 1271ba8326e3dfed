use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportOutline {
    pub title: Option<String>,
    pub sections: Vec<OutlineSection>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutlineSection {
    pub notebook_title: String,
    /// The megabyte figure from the heading, e.g. `"4.00"`.
    pub total_megabytes: String,
    pub resources: Vec<OutlineResource>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutlineResource {
    pub title: String,
    pub note_links: Vec<OutlineLink>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutlineLink {
    pub text: String,
    pub note_id: String,
}

impl ReportOutline {
    pub fn section(&self, notebook_title: &str) -> Option<&OutlineSection> {
        self.sections
            .iter()
            .find(|section| section.notebook_title == notebook_title)
    }
}

impl OutlineSection {
    pub fn resource(&self, title: &str) -> Option<&OutlineResource> {
        self.resources.iter().find(|resource| resource.title == title)
    }
}

enum Capture {
    None,
    Heading(HeadingLevel, String),
    Strong(String),
    ResourceTitle(String),
    Link(String, String),
}

/// Reads a rendered report back into notebook sections, resource blocks and
/// note links. Used for summaries and for checking report structure.
pub fn outline(text: &str) -> ReportOutline {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let mut report = ReportOutline::default();
    let mut capture = Capture::None;

    for event in Parser::new_ext(text, options) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                capture = Capture::Heading(level, String::new());
            }
            Event::Start(Tag::Strong) => {
                capture = Capture::Strong(String::new());
            }
            Event::Start(Tag::Link { dest_url, .. }) => {
                if let Some(note_id) = dest_url.strip_prefix(":/") {
                    capture = Capture::Link(note_id.to_string(), String::new());
                }
            }
            Event::Start(Tag::List(_)) | Event::End(TagEnd::Item) => {
                if let Capture::ResourceTitle(raw) = std::mem::replace(&mut capture, Capture::None)
                {
                    if let Some(section) = report.sections.last_mut() {
                        section.resources.push(OutlineResource {
                            title: parse_resource_title(&raw),
                            note_links: Vec::new(),
                        });
                    }
                }
            }
            Event::Text(t) | Event::Code(t) => match &mut capture {
                Capture::Heading(_, buf)
                | Capture::Strong(buf)
                | Capture::ResourceTitle(buf)
                | Capture::Link(_, buf) => buf.push_str(&t),
                Capture::None => {}
            },
            Event::SoftBreak | Event::HardBreak => {
                if let Capture::Heading(_, buf) = &mut capture {
                    buf.push(' ');
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Capture::Heading(level, buf) = std::mem::replace(&mut capture, Capture::None)
                {
                    match level {
                        HeadingLevel::H1 => report.title = Some(buf.trim().to_string()),
                        HeadingLevel::H2 => report.sections.push(parse_section_heading(&buf)),
                        _ => {}
                    }
                }
            }
            Event::End(TagEnd::Strong) => {
                if let Capture::Strong(buf) = std::mem::replace(&mut capture, Capture::None) {
                    if buf.trim() == "Resource" {
                        capture = Capture::ResourceTitle(String::new());
                    }
                }
            }
            Event::End(TagEnd::Link) => {
                if let Capture::Link(note_id, text) =
                    std::mem::replace(&mut capture, Capture::None)
                {
                    if let Some(resource) = report
                        .sections
                        .last_mut()
                        .and_then(|section| section.resources.last_mut())
                    {
                        resource.note_links.push(OutlineLink { text, note_id });
                    }
                }
            }
            _ => {}
        }
    }

    report
}

fn parse_section_heading(raw: &str) -> OutlineSection {
    let raw = raw.trim();
    let parsed = raw.strip_suffix(" MB)").and_then(|rest| rest.rsplit_once(" ("));
    match parsed {
        Some((title, megabytes)) => OutlineSection {
            notebook_title: title.to_string(),
            total_megabytes: megabytes.to_string(),
            resources: Vec::new(),
        },
        None => OutlineSection {
            notebook_title: raw.to_string(),
            ..OutlineSection::default()
        },
    }
}

fn parse_resource_title(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches(':').trim();
    trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# Joplin Disk Usage Report

[toc]

## Inbox (4.00 MB)

- **Resource**: \"diagram.png\"
  - Size: 2.00 MB
  - ID: r1
  - Notes:
    - [Plans](:/n1)
    - [Ideas](:/n2)

## Archive (0.50 MB)

- **Resource**: \"scan.pdf\"
  - Size: 0.25 MB
  - ID: r2
  - Notes:
    - [Old](:/n3)
- **Resource**: \"photo (1).jpg\"
  - Size: 0.25 MB
  - ID: r3
  - Notes:
    - [Trip](:/n4)
";

    #[test]
    fn outline_reads_sections_in_order() {
        let outline = outline(SAMPLE);

        assert_eq!(outline.title.as_deref(), Some("Joplin Disk Usage Report"));
        let titles = outline
            .sections
            .iter()
            .map(|s| (s.notebook_title.as_str(), s.total_megabytes.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(titles, vec![("Inbox", "4.00"), ("Archive", "0.50")]);
    }

    #[test]
    fn outline_attaches_links_to_their_resource() {
        let outline = outline(SAMPLE);

        let inbox = outline.section("Inbox").expect("inbox section");
        let diagram = inbox.resource("diagram.png").expect("diagram block");
        assert_eq!(
            diagram.note_links,
            vec![
                OutlineLink {
                    text: "Plans".to_string(),
                    note_id: "n1".to_string(),
                },
                OutlineLink {
                    text: "Ideas".to_string(),
                    note_id: "n2".to_string(),
                },
            ]
        );

        let archive = outline.section("Archive").expect("archive section");
        assert_eq!(archive.resources.len(), 2);
        assert_eq!(
            archive
                .resource("photo (1).jpg")
                .map(|r| r.note_links.len()),
            Some(1)
        );
    }

    #[test]
    fn heading_without_size_keeps_full_title() {
        let outline = outline("## Loose heading\n");
        assert_eq!(outline.sections[0].notebook_title, "Loose heading");
        assert!(outline.sections[0].total_megabytes.is_empty());
    }
}

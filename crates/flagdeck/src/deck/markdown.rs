//! Markdown deck loader.
//!
//! Decks follow the reveal.js external Markdown conventions:
//!
//! - a line containing only `---` starts a new horizontal slide,
//! - a line containing only `--` starts a vertical slide below the current one,
//! - `<!-- .slide: data-section="name" key="value" -->` sets attributes of the
//!   enclosing `<section>`; `data-section` tags the slide for a flag section.
//!
//! Separators inside fenced code blocks are ignored.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use tracing::debug;

use super::document::{Document, Heading, Slide};
use crate::error::{Error, Result};

const SECTION_ATTRIBUTE: &str = "data-section";

fn slide_comment() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--\s*\.slide:(.*?)-->").expect("valid regex"))
}

fn slide_comment_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<!--\s*\.slide:").expect("valid regex"))
}

fn attribute() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][\w\-:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("valid regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    Horizontal,
    Vertical,
}

/// Read and parse a deck file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse.
pub fn load_deck(path: &Path) -> Result<Document> {
    let source = std::fs::read_to_string(path).map_err(|e| Error::DeckParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse(&source, path)
}

/// Parse a deck held in memory.
///
/// # Errors
///
/// Returns an error if the deck has no slides or an attribute comment is
/// not terminated.
pub fn parse_deck(source: &str) -> Result<Document> {
    parse(source, &PathBuf::from("<memory>"))
}

fn parse(source: &str, path: &Path) -> Result<Document> {
    let chunks = split_slides(source);
    if chunks.iter().all(|(_, body)| body.trim().is_empty()) {
        return Err(Error::DeckParse {
            path: path.to_path_buf(),
            message: "deck contains no slides".to_string(),
        });
    }

    let mut doc = Document::new();
    let root = doc.root();
    let mut current_top = None;

    for (index, (separator, body)) in chunks.into_iter().enumerate() {
        if body.trim().is_empty() {
            continue;
        }
        let slide = parse_slide(&body).map_err(|message| Error::DeckParse {
            path: path.to_path_buf(),
            message: format!("slide {}: {message}", index + 1),
        })?;
        let id = doc.create_slide(slide);
        match (separator, current_top) {
            (Separator::Vertical, Some(top)) => doc.append_child(top, id)?,
            _ => {
                doc.append_child(root, id)?;
                current_top = Some(id);
            }
        }
    }

    debug!(
        path = %path.display(),
        slides = doc.slides().len(),
        "Parsed deck"
    );
    Ok(doc)
}

fn split_slides(source: &str) -> Vec<(Separator, String)> {
    let mut chunks = Vec::new();
    let mut separator = Separator::Horizontal;
    let mut current = String::new();
    let mut in_fence = false;

    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }
        let next = match trimmed {
            "---" if !in_fence => Some(Separator::Horizontal),
            "--" if !in_fence => Some(Separator::Vertical),
            _ => None,
        };
        if let Some(next) = next {
            chunks.push((separator, std::mem::take(&mut current)));
            separator = next;
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    chunks.push((separator, current));
    chunks
}

fn parse_slide(body: &str) -> std::result::Result<Slide, String> {
    let mut slide = Slide::default();

    let markdown = if let Some(caps) = slide_comment().captures(body) {
        for attr in attribute().captures_iter(&caps[1]) {
            let name = attr[1].to_string();
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map_or_else(String::new, |m| m.as_str().to_string());
            if name == SECTION_ATTRIBUTE {
                slide.section = Some(value);
            } else {
                slide.attributes.push((name, value));
            }
        }
        slide_comment().replace(body, "").into_owned()
    } else if slide_comment_start().is_match(body) {
        return Err("unterminated .slide attribute comment".to_string());
    } else {
        body.to_string()
    };

    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let events: Vec<Event<'_>> = Parser::new_ext(&markdown, options).collect();
    slide.headings = collect_headings(&events);
    html::push_html(&mut slide.html, events.into_iter());

    Ok(slide)
}

fn collect_headings(events: &[Event<'_>]) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut open: Option<(u8, String)> = None;

    for event in events {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                open = Some((*level as u8, String::new()));
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, text)) = open.take() {
                    headings.push(Heading {
                        level,
                        text: text.trim().to_string(),
                    });
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, buf)) = open.as_mut() {
                    buf.push_str(text);
                }
            }
            _ => {}
        }
    }
    headings
}

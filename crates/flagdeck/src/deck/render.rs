//! Rendering of the live tree back to reveal.js `<section>` markup.

use std::fmt::Write;

use super::document::{Document, NodeId};

/// Render every attached slide as nested `<section>` elements.
#[must_use]
pub fn render_slides(doc: &Document) -> String {
    let mut out = String::new();
    for &id in doc.children(doc.root()) {
        render_node(doc, id, &mut out);
    }
    out
}

fn render_node(doc: &Document, id: NodeId, out: &mut String) {
    let children = doc.children(id);
    if children.is_empty() {
        render_section(doc, id, out);
        return;
    }
    // A vertical stack: the parent's own content becomes the first slide.
    out.push_str("<section>\n");
    render_section(doc, id, out);
    for &child in children {
        render_node(doc, child, out);
    }
    out.push_str("</section>\n");
}

fn render_section(doc: &Document, id: NodeId, out: &mut String) {
    let Some(slide) = doc.slide(id) else {
        return;
    };
    out.push_str("<section");
    if let Some(section) = &slide.section {
        let _ = write!(out, " data-section=\"{}\"", escape_attr(section));
    }
    for (name, value) in &slide.attributes {
        let _ = write!(out, " {name}=\"{}\"", escape_attr(value));
    }
    out.push_str(">\n");
    out.push_str(&slide.html);
    out.push_str("</section>\n");
}

/// Escape a value for use inside a double-quoted HTML attribute.
#[must_use]
pub fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::parse_deck;

    #[test]
    fn test_render_flat_deck() {
        let doc = parse_deck("# One\n\n---\n\n# Two\n").unwrap();
        let html = render_slides(&doc);
        assert_eq!(html.matches("<section>").count(), 2);
        assert!(html.find("One").unwrap() < html.find("Two").unwrap());
    }

    #[test]
    fn test_render_vertical_stack() {
        let doc = parse_deck("# Top\n\n--\n\n# Below\n").unwrap();
        let html = render_slides(&doc);
        assert!(html.starts_with("<section>\n<section>\n<h1>Top</h1>"));
        assert!(html.trim_end().ends_with("</section>\n</section>"));
    }

    #[test]
    fn test_render_attributes() {
        let doc = parse_deck(
            "<!-- .slide: data-section=\"ai-configs\" data-background=\"#123\" -->\n# AI\n",
        )
        .unwrap();
        let html = render_slides(&doc);
        assert!(html.contains(r##"<section data-section="ai-configs" data-background="#123">"##));
    }

    #[test]
    fn test_render_skips_detached() {
        let mut doc = parse_deck("# Keep\n\n---\n\n# Drop\n").unwrap();
        let drop = doc.children(doc.root())[1];
        doc.detach(drop);
        let html = render_slides(&doc);
        assert!(html.contains("Keep"));
        assert!(!html.contains("Drop"));
    }

    #[test]
    fn test_escape_attr() {
        assert_eq!(escape_attr(r#"a"b<c>&"#), "a&quot;b&lt;c&gt;&amp;");
    }
}

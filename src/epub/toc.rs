//! Table of contents from NCX (EPUB 2) and navigation documents (EPUB 3)

use serde::Serialize;

use super::opf::Package;
use crate::error::Result;
use crate::xml::parse_readonly;

/// Table of contents entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TocEntry {
    pub id: String,
    pub label: String,
    /// Href relative to the document the entry came from
    pub href: String,
    pub play_order: Option<u32>,
    pub children: Vec<TocEntry>,
}

impl TocEntry {
    /// Depth-first walk yielding `(depth, entry)`
    pub fn walk(entries: &[TocEntry]) -> Vec<(usize, &TocEntry)> {
        fn go<'a>(entries: &'a [TocEntry], depth: usize, out: &mut Vec<(usize, &'a TocEntry)>) {
            for entry in entries {
                out.push((depth, entry));
                go(&entry.children, depth + 1, out);
            }
        }
        let mut out = Vec::new();
        go(entries, 0, &mut out);
        out
    }
}

/// Parse the `navMap` of an NCX document
pub fn parse_ncx(content: &str) -> Result<Vec<TocEntry>> {
    let doc = parse_readonly(content)?;

    Ok(doc
        .descendants()
        .find(|n| n.tag_name().name() == "navMap")
        .map(|nav_map| parse_nav_points(&nav_map))
        .unwrap_or_default())
}

fn parse_nav_points(parent: &roxmltree::Node) -> Vec<TocEntry> {
    parent
        .children()
        .filter(|n| n.tag_name().name() == "navPoint")
        .filter_map(|n| parse_nav_point(&n))
        .collect()
}

fn parse_nav_point(nav_point: &roxmltree::Node) -> Option<TocEntry> {
    let mut label = String::new();
    let mut href = String::new();

    for child in nav_point.children() {
        match child.tag_name().name() {
            "navLabel" => {
                if let Some(text) = child
                    .descendants()
                    .find(|n| n.tag_name().name() == "text")
                    .and_then(|n| n.text())
                {
                    label = text.trim().to_string();
                }
            }
            "content" => href = child.attribute("src").unwrap_or_default().to_string(),
            _ => {}
        }
    }

    if label.is_empty() && href.is_empty() {
        return None;
    }

    Some(TocEntry {
        id: nav_point.attribute("id").unwrap_or_default().to_string(),
        label,
        href,
        play_order: nav_point.attribute("playOrder").and_then(|p| p.trim().parse().ok()),
        children: parse_nav_points(nav_point),
    })
}

/// Parse an EPUB 3 navigation document, preferring `<nav epub:type="toc">`
pub fn parse_nav(content: &str) -> Result<Vec<TocEntry>> {
    let doc = parse_readonly(content)?;

    let navs: Vec<_> = doc
        .descendants()
        .filter(|n| n.tag_name().name() == "nav")
        .collect();

    let toc_nav = navs.iter().find(|nav| {
        nav.attributes()
            .any(|a| a.name() == "type" && a.value().split_whitespace().any(|t| t == "toc"))
    });

    for nav in toc_nav.into_iter().chain(navs.iter()) {
        if let Some(ol) = nav.descendants().find(|n| n.tag_name().name() == "ol") {
            let entries = parse_nav_ol(&ol);
            if !entries.is_empty() {
                return Ok(entries);
            }
        }
    }

    Ok(Vec::new())
}

fn parse_nav_ol(ol: &roxmltree::Node) -> Vec<TocEntry> {
    ol.children()
        .filter(|n| n.tag_name().name() == "li")
        .filter_map(|li| parse_nav_li(&li))
        .collect()
}

fn parse_nav_li(li: &roxmltree::Node) -> Option<TocEntry> {
    let mut label = String::new();
    let mut href = String::new();
    let mut children = Vec::new();

    for child in li.children() {
        match child.tag_name().name() {
            "a" => {
                href = child.attribute("href").unwrap_or_default().to_string();
                label = text_content(&child);
            }
            "span" if label.is_empty() => label = text_content(&child),
            "ol" => children = parse_nav_ol(&child),
            _ => {}
        }
    }

    if label.is_empty() && href.is_empty() {
        return None;
    }

    Some(TocEntry {
        id: li.attribute("id").unwrap_or_default().to_string(),
        label,
        href,
        play_order: None,
        children,
    })
}

fn text_content(node: &roxmltree::Node) -> String {
    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fallback when a book has neither NCX nor nav: one entry per linear spine item
pub fn toc_from_spine(package: &Package) -> Vec<TocEntry> {
    package
        .spine_items()
        .filter(|(itemref, _)| itemref.linear)
        .filter_map(|(_, item)| item)
        .enumerate()
        .map(|(i, item)| TocEntry {
            id: format!("spine-{}", i),
            label: format!("Chapter {}", i + 1),
            href: item.href.clone(),
            play_order: Some(i as u32 + 1),
            children: Vec::new(),
        })
        .collect()
}

//! Merge several EPUBs into one
//!
//! The first input provides the package location, its metadata and its NCX.
//! Every input at position `i` contributes its manifest and spine with `i_`
//! prepended to each id and file name, so two books with a `chapter1.xhtml`
//! no longer collide. Links inside XHTML and CSS files, and the NCX
//! `content src` attributes, are rewritten to follow the renames.

use std::collections::HashMap;
use std::io::{Read, Seek, Write};
use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::config::Config;
use crate::epub::container::CONTAINER_XML_PATH;
use crate::epub::opf::{CSS_MEDIA_TYPE, NCX_MEDIA_TYPE, XHTML_MEDIA_TYPE};
use crate::epub::EpubArchive;
use crate::error::{EpubError, Result};
use crate::path::{is_external, parent_dir, prefix_file_name, relative_href, resolve_href, split_fragment};
use crate::rewrite::{EpubWriter, StagedFile};
use crate::xml::{Document, Element};

/// What a merge produced
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    pub inputs: usize,
    pub package_path: String,
    pub manifest_items: usize,
    pub spine_items: usize,
    pub nav_points: usize,
}

/// Merge `inputs`, in order, into a new EPUB at `output`
pub fn merge<P: AsRef<Path>>(inputs: &[P], output: &Path, config: &Config) -> Result<MergeSummary> {
    let (first, rest) = inputs.split_first().ok_or(EpubError::NoInputs)?;

    let (staged, file) = StagedFile::create(output)?;
    let mut writer = EpubWriter::new(file, config.compression.method())?;

    let mut archive = EpubArchive::open(first)?;
    let part = Part::read(&mut archive, 0)?;
    let container = archive.read(CONTAINER_XML_PATH)?;
    let mut target = MergeTarget::start(&part, &container, &mut writer)?;
    target.absorb(&mut archive, &part, &mut writer)?;

    for (i, input) in rest.iter().enumerate() {
        let mut archive = EpubArchive::open(input)?;
        let part = Part::read(&mut archive, i + 1)?;
        target.absorb(&mut archive, &part, &mut writer)?;
    }

    let summary = target.finish(&mut writer, inputs.len(), config.xml_indent)?;
    let file = writer.finish()?;
    staged.commit(file)?;

    tracing::info!(
        "Merged {} books into {} ({} manifest items, {} spine items)",
        summary.inputs,
        output.display(),
        summary.manifest_items,
        summary.spine_items
    );
    Ok(summary)
}

/// One input book
struct Part {
    index: usize,
    prefix: String,
    source: String,
    package_path: String,
    package_dir: String,
    package: Document,
}

impl Part {
    fn read<R: Read + Seek>(archive: &mut EpubArchive<R>, index: usize) -> Result<Self> {
        let package_path = archive.package_path()?;
        let package = Document::parse(&archive.read_string(&package_path)?)?;
        tracing::info!("Merging {} as part {}", archive.source(), index);

        Ok(Self {
            index,
            prefix: format!("{}_", index),
            source: archive.source().to_string(),
            package_dir: parent_dir(&package_path).to_string(),
            package_path,
            package,
        })
    }

    fn section(&self, name: &str) -> Result<&Element> {
        self.package.root.child(name).ok_or_else(|| {
            EpubError::InvalidPackage(format!("No {} tag found in {}", name, self.source))
        })
    }
}

struct OutputNcx {
    path: String,
    doc: Document,
    max_play_order: u32,
}

/// The book being assembled
struct MergeTarget {
    package_path: String,
    package_dir: String,
    package: Document,
    ncx: Option<OutputNcx>,
    manifest_items: usize,
    spine_items: usize,
    nav_points: usize,
}

impl MergeTarget {
    /// Take the first part's package document with manifest and spine emptied.
    /// Its `container.xml` is carried over unchanged.
    fn start<W: Write + Seek>(first: &Part, container: &[u8], writer: &mut EpubWriter<W>) -> Result<Self> {
        first.section("manifest")?;
        first.section("spine")?;

        let mut package = first.package.clone();
        if let Some(manifest) = package.root.child_mut("manifest") {
            manifest.clear();
        }
        if let Some(spine) = package.root.child_mut("spine") {
            spine.clear();
            spine.remove_attr("toc");
        }

        // The first part's files get prefixed too, so references into them must follow.
        if let Some(metadata) = package.root.child_mut("metadata") {
            for meta in metadata.elements_mut().filter(|e| e.local_name() == "meta") {
                if meta.attr("name") == Some("cover") {
                    if let Some(content) = meta.attr("content").map(|c| format!("{}{}", first.prefix, c)) {
                        meta.set_attr("content", &content);
                    }
                }
            }
        }
        if let Some(guide) = package.root.child_mut("guide") {
            for reference in guide.elements_mut() {
                if let Some(href) = reference.attr("href").filter(|h| !is_external(h)) {
                    let href = prefix_file_name(&first.prefix, href);
                    reference.set_attr("href", &href);
                }
            }
        }

        writer.write_file(CONTAINER_XML_PATH, container)?;

        Ok(Self {
            package_path: first.package_path.clone(),
            package_dir: first.package_dir.clone(),
            package,
            ncx: None,
            manifest_items: 0,
            spine_items: 0,
            nav_points: 0,
        })
    }

    fn section_mut(&mut self, name: &str) -> Result<&mut Element> {
        self.package
            .root
            .child_mut(name)
            .ok_or_else(|| EpubError::InvalidPackage(format!("No {} tag in merged package", name)))
    }

    fn absorb<R: Read + Seek, W: Write + Seek>(
        &mut self,
        archive: &mut EpubArchive<R>,
        part: &Part,
        writer: &mut EpubWriter<W>,
    ) -> Result<()> {
        let manifest = part.section("manifest")?;
        let spine = part.section("spine")?;

        // source archive path -> output archive path
        let mut renamed: HashMap<String, String> = HashMap::new();
        let mut documents: Vec<(String, String, String)> = Vec::new();
        let mut ncx_sources: Vec<(String, Document)> = Vec::new();

        for item in manifest.elements().filter(|e| e.local_name() == "item") {
            let id = item
                .attr("id")
                .filter(|id| !id.is_empty())
                .ok_or_else(|| EpubError::InvalidPackage(format!("expected id in manifest of {}", part.source)))?;
            let href = item.attr("href").ok_or_else(|| {
                EpubError::InvalidPackage(format!("manifest item {:?} of {} has no href", id, part.source))
            })?;
            let media_type = item.attr("media-type").unwrap_or_default();
            let src_path = resolve_href(&part.package_dir, href);

            if media_type == NCX_MEDIA_TYPE {
                let doc = Document::parse(&archive.read_string(&src_path)?)?;
                if self.ncx.is_none() {
                    self.adopt_ncx(item, id, href, &doc)?;
                }
                ncx_sources.push((src_path, doc));
                continue;
            }

            let new_href = prefix_file_name(&part.prefix, href);
            let out_path = resolve_href(&self.package_dir, &new_href);

            let mut item = item.clone();
            item.set_attr("id", &format!("{}{}", part.prefix, id));
            item.set_attr("href", &new_href);
            if part.index > 0 {
                // Only the first book keeps its navigation document and cover.
                drop_properties(&mut item, &["nav", "cover-image"]);
            }
            self.section_mut("manifest")?.push(item);
            self.manifest_items += 1;

            renamed.insert(src_path.clone(), out_path.clone());
            documents.push((src_path, out_path, media_type.to_string()));
        }

        for (src_path, out_path, media_type) in documents {
            let data = archive.read(&src_path)?;
            let data = if media_type == XHTML_MEDIA_TYPE || media_type == CSS_MEDIA_TYPE {
                match String::from_utf8(data) {
                    Ok(text) => {
                        let base = parent_dir(&src_path);
                        let text = if media_type == CSS_MEDIA_TYPE {
                            rewrite_css(&text, base, &renamed, &part.prefix)
                        } else {
                            rewrite_markup(&text, base, &renamed, &part.prefix)
                        };
                        text.into_bytes()
                    }
                    Err(e) => {
                        tracing::warn!("{} is not UTF-8, copying without rewriting links", src_path);
                        e.into_bytes()
                    }
                }
            } else {
                data
            };
            writer.write_file(&out_path, &data)?;
        }

        for (src_path, mut doc) in ncx_sources {
            self.append_nav_points(&mut doc, &src_path, part, &renamed)?;
        }

        for itemref in spine.elements().filter(|e| e.local_name() == "itemref") {
            let idref = itemref.attr("idref").filter(|id| !id.is_empty()).ok_or_else(|| {
                EpubError::InvalidPackage(format!("expected idref in spine of {}", part.source))
            })?;
            let mut itemref = itemref.clone();
            itemref.set_attr("idref", &format!("{}{}", part.prefix, idref));
            self.section_mut("spine")?.push(itemref);
            self.spine_items += 1;
        }

        Ok(())
    }

    /// Make the first NCX seen the output NCX, with an empty navMap
    fn adopt_ncx(&mut self, item: &Element, id: &str, href: &str, doc: &Document) -> Result<()> {
        let mut doc = doc.clone();
        match doc.root.find_mut("navMap") {
            Some(nav_map) => {
                nav_map.take_elements();
            }
            None => doc.root.push(Element::new("navMap")),
        }

        self.section_mut("manifest")?.push(item.clone());
        self.manifest_items += 1;
        self.section_mut("spine")?.set_attr("toc", id);
        self.ncx = Some(OutputNcx {
            path: resolve_href(&self.package_dir, href),
            doc,
            max_play_order: 0,
        });
        Ok(())
    }

    fn append_nav_points(
        &mut self,
        doc: &mut Document,
        src_path: &str,
        part: &Part,
        renamed: &HashMap<String, String>,
    ) -> Result<()> {
        let Some(out) = self.ncx.as_mut() else { return Ok(()) };
        let Some(nav_map) = doc.root.find_mut("navMap") else {
            tracing::warn!("{} has no navMap", src_path);
            return Ok(());
        };

        let retarget = NavRetarget {
            offset: out.max_play_order,
            id_prefix: (part.index > 0).then_some(part.prefix.as_str()),
            src_path,
            src_dir: parent_dir(src_path),
            out_dir: parent_dir(&out.path).to_string(),
            renamed,
        };

        let mut appended = Vec::new();
        for mut point in nav_map.take_elements() {
            if point.local_name() != "navPoint" {
                continue;
            }
            let max = retarget.apply(&mut point)?;
            out.max_play_order = out.max_play_order.max(max);
            appended.push(point);
        }

        self.nav_points += appended.len();
        if let Some(out_map) = out.doc.root.find_mut("navMap") {
            for point in appended {
                out_map.push(point);
            }
        }
        Ok(())
    }

    fn finish<W: Write + Seek>(
        mut self,
        writer: &mut EpubWriter<W>,
        inputs: usize,
        indent: usize,
    ) -> Result<MergeSummary> {
        // A nav document only lists the first book, the merged NCX lists them all.
        if inputs > 1 && self.ncx.is_some() {
            for item in self.section_mut("manifest")?.elements_mut() {
                let is_nav = item
                    .attr("properties")
                    .map(|p| p.split_whitespace().any(|p| p == "nav"))
                    .unwrap_or(false);
                if is_nav {
                    tracing::warn!(
                        "Dropping nav property from {}, the merged NCX is the table of contents",
                        item.attr("href").unwrap_or_default()
                    );
                    drop_properties(item, &["nav"]);
                }
            }
        }

        writer.write_file(&self.package_path, self.package.to_xml(indent)?.as_bytes())?;
        if let Some(ncx) = &self.ncx {
            writer.write_file(&ncx.path, ncx.doc.to_xml(indent)?.as_bytes())?;
        }

        Ok(MergeSummary {
            inputs,
            package_path: self.package_path,
            manifest_items: self.manifest_items,
            spine_items: self.spine_items,
            nav_points: self.nav_points,
        })
    }
}

/// How navPoints from one NCX are renumbered and re-pointed
struct NavRetarget<'a> {
    offset: u32,
    id_prefix: Option<&'a str>,
    src_path: &'a str,
    src_dir: &'a str,
    out_dir: String,
    renamed: &'a HashMap<String, String>,
}

impl NavRetarget<'_> {
    /// Rewrite a navPoint and its descendants, returning the largest playOrder
    fn apply(&self, point: &mut Element) -> Result<u32> {
        let mut max = 0;

        if let Some(order) = point.attr("playOrder").and_then(|p| p.trim().parse::<u32>().ok()) {
            let order = order.checked_add(self.offset).ok_or_else(|| {
                EpubError::InvalidPackage(format!(
                    "playOrder {} in {} cannot be renumbered to follow {}",
                    order, self.src_path, self.offset
                ))
            })?;
            point.set_attr("playOrder", &order.to_string());
            max = order;
        }
        if let (Some(prefix), Some(id)) = (self.id_prefix, point.attr("id").map(|s| s.to_string())) {
            point.set_attr("id", &format!("{}{}", prefix, id));
        }

        for child in point.elements_mut() {
            match child.local_name() {
                "content" => {
                    let new_src = child.attr("src").and_then(|src| self.retarget(src));
                    if let Some(src) = new_src {
                        child.set_attr("src", &src);
                    }
                }
                "navPoint" => max = max.max(self.apply(child)?),
                _ => {}
            }
        }
        Ok(max)
    }

    fn retarget(&self, src: &str) -> Option<String> {
        if is_external(src) {
            return None;
        }
        let (_, fragment) = split_fragment(src);
        let out_path = self.renamed.get(&resolve_href(self.src_dir, src))?;
        let mut href = relative_href(&self.out_dir, out_path);
        if let Some(fragment) = fragment {
            href.push('#');
            href.push_str(fragment);
        }
        Some(href)
    }
}

fn drop_properties(item: &mut Element, drop: &[&str]) {
    let kept = item.attr("properties").map(|props| {
        props
            .split_whitespace()
            .filter(|p| !drop.contains(p))
            .collect::<Vec<_>>()
            .join(" ")
    });
    match kept {
        Some(kept) if kept.is_empty() => item.remove_attr("properties"),
        Some(kept) => item.set_attr("properties", &kept),
        None => {}
    }
}

/// New value for a reference found in a document under `base_dir`, if it
/// points at a renamed file. Only the file name changes, so the reference
/// keeps its directories, escaping and fragment.
fn retarget_reference(
    value: &str,
    base_dir: &str,
    renamed: &HashMap<String, String>,
    prefix: &str,
) -> Option<String> {
    if value.is_empty() || value.starts_with('#') || is_external(value) {
        return None;
    }
    if !renamed.contains_key(&resolve_href(base_dir, value)) {
        return None;
    }
    let (path, fragment) = split_fragment(value);
    let mut out = prefix_file_name(prefix, path);
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    Some(out)
}

fn markup_refs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\b(href|src)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid reference pattern")
    })
}

fn css_urls() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]+))\s*\)"#).expect("valid url pattern")
    })
}

/// Rewrite `href` and `src` attributes in an XHTML document
fn rewrite_markup(text: &str, base_dir: &str, renamed: &HashMap<String, String>, prefix: &str) -> String {
    markup_refs()
        .replace_all(text, |caps: &Captures| {
            let (value, quote) = match (caps.get(2), caps.get(3)) {
                (Some(v), _) => (v.as_str(), '"'),
                (_, Some(v)) => (v.as_str(), '\''),
                _ => return caps[0].to_string(),
            };
            match retarget_reference(value, base_dir, renamed, prefix) {
                Some(new) => format!("{}={}{}{}", &caps[1], quote, new, quote),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Rewrite `url(...)` references in a stylesheet
fn rewrite_css(text: &str, base_dir: &str, renamed: &HashMap<String, String>, prefix: &str) -> String {
    css_urls()
        .replace_all(text, |caps: &Captures| {
            let (value, quote) = match (caps.get(1), caps.get(2), caps.get(3)) {
                (Some(v), _, _) => (v.as_str(), "\""),
                (_, Some(v), _) => (v.as_str(), "'"),
                (_, _, Some(v)) => (v.as_str(), ""),
                _ => return caps[0].to_string(),
            };
            match retarget_reference(value, base_dir, renamed, prefix) {
                Some(new) => format!("url({}{}{})", quote, new, quote),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

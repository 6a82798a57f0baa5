//! OPF (Open Packaging Format) parser
//!
//! Reads the package document into metadata, manifest, spine and guide.
//! Element names are matched on their local part only, so `dc:title`,
//! `opf:meta` and un-prefixed elements in a default namespace all work.

use serde::Serialize;

use crate::error::{EpubError, Result};
use crate::xml::parse_readonly;

pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";
pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";
pub const CSS_MEDIA_TYPE: &str = "text/css";

/// Parsed package document
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub version: Option<String>,
    pub unique_identifier: Option<String>,
    pub metadata: Metadata,
    pub manifest: Vec<ManifestItem>,
    pub spine: Spine,
    pub guide: Vec<GuideReference>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub titles: Vec<String>,
    pub creators: Vec<Creator>,
    pub languages: Vec<String>,
    pub identifiers: Vec<Identifier>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub source: Option<String>,
    pub subjects: Vec<String>,
    /// Manifest id named by `<meta name="cover" content="..."/>`
    pub cover_id: Option<String>,
    /// `<meta name="generator">`, e.g. calibre
    pub generator: Option<String>,
}

impl Metadata {
    pub fn title(&self) -> Option<&str> {
        self.titles.first().map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub name: String,
    pub role: Option<String>,
    pub file_as: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Identifier {
    pub id: Option<String>,
    pub value: String,
}

/// Manifest item (resource in the EPUB)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestItem {
    pub id: String,
    /// Href relative to the package document
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

impl ManifestItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .map(|p| p.split_whitespace().any(|t| t == property))
            .unwrap_or(false)
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Spine {
    /// Manifest id of the NCX, from the `toc` attribute
    pub toc: Option<String>,
    pub items: Vec<SpineItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpineItem {
    pub idref: String,
    pub linear: bool,
    pub properties: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideReference {
    pub kind: String,
    pub title: Option<String>,
    pub href: String,
}

impl Package {
    pub fn parse(content: &str) -> Result<Self> {
        let doc = parse_readonly(content)?;
        let root = doc.root_element();
        if root.tag_name().name() != "package" {
            return Err(EpubError::InvalidPackage(format!(
                "root element is <{}>, expected <package>",
                root.tag_name().name()
            )));
        }

        let section = |name: &str| root.children().find(|n| n.tag_name().name() == name);

        let metadata = section("metadata")
            .map(|node| parse_metadata(&node))
            .unwrap_or_default();
        let manifest = match section("manifest") {
            Some(node) => parse_manifest(&node)?,
            None => return Err(EpubError::InvalidPackage("no <manifest> element".to_string())),
        };
        let spine = match section("spine") {
            Some(node) => parse_spine(&node)?,
            None => return Err(EpubError::InvalidPackage("no <spine> element".to_string())),
        };
        let guide = section("guide").map(|node| parse_guide(&node)).unwrap_or_default();

        Ok(Package {
            version: root.attribute("version").map(|s| s.to_string()),
            unique_identifier: root.attribute("unique-identifier").map(|s| s.to_string()),
            metadata,
            manifest,
            spine,
            guide,
        })
    }

    pub fn is_epub3(&self) -> bool {
        self.version.as_deref().map(|v| v.starts_with('3')).unwrap_or(false)
    }

    pub fn item_by_id(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    pub fn item_by_href(&self, href: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.href == href)
    }

    /// NCX named by the spine, else the first item with the NCX media type
    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        self.spine
            .toc
            .as_deref()
            .and_then(|id| self.item_by_id(id))
            .or_else(|| self.manifest.iter().find(|i| i.media_type == NCX_MEDIA_TYPE))
    }

    /// EPUB 3 navigation document
    pub fn nav_item(&self) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.has_property("nav"))
    }

    /// Cover image: `cover-image` property, then `<meta name="cover">`, then
    /// any image whose id mentions "cover"
    pub fn cover_item(&self) -> Option<&ManifestItem> {
        self.manifest
            .iter()
            .find(|item| item.has_property("cover-image"))
            .or_else(|| {
                self.metadata
                    .cover_id
                    .as_deref()
                    .and_then(|id| self.item_by_id(id))
            })
            .or_else(|| {
                self.manifest
                    .iter()
                    .find(|item| item.is_image() && item.id.to_lowercase().contains("cover"))
            })
    }

    /// Manifest items in spine order
    pub fn spine_items(&self) -> impl Iterator<Item = (&SpineItem, Option<&ManifestItem>)> {
        self.spine
            .items
            .iter()
            .map(move |itemref| (itemref, self.item_by_id(&itemref.idref)))
    }
}

fn text_of(node: &roxmltree::Node) -> Option<String> {
    let text: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Attribute by local name, whatever its namespace (`opf:role` or `role`)
fn attr_local<'a>(node: &roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes().find(|a| a.name() == name).map(|a| a.value())
}

fn parse_metadata(node: &roxmltree::Node) -> Metadata {
    let mut metadata = Metadata::default();

    for child in node.descendants().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "title" => metadata.titles.extend(text_of(&child)),
            "creator" => {
                if let Some(name) = text_of(&child) {
                    metadata.creators.push(Creator {
                        name,
                        role: attr_local(&child, "role").map(|s| s.to_string()),
                        file_as: attr_local(&child, "file-as").map(|s| s.to_string()),
                    });
                }
            }
            "language" => metadata.languages.extend(text_of(&child)),
            "identifier" => {
                if let Some(value) = text_of(&child) {
                    metadata.identifiers.push(Identifier {
                        id: child.attribute("id").map(|s| s.to_string()),
                        value,
                    });
                }
            }
            "publisher" => metadata.publisher = metadata.publisher.or_else(|| text_of(&child)),
            "description" => metadata.description = metadata.description.or_else(|| text_of(&child)),
            "date" => metadata.date = metadata.date.or_else(|| text_of(&child)),
            "source" => metadata.source = metadata.source.or_else(|| text_of(&child)),
            "subject" => metadata.subjects.extend(text_of(&child)),
            "meta" => match child.attribute("name") {
                Some("cover") => metadata.cover_id = child.attribute("content").map(|s| s.to_string()),
                Some("generator") => {
                    metadata.generator = child.attribute("content").map(|s| s.to_string())
                }
                _ => {}
            },
            _ => {}
        }
    }

    metadata
}

fn parse_manifest(node: &roxmltree::Node) -> Result<Vec<ManifestItem>> {
    let mut manifest = Vec::new();

    for item in node.children().filter(|n| n.tag_name().name() == "item") {
        let id = item
            .attribute("id")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EpubError::InvalidPackage("expected id attribute on manifest item".to_string()))?;
        let href = item.attribute("href").ok_or_else(|| {
            EpubError::InvalidPackage(format!("manifest item {:?} has no href", id))
        })?;

        manifest.push(ManifestItem {
            id: id.to_string(),
            href: href.to_string(),
            media_type: item.attribute("media-type").unwrap_or_default().to_string(),
            properties: item.attribute("properties").map(|s| s.to_string()),
        });
    }

    Ok(manifest)
}

fn parse_spine(node: &roxmltree::Node) -> Result<Spine> {
    let mut items = Vec::new();

    for itemref in node.children().filter(|n| n.tag_name().name() == "itemref") {
        let idref = itemref
            .attribute("idref")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EpubError::InvalidPackage("expected idref attribute on spine itemref".to_string()))?;

        items.push(SpineItem {
            idref: idref.to_string(),
            linear: itemref.attribute("linear") != Some("no"),
            properties: itemref.attribute("properties").map(|s| s.to_string()),
        });
    }

    Ok(Spine {
        toc: node.attribute("toc").map(|s| s.to_string()),
        items,
    })
}

fn parse_guide(node: &roxmltree::Node) -> Vec<GuideReference> {
    node.children()
        .filter(|n| n.tag_name().name() == "reference")
        .filter_map(|r| {
            Some(GuideReference {
                kind: r.attribute("type").unwrap_or_default().to_string(),
                title: r.attribute("title").map(|s| s.to_string()),
                href: r.attribute("href")?.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uuid_id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>The Long Way Round</dc:title>
    <dc:creator opf:role="aut" opf:file-as="Writer, Some">Some Writer</dc:creator>
    <dc:language>en</dc:language>
    <dc:identifier id="uuid_id" opf:scheme="uuid">0f3c</dc:identifier>
    <dc:publisher>Archive of Our Own</dc:publisher>
    <dc:subject>Fluff</dc:subject>
    <dc:subject>Angst</dc:subject>
    <meta name="cover" content="cover"/>
    <meta name="generator" content="calibre (6.0)"/>
  </metadata>
  <manifest>
    <item id="titlepage" href="titlepage.xhtml" media-type="application/xhtml+xml"/>
    <item id="html1" href="The_Long_Way_Round_split_000.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover" href="cover.jpeg" media-type="image/jpeg"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="titlepage" linear="no"/>
    <itemref idref="html1"/>
  </spine>
  <guide>
    <reference type="cover" title="Cover" href="titlepage.xhtml"/>
  </guide>
</package>"#;

    #[test]
    fn test_parse_package() {
        let package = Package::parse(OPF).unwrap();
        assert_eq!(package.version.as_deref(), Some("2.0"));
        assert!(!package.is_epub3());
        assert_eq!(package.metadata.title(), Some("The Long Way Round"));
        assert_eq!(package.metadata.creators[0].role.as_deref(), Some("aut"));
        assert_eq!(package.metadata.creators[0].file_as.as_deref(), Some("Writer, Some"));
        assert_eq!(package.metadata.languages, vec!["en"]);
        assert_eq!(package.metadata.identifiers[0].id.as_deref(), Some("uuid_id"));
        assert_eq!(package.metadata.subjects.len(), 2);
        assert_eq!(package.metadata.generator.as_deref(), Some("calibre (6.0)"));
        assert_eq!(package.manifest.len(), 4);
        assert_eq!(package.guide[0].kind, "cover");
    }

    #[test]
    fn test_spine_and_lookups() {
        let package = Package::parse(OPF).unwrap();
        assert_eq!(package.spine.toc.as_deref(), Some("ncx"));
        assert!(!package.spine.items[0].linear);
        assert!(package.spine.items[1].linear);
        assert_eq!(package.ncx_item().unwrap().href, "toc.ncx");
        assert!(package.nav_item().is_none());
        assert_eq!(package.cover_item().unwrap().href, "cover.jpeg");

        let hrefs: Vec<_> = package
            .spine_items()
            .map(|(_, item)| item.unwrap().href.as_str())
            .collect();
        assert_eq!(hrefs, vec!["titlepage.xhtml", "The_Long_Way_Round_split_000.xhtml"]);
    }

    #[test]
    fn test_epub3_properties() {
        let opf = r#"<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata/>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="img" href="images/front.png" media-type="image/png" properties="cover-image"/>
  </manifest>
  <spine><itemref idref="nav"/></spine>
</package>"#;
        let package = Package::parse(opf).unwrap();
        assert!(package.is_epub3());
        assert_eq!(package.nav_item().unwrap().id, "nav");
        assert_eq!(package.cover_item().unwrap().id, "img");
        assert!(package.ncx_item().is_none());
    }

    #[test]
    fn test_missing_ids_are_errors() {
        let no_id = r#"<package><manifest><item href="a.xhtml"/></manifest><spine/></package>"#;
        assert!(matches!(Package::parse(no_id), Err(EpubError::InvalidPackage(_))));

        let no_idref = r#"<package><manifest/><spine><itemref/></spine></package>"#;
        assert!(matches!(Package::parse(no_idref), Err(EpubError::InvalidPackage(_))));

        let no_spine = r#"<package><manifest/></package>"#;
        assert!(matches!(Package::parse(no_spine), Err(EpubError::InvalidPackage(_))));
    }
}

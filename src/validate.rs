//! Structural validation
//!
//! Checks the container-level rules an EPUB has to follow and reports every
//! problem found rather than stopping at the first one. A check that cannot
//! run because something it depends on is broken (no container, unreadable
//! package document) is skipped.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek};

use serde::Serialize;

use crate::epub::container::{validate_mimetype, CONTAINER_XML_PATH, MIMETYPE_PATH};
use crate::epub::opf::{Package, NCX_MEDIA_TYPE};
use crate::epub::toc::{parse_ncx, TocEntry};
use crate::epub::{ArchiveEntry, EpubArchive};
use crate::error::EpubError;
use crate::path::{is_external, parent_dir, resolve_href};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCode {
    MimetypeMissing,
    MimetypeContents,
    MimetypeNotFirst,
    MimetypeCompressed,
    ContainerMissing,
    ContainerInvalid,
    PackageMissing,
    PackageInvalid,
    DuplicateId,
    MissingResource,
    UnlistedResource,
    DanglingSpineRef,
    EmptySpine,
    TocMissing,
    NoNavigation,
    DuplicatePlayOrder,
    MissingMetadata,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl IssueCode {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueCode::MimetypeMissing => "mimetype-missing",
            IssueCode::MimetypeContents => "mimetype-contents",
            IssueCode::MimetypeNotFirst => "mimetype-not-first",
            IssueCode::MimetypeCompressed => "mimetype-compressed",
            IssueCode::ContainerMissing => "container-missing",
            IssueCode::ContainerInvalid => "container-invalid",
            IssueCode::PackageMissing => "package-missing",
            IssueCode::PackageInvalid => "package-invalid",
            IssueCode::DuplicateId => "duplicate-id",
            IssueCode::MissingResource => "missing-resource",
            IssueCode::UnlistedResource => "unlisted-resource",
            IssueCode::DanglingSpineRef => "dangling-spine-ref",
            IssueCode::EmptySpine => "empty-spine",
            IssueCode::TocMissing => "toc-missing",
            IssueCode::NoNavigation => "no-navigation",
            IssueCode::DuplicatePlayOrder => "duplicate-play-order",
            IssueCode::MissingMetadata => "missing-metadata",
        }
    }
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
}

/// Everything found wrong with one archive
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub source: String,
    pub package_path: Option<String>,
    pub issues: Vec<Issue>,
}

impl Report {
    /// True when nothing of error severity was found
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn has(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }

    fn error(&mut self, code: IssueCode, message: impl Into<String>) {
        self.push(Severity::Error, code, message.into());
    }

    fn warn(&mut self, code: IssueCode, message: impl Into<String>) {
        self.push(Severity::Warning, code, message.into());
    }

    fn push(&mut self, severity: Severity, code: IssueCode, message: String) {
        tracing::debug!("{}: {} {}: {}", self.source, severity, code, message);
        self.issues.push(Issue {
            severity,
            code,
            message,
        });
    }
}

/// Validate an open archive.
///
/// Only reading the ZIP central directory itself can fail; every structural
/// problem ends up in the report.
pub fn validate<R: Read + Seek>(archive: &mut EpubArchive<R>) -> crate::error::Result<Report> {
    let mut report = Report {
        source: archive.source().to_string(),
        package_path: None,
        issues: Vec::new(),
    };

    let entries = archive.entries()?;
    check_mimetype(archive, &entries, &mut report)?;

    let package_path = match archive.container() {
        Ok(container) => container.package_path().to_string(),
        Err(EpubError::MissingEntry(_)) => {
            report.error(IssueCode::ContainerMissing, format!("{} not found", CONTAINER_XML_PATH));
            return Ok(report);
        }
        Err(e) => {
            report.error(IssueCode::ContainerInvalid, e.to_string());
            return Ok(report);
        }
    };
    report.package_path = Some(package_path.clone());

    let package = match archive.package_at(&package_path) {
        Ok(package) => package,
        Err(EpubError::MissingEntry(_)) => {
            report.error(
                IssueCode::PackageMissing,
                format!("{} is named by the container but is not in the archive", package_path),
            );
            return Ok(report);
        }
        Err(e) => {
            report.error(IssueCode::PackageInvalid, e.to_string());
            return Ok(report);
        }
    };

    check_metadata(&package, &mut report);
    check_manifest(&package, &package_path, &entries, &mut report);
    check_spine(&package, &mut report);
    check_navigation(archive, &package, &package_path, &mut report);

    tracing::info!(
        "Validated {}: {} errors, {} warnings",
        report.source,
        report.errors().count(),
        report.warnings().count()
    );
    Ok(report)
}

fn check_mimetype<R: Read + Seek>(
    archive: &mut EpubArchive<R>,
    entries: &[ArchiveEntry],
    report: &mut Report,
) -> crate::error::Result<()> {
    let Some(entry) = entries.iter().find(|e| e.name == MIMETYPE_PATH) else {
        report.error(IssueCode::MimetypeMissing, "mimetype file not found");
        return Ok(());
    };

    if entry.index != 0 {
        report.error(
            IssueCode::MimetypeNotFirst,
            format!("mimetype is entry #{} but must be the first entry", entry.index),
        );
    }
    if entry.compressed {
        report.error(IssueCode::MimetypeCompressed, "mimetype must be stored uncompressed");
    }

    let contents = archive.read(MIMETYPE_PATH)?;
    if let Err(e) = validate_mimetype(Some(&contents)) {
        report.error(IssueCode::MimetypeContents, e.to_string());
    }
    Ok(())
}

fn check_metadata(package: &Package, report: &mut Report) {
    let metadata = &package.metadata;
    if metadata.titles.is_empty() {
        report.warn(IssueCode::MissingMetadata, "no dc:title");
    }
    if metadata.identifiers.is_empty() {
        report.warn(IssueCode::MissingMetadata, "no dc:identifier");
    }
    if metadata.languages.is_empty() {
        report.warn(IssueCode::MissingMetadata, "no dc:language");
    }
}

fn check_manifest(package: &Package, package_path: &str, entries: &[ArchiveEntry], report: &mut Report) {
    let package_dir = parent_dir(package_path);
    let names: HashSet<&str> = entries.iter().map(|e| e.name.as_str()).collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut listed: HashSet<String> = HashSet::new();
    for item in &package.manifest {
        if !seen.insert(item.id.as_str()) {
            report.error(IssueCode::DuplicateId, format!("manifest id {:?} is used twice", item.id));
        }

        if is_external(&item.href) {
            tracing::debug!("Manifest item {:?} is remote: {}", item.id, item.href);
            continue;
        }

        let path = resolve_href(package_dir, &item.href);
        if !names.contains(path.as_str()) {
            report.error(
                IssueCode::MissingResource,
                format!("manifest item {:?} points at {} which is not in the archive", item.id, path),
            );
        }
        listed.insert(path);
    }

    for entry in entries.iter().filter(|e| !e.is_dir) {
        let name = entry.name.as_str();
        if name == MIMETYPE_PATH || name.starts_with("META-INF/") || name == package_path {
            continue;
        }
        if !listed.contains(name) {
            report.warn(
                IssueCode::UnlistedResource,
                format!("{} is in the archive but not in the manifest", name),
            );
        }
    }
}

fn check_spine(package: &Package, report: &mut Report) {
    if package.spine.items.is_empty() {
        report.error(IssueCode::EmptySpine, "spine has no itemref");
    }
    for (itemref, item) in package.spine_items() {
        if item.is_none() {
            report.error(
                IssueCode::DanglingSpineRef,
                format!("spine itemref {:?} does not name a manifest item", itemref.idref),
            );
        }
    }
}

fn check_navigation<R: Read + Seek>(
    archive: &mut EpubArchive<R>,
    package: &Package,
    package_path: &str,
    report: &mut Report,
) {
    if let Some(toc_id) = &package.spine.toc {
        match package.item_by_id(toc_id) {
            Some(item) if item.media_type != NCX_MEDIA_TYPE => report.warn(
                IssueCode::TocMissing,
                format!("spine toc {:?} has media type {:?}", toc_id, item.media_type),
            ),
            Some(_) => {}
            None => report.warn(
                IssueCode::TocMissing,
                format!("spine toc {:?} does not name a manifest item", toc_id),
            ),
        }
    }

    let ncx = package.ncx_item();
    if ncx.is_none() && package.nav_item().is_none() {
        report.warn(IssueCode::NoNavigation, "neither an NCX nor a navigation document is listed");
    }

    let Some(ncx) = ncx else { return };
    let path = resolve_href(parent_dir(package_path), &ncx.href);
    let toc = match archive.read_string(&path).and_then(|xml| parse_ncx(&xml)) {
        Ok(toc) => toc,
        // A missing file has already been reported against the manifest
        Err(EpubError::MissingEntry(_)) => return,
        Err(e) => {
            report.warn(IssueCode::TocMissing, format!("{} could not be read: {}", path, e));
            return;
        }
    };

    let mut orders: HashMap<u32, usize> = HashMap::new();
    for (_, entry) in TocEntry::walk(&toc) {
        if let Some(order) = entry.play_order {
            *orders.entry(order).or_insert(0) += 1;
        }
    }
    let mut duplicated: Vec<u32> = orders.into_iter().filter(|(_, n)| *n > 1).map(|(o, _)| o).collect();
    duplicated.sort_unstable();
    for order in duplicated {
        report.warn(
            IssueCode::DuplicatePlayOrder,
            format!("playOrder {} is used by more than one navPoint in {}", order, path),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EpubFixture;

    fn report_for(fixture: EpubFixture) -> Report {
        let bytes = fixture.build();
        let mut archive = EpubArchive::from_bytes(&bytes, "test.epub").unwrap();
        validate(&mut archive).unwrap()
    }

    #[test]
    fn test_standard_fixture_is_clean() {
        let report = report_for(EpubFixture::standard("First"));
        assert!(report.is_valid(), "{:?}", report.issues);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.package_path.as_deref(), Some("OEBPS/content.opf"));
    }

    #[test]
    fn test_mimetype_rules() {
        let report = report_for(
            EpubFixture::standard("First")
                .without("mimetype")
                .file("mimetype", "application/epub+zip\n"),
        );
        assert!(!report.is_valid());
        assert!(report.has(IssueCode::MimetypeNotFirst));
        assert!(report.has(IssueCode::MimetypeCompressed));
        assert!(report.has(IssueCode::MimetypeContents));

        let report = report_for(EpubFixture::standard("First").without("mimetype"));
        assert!(report.has(IssueCode::MimetypeMissing));
    }

    #[test]
    fn test_missing_container_stops_early() {
        let report = report_for(EpubFixture::standard("First").without("META-INF/container.xml"));
        assert!(report.has(IssueCode::ContainerMissing));
        assert!(report.package_path.is_none());
        assert_eq!(report.issues.len(), 1);
    }

    #[test]
    fn test_dangling_references() {
        let opf = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>T</dc:title></metadata>
  <manifest>
    <item id="a" href="Text/chapter1.xhtml" media-type="application/xhtml+xml"/>
    <item id="a" href="Text/chapter2.xhtml" media-type="application/xhtml+xml"/>
    <item id="gone" href="Text/missing.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx"><itemref idref="a"/><itemref idref="nowhere"/></spine>
</package>"#;
        let report = report_for(EpubFixture::standard("First").file("OEBPS/content.opf", opf));
        assert!(!report.is_valid());
        assert!(report.has(IssueCode::DuplicateId));
        assert!(report.has(IssueCode::MissingResource));
        assert!(report.has(IssueCode::DanglingSpineRef));
        assert!(report.has(IssueCode::TocMissing));
        assert!(report.has(IssueCode::UnlistedResource));
        assert!(report.has(IssueCode::MissingMetadata));
    }

    #[test]
    fn test_duplicate_play_order_is_a_warning() {
        let ncx = r#"<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/"><navMap>
<navPoint id="a" playOrder="1"><navLabel><text>A</text></navLabel><content src="Text/chapter1.xhtml"/></navPoint>
<navPoint id="b" playOrder="1"><navLabel><text>B</text></navLabel><content src="Text/chapter2.xhtml"/></navPoint>
</navMap></ncx>"#;
        let report = report_for(EpubFixture::standard("First").file("OEBPS/toc.ncx", ncx));
        assert!(report.is_valid());
        assert!(report.has(IssueCode::DuplicatePlayOrder));
    }

    #[test]
    fn test_remote_resources_are_not_missing() {
        let opf = r#"<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="bookid">
<metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
  <dc:title>Remote</dc:title><dc:language>en</dc:language><dc:identifier id="bookid">remote</dc:identifier>
</metadata>
<manifest>
  <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
  <item id="style" href="Styles/style.css" media-type="text/css"/>
  <item id="pic" href="Images/pic.png" media-type="image/png"/>
  <item id="chapter1" href="Text/chapter1.xhtml" media-type="application/xhtml+xml" properties="remote-resources"/>
  <item id="chapter2" href="Text/chapter2.xhtml" media-type="application/xhtml+xml"/>
  <item id="vid" href="https://example.org/clip.mp4" media-type="video/mp4"/>
</manifest>
<spine toc="ncx"><itemref idref="chapter1"/><itemref idref="chapter2"/></spine>
</package>"#;
        let report = report_for(EpubFixture::standard("First").file("OEBPS/content.opf", opf));
        assert!(report.is_valid(), "{:?}", report.issues);
        assert!(!report.has(IssueCode::MissingResource));
    }

    #[test]
    fn test_unparseable_package() {
        let report = report_for(EpubFixture::standard("First").file("OEBPS/content.opf", "<package>"));
        assert!(report.has(IssueCode::PackageInvalid));
    }

    #[test]
    fn test_issue_code_names_match_json() {
        for code in [IssueCode::DanglingSpineRef, IssueCode::MimetypeNotFirst, IssueCode::DuplicatePlayOrder] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code));
        }
    }
}

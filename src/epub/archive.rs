//! Archive inspector
//!
//! Opens the ZIP container, finds `META-INF/container.xml`, resolves the
//! package document and hands out its manifest, spine and table of contents.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use serde::Serialize;
use zip::result::ZipError;
use zip::{CompressionMethod, ZipArchive};

use super::container::{validate_mimetype, Container, CONTAINER_XML_PATH, MIMETYPE_PATH};
use super::layout::{PackageLayout, Producer};
use super::opf::{Creator, Package};
use super::toc::{parse_nav, parse_ncx, toc_from_spine, TocEntry};
use crate::error::{EpubError, Result};
use crate::path::{parent_dir, resolve_href};
use crate::xml::strip_bom;

/// One entry of the ZIP central directory
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub index: usize,
    pub name: String,
    pub compressed: bool,
    pub size: u64,
    pub is_dir: bool,
}

/// Which document the table of contents came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TocSource {
    Nav,
    Ncx,
    Spine,
}

/// Summary of a book's structure
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub source: String,
    pub title: Option<String>,
    pub creators: Vec<Creator>,
    pub language: Option<String>,
    pub version: Option<String>,
    pub package_path: String,
    pub layout: PackageLayout,
    pub producer: Producer,
    pub entry_count: usize,
    pub manifest_count: usize,
    pub cover: Option<String>,
    /// Archive paths of the spine documents in reading order
    pub spine: Vec<String>,
    pub toc_source: TocSource,
    pub toc: Vec<TocEntry>,
}

/// An open EPUB container
pub struct EpubArchive<R: Read + Seek> {
    archive: ZipArchive<R>,
    source: String,
}

impl EpubArchive<BufReader<File>> {
    /// Open an EPUB from a file path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), path.display().to_string())
    }
}

impl<'a> EpubArchive<Cursor<&'a [u8]>> {
    /// Open an EPUB held in memory
    pub fn from_bytes(data: &'a [u8], source: impl Into<String>) -> Result<Self> {
        Self::from_reader(Cursor::new(data), source)
    }
}

impl<R: Read + Seek> EpubArchive<R> {
    pub fn from_reader(reader: R, source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let archive = ZipArchive::new(reader).map_err(|e| match e {
            ZipError::InvalidArchive(_) | ZipError::UnsupportedArchive(_) => {
                EpubError::NotAnEpub(source.clone())
            }
            other => other.into(),
        })?;
        tracing::debug!("Opened {} ({} entries)", source, archive.len());
        Ok(Self { archive, source })
    }

    /// Label the archive was opened with, usually its path
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Central directory listing, in archive order
    pub fn entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::with_capacity(self.archive.len());
        for index in 0..self.archive.len() {
            let file = self.archive.by_index_raw(index)?;
            entries.push(ArchiveEntry {
                index,
                name: file.name().to_string(),
                compressed: file.compression() != CompressionMethod::Stored,
                size: file.size(),
                is_dir: file.is_dir(),
            });
        }
        Ok(entries)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    /// Read an entry by its archive path
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut file = self.archive.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => EpubError::MissingEntry(name.to_string()),
            other => other.into(),
        })?;
        let mut content = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut content)?;
        Ok(content)
    }

    /// Read an entry as UTF-8 text, without a byte order mark
    pub fn read_string(&mut self, name: &str) -> Result<String> {
        let content = String::from_utf8(self.read(name)?)?;
        Ok(strip_bom(&content).to_string())
    }

    /// Direct access for raw entry copies
    pub(crate) fn zip_mut(&mut self) -> &mut ZipArchive<R> {
        &mut self.archive
    }

    /// Raw contents of `mimetype`, `None` when the entry is absent
    pub fn mimetype(&mut self) -> Result<Option<Vec<u8>>> {
        match self.read(MIMETYPE_PATH) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(EpubError::MissingEntry(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Contents of `mimetype`, checked against `application/epub+zip`
    pub fn check_mimetype(&mut self) -> Result<()> {
        let contents = self.mimetype()?;
        validate_mimetype(contents.as_deref())
    }

    pub fn container(&mut self) -> Result<Container> {
        let xml = self.read_string(CONTAINER_XML_PATH)?;
        Container::parse(&xml)
    }

    /// Archive path of the package document, from `container.xml`
    pub fn package_path(&mut self) -> Result<String> {
        Ok(self.container()?.package_path().to_string())
    }

    /// Archive path of an href found in the package document
    pub fn resolve(&mut self, href: &str) -> Result<String> {
        let package_path = self.package_path()?;
        Ok(resolve_href(parent_dir(&package_path), href))
    }

    pub fn package(&mut self) -> Result<Package> {
        let path = self.package_path()?;
        self.package_at(&path)
    }

    pub fn package_at(&mut self, package_path: &str) -> Result<Package> {
        let xml = self.read_string(package_path)?;
        Package::parse(&xml)
    }

    /// Table of contents: nav document first, NCX second, spine last
    pub fn toc(&mut self, package_path: &str, package: &Package) -> Result<(TocSource, Vec<TocEntry>)> {
        let package_dir = parent_dir(package_path);

        if let Some(nav) = package.nav_item() {
            let path = resolve_href(package_dir, &nav.href);
            match self.read_string(&path).and_then(|xml| parse_nav(&xml)) {
                Ok(entries) if !entries.is_empty() => return Ok((TocSource::Nav, entries)),
                Ok(_) => tracing::debug!("Navigation document {} has no entries", path),
                Err(e) => tracing::warn!("Unreadable navigation document {}: {}", path, e),
            }
        }

        if let Some(ncx) = package.ncx_item() {
            let path = resolve_href(package_dir, &ncx.href);
            match self.read_string(&path).and_then(|xml| parse_ncx(&xml)) {
                Ok(entries) if !entries.is_empty() => return Ok((TocSource::Ncx, entries)),
                Ok(_) => tracing::debug!("NCX {} has an empty navMap", path),
                Err(e) => tracing::warn!("Unreadable NCX {}: {}", path, e),
            }
        }

        Ok((TocSource::Spine, toc_from_spine(package)))
    }

    pub fn summary(&mut self) -> Result<BookSummary> {
        let package_path = self.package_path()?;
        let package = self.package_at(&package_path)?;
        let package_dir = parent_dir(&package_path);
        let (toc_source, toc) = self.toc(&package_path, &package)?;

        let spine = package
            .spine_items()
            .filter_map(|(_, item)| item)
            .map(|item| resolve_href(package_dir, &item.href))
            .collect();

        Ok(BookSummary {
            source: self.source.clone(),
            title: package.metadata.title().map(|s| s.to_string()),
            creators: package.metadata.creators.clone(),
            language: package.metadata.languages.first().cloned(),
            version: package.version.clone(),
            layout: PackageLayout::from_package_path(&package_path),
            producer: Producer::detect(&package.metadata),
            entry_count: self.archive.len(),
            manifest_count: package.manifest.len(),
            cover: package
                .cover_item()
                .map(|item| resolve_href(package_dir, &item.href)),
            spine,
            toc_source,
            toc,
            package_path,
        })
    }
}

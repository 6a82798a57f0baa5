//! Layout conventions
//!
//! Fan-fiction archive downloads (calibre-built) keep `content.opf` and
//! `toc.ncx` at the archive root next to `titlepage.xhtml` and split
//! `*_split_000.xhtml` files. Project Gutenberg and most other producers put
//! everything under `OEBPS/`, and EPUB 3 tooling tends to use `EPUB/` or
//! `OPS/`. This module names which convention an archive follows.

use serde::Serialize;

use super::opf::Metadata;
use crate::path::parent_dir;

/// Where the package document lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "dir")]
pub enum PackageLayout {
    /// `content.opf` at the archive root
    Root,
    /// `OEBPS/` (Open eBook Publication Structure)
    Oebps,
    Ops,
    /// `EPUB/`, the EPUB 3 sample layout
    Epub,
    Other(String),
}

impl PackageLayout {
    pub fn from_package_path(package_path: &str) -> Self {
        let dir = parent_dir(package_path);
        match dir.to_ascii_uppercase().as_str() {
            "" => PackageLayout::Root,
            "OEBPS" => PackageLayout::Oebps,
            "OPS" => PackageLayout::Ops,
            "EPUB" => PackageLayout::Epub,
            _ => PackageLayout::Other(dir.to_string()),
        }
    }
}

impl std::fmt::Display for PackageLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageLayout::Root => write!(f, "package at archive root"),
            PackageLayout::Oebps => write!(f, "OEBPS/"),
            PackageLayout::Ops => write!(f, "OPS/"),
            PackageLayout::Epub => write!(f, "EPUB/"),
            PackageLayout::Other(dir) => write!(f, "{}/", dir),
        }
    }
}

/// Who most likely produced the file, judged from its metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Producer {
    FanFictionArchive,
    ProjectGutenberg,
    Calibre,
    Unknown,
}

impl Producer {
    pub fn detect(metadata: &Metadata) -> Self {
        let mut haystack: Vec<String> = Vec::new();
        haystack.extend(metadata.publisher.iter().cloned());
        haystack.extend(metadata.source.iter().cloned());
        haystack.extend(metadata.identifiers.iter().map(|i| i.value.clone()));
        let haystack = haystack.join(" ").to_lowercase();

        if haystack.contains("archiveofourown") || haystack.contains("archive of our own") {
            Producer::FanFictionArchive
        } else if haystack.contains("gutenberg") {
            Producer::ProjectGutenberg
        } else if metadata
            .generator
            .as_deref()
            .map(|g| g.to_lowercase().contains("calibre"))
            .unwrap_or(false)
        {
            Producer::Calibre
        } else {
            Producer::Unknown
        }
    }
}

impl std::fmt::Display for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Producer::FanFictionArchive => "fan-fiction archive",
            Producer::ProjectGutenberg => "Project Gutenberg",
            Producer::Calibre => "calibre",
            Producer::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

//! Set the cover image of an EPUB
//!
//! The image is stored beside the package document and registered twice: as a
//! manifest item and through `<meta name="cover">`. Every other entry is
//! copied into the new archive without being recompressed.

use std::path::Path;

use serde::Serialize;

use crate::config::Config;
use crate::epub::container::MIMETYPE_PATH;
use crate::epub::EpubArchive;
use crate::error::{EpubError, Result};
use crate::path::{join, parent_dir};
use crate::rewrite::{EpubWriter, StagedFile};
use crate::xml::{Document, Element};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverSummary {
    pub source: String,
    pub destination: String,
    pub package_path: String,
    /// Archive path the image was written to
    pub cover_path: String,
    pub item_id: String,
    pub media_type: String,
    /// An entry already sat at `cover_path` and was replaced
    pub replaced_entry: bool,
}

/// Write a copy of `src` to `dst` with `image` as its cover.
///
/// An existing `dst` is only replaced when `overwrite` is set; asking the
/// user is the caller's business.
pub fn set_cover(src: &Path, dst: &Path, image: &Path, overwrite: bool, config: &Config) -> Result<CoverSummary> {
    if !src.is_file() {
        return Err(EpubError::NotAnEpub(src.display().to_string()));
    }
    if !image.is_file() {
        return Err(EpubError::NotARegularFile(image.display().to_string()));
    }
    if dst.exists() && !overwrite {
        return Err(EpubError::DestinationExists(dst.display().to_string()));
    }

    let mut archive = EpubArchive::open(src)?;
    archive.check_mimetype()?;
    let package_path = archive.package_path()?;
    let mut package = Document::parse(&archive.read_string(&package_path)?)?;

    let cover_href = cover_file_name(&config.cover_stem, image);
    let cover_path = join(parent_dir(&package_path), &cover_href);
    let media_type = mime_guess::from_path(image).first_or_octet_stream().to_string();
    let epub3 = package.root.attr("version").map(|v| v.starts_with('3')).unwrap_or(false);

    let item_id = match package.root.child_mut("manifest") {
        Some(manifest) => register_item(manifest, &cover_href, &media_type, epub3),
        None => {
            tracing::warn!("Unable to find manifest tag in {}", package_path);
            "cover".to_string()
        }
    };
    match package.root.child_mut("metadata") {
        Some(metadata) => register_meta(metadata, &item_id),
        None => tracing::warn!("Unable to find metadata tag in {}", package_path),
    }
    let opf = package.to_xml(config.xml_indent)?;
    let data = std::fs::read(image)?;

    let (staged, file) = StagedFile::create(dst)?;
    let mut writer = EpubWriter::new(file, config.compression.method())?;
    let mut replaced_entry = false;

    for entry in archive.entries()? {
        if entry.name == MIMETYPE_PATH {
            continue;
        }
        if entry.name == cover_path {
            tracing::warn!(
                "{} is already present in {}. Are you sure a cover image has not already been set? Overwriting the file...",
                entry.name,
                archive.source()
            );
            replaced_entry = true;
            continue;
        }
        if entry.name == package_path {
            writer.write_file(&package_path, opf.as_bytes())?;
            continue;
        }
        writer.copy_raw(archive.zip_mut(), entry.index)?;
    }
    writer.write_file(&cover_path, &data)?;

    let file = writer.finish()?;
    staged.commit(file)?;
    tracing::info!("Written output to {}", dst.display());

    Ok(CoverSummary {
        source: src.display().to_string(),
        destination: dst.display().to_string(),
        package_path,
        cover_path,
        item_id,
        media_type,
        replaced_entry,
    })
}

/// `cover.png` for `photo.PNG`; no extension leaves the stem alone
fn cover_file_name(stem: &str, image: &Path) -> String {
    match image.extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{}.{}", stem, ext.to_lowercase()),
        _ => stem.to_string(),
    }
}

/// Add or update the manifest item for the cover, returning its id
fn register_item(manifest: &mut Element, href: &str, media_type: &str, epub3: bool) -> String {
    let existing = manifest
        .elements_mut()
        .filter(|e| e.local_name() == "item")
        .find(|e| e.attr("href") == Some(href));

    if let Some(item) = existing {
        tracing::debug!("Manifest already lists {}", href);
        item.set_attr("media-type", media_type);
        if epub3 {
            add_property(item, "cover-image");
        }
        return item.attr("id").unwrap_or("cover").to_string();
    }

    let id = unused_id(manifest);
    let mut item = Element::new("item")
        .with_attr("id", &id)
        .with_attr("href", href)
        .with_attr("media-type", media_type);
    if epub3 {
        item.set_attr("properties", "cover-image");
    }
    manifest.push(item);
    id
}

/// `cover`, unless something else in the manifest already uses it
fn unused_id(manifest: &Element) -> String {
    let taken = |id: &str| {
        manifest
            .elements()
            .any(|e| e.local_name() == "item" && e.attr("id") == Some(id))
    };
    std::iter::once("cover".to_string())
        .chain(std::iter::once("cover-image".to_string()))
        .chain((2..).map(|n| format!("cover-image-{}", n)))
        .find(|id| !taken(id))
        .unwrap_or_else(|| "cover".to_string())
}

fn add_property(item: &mut Element, property: &str) {
    let properties = item.attr("properties").unwrap_or_default();
    if properties.split_whitespace().any(|p| p == property) {
        return;
    }
    let properties = format!("{} {}", properties, property).trim().to_string();
    item.set_attr("properties", &properties);
}

fn register_meta(metadata: &mut Element, item_id: &str) {
    let existing = metadata
        .elements_mut()
        .filter(|e| e.local_name() == "meta")
        .find(|e| e.attr("name") == Some("cover"));

    match existing {
        Some(meta) if meta.attr("content") == Some(item_id) => {}
        Some(meta) => {
            tracing::warn!(
                "Replacing cover meta pointing at {:?}",
                meta.attr("content").unwrap_or_default()
            );
            meta.set_attr("content", item_id);
        }
        None => metadata.push(
            Element::new("meta")
                .with_attr("name", "cover")
                .with_attr("content", item_id),
        ),
    }
}

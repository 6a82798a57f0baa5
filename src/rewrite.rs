//! Writing EPUB archives
//!
//! Every archive written here starts with an uncompressed `mimetype` entry.
//! Output goes to `<dst>.part` first and is renamed into place by
//! [`StagedFile::commit`], so a failed rewrite leaves no half-written book.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::epub::container::{MIMETYPE_DATA, MIMETYPE_PATH};
use crate::error::Result;

/// ZIP writer that knows the EPUB entry-order rules
pub struct EpubWriter<W: Write + Seek> {
    inner: ZipWriter<W>,
    compression: CompressionMethod,
    written: HashSet<String>,
}

impl<W: Write + Seek> EpubWriter<W> {
    /// Start an archive, writing `mimetype` as the first, stored entry
    pub fn new(inner: W, compression: CompressionMethod) -> Result<Self> {
        let mut writer = Self {
            inner: ZipWriter::new(inner),
            compression,
            written: HashSet::new(),
        };
        writer.start(MIMETYPE_PATH, CompressionMethod::Stored)?;
        writer.inner.write_all(MIMETYPE_DATA)?;
        Ok(writer)
    }

    fn start(&mut self, name: &str, method: CompressionMethod) -> Result<()> {
        let options = SimpleFileOptions::default()
            .compression_method(method)
            .unix_permissions(0o644);
        self.inner.start_file(name, options)?;
        self.written.insert(name.to_string());
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.written.contains(name)
    }

    /// Write an entry; returns `false` and skips it when the name is taken
    pub fn write_file(&mut self, name: &str, data: &[u8]) -> Result<bool> {
        if self.contains(name) {
            tracing::warn!("Skipping duplicate entry {}", name);
            return Ok(false);
        }
        self.start(name, self.compression)?;
        self.inner.write_all(data)?;
        tracing::debug!("Wrote {} ({} bytes)", name, data.len());
        Ok(true)
    }

    /// Copy entry `index` of `source` without recompressing it
    pub fn copy_raw<R: Read + Seek>(
        &mut self,
        source: &mut zip::ZipArchive<R>,
        index: usize,
    ) -> Result<bool> {
        let file = source.by_index_raw(index)?;
        let name = file.name().to_string();
        if self.contains(&name) {
            tracing::warn!("Skipping duplicate entry {}", name);
            return Ok(false);
        }
        self.inner.raw_copy_file(file)?;
        tracing::debug!("Copied {}", name);
        self.written.insert(name);
        Ok(true)
    }

    pub fn finish(self) -> Result<W> {
        Ok(self.inner.finish()?)
    }
}

/// An output file written beside its destination and renamed on commit
pub struct StagedFile {
    temp: PathBuf,
    dst: PathBuf,
}

impl StagedFile {
    /// Create `<dst>.part`, returning the guard and the open file
    pub fn create(dst: &Path) -> Result<(Self, File)> {
        if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut name = dst
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "output.epub".into());
        name.push(".part");
        let temp = dst.with_file_name(name);
        let file = File::create(&temp)?;
        let staged = Self {
            temp,
            dst: dst.to_path_buf(),
        };
        Ok((staged, file))
    }

    /// Flush `file` and move it over the destination
    pub fn commit(self, file: File) -> Result<()> {
        file.sync_all()?;
        drop(file);
        std::fs::rename(&self.temp, &self.dst)?;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        // Already gone after a successful rename.
        let _ = std::fs::remove_file(&self.temp);
    }
}

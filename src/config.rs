//! Configuration management for epub-anatomy

use serde::Deserialize;
use std::env;

/// Compression used for every entry except `mimetype`, which is always stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Deflated,
    Stored,
}

impl Compression {
    pub fn method(self) -> zip::CompressionMethod {
        match self {
            Compression::Deflated => zip::CompressionMethod::Deflated,
            Compression::Stored => zip::CompressionMethod::Stored,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// File stem for an inserted cover image, `cover` gives `cover.jpg`
    pub cover_stem: String,
    /// Indentation width used when re-serializing OPF and NCX documents
    pub xml_indent: usize,
    pub compression: Compression,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cover_stem: "cover".to_string(),
            xml_indent: 2,
            compression: Compression::Deflated,
        }
    }
}

impl Config {
    /// Build a config from `EPUB_ANATOMY_*` variables.
    ///
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Config {
            cover_stem: match env::var("EPUB_ANATOMY_COVER_STEM") {
                Ok(v) if !v.trim().is_empty() && !v.contains('/') => v,
                Ok(v) => {
                    tracing::warn!("Ignoring invalid EPUB_ANATOMY_COVER_STEM={:?}", v);
                    defaults.cover_stem
                }
                Err(_) => defaults.cover_stem,
            },
            xml_indent: match env::var("EPUB_ANATOMY_XML_INDENT") {
                Ok(v) => v.parse().unwrap_or_else(|_| {
                    tracing::warn!("Ignoring invalid EPUB_ANATOMY_XML_INDENT={:?}", v);
                    defaults.xml_indent
                }),
                Err(_) => defaults.xml_indent,
            },
            compression: match env::var("EPUB_ANATOMY_COMPRESSION")
                .unwrap_or_else(|_| "deflated".to_string())
                .to_lowercase()
                .as_str()
            {
                "stored" | "store" | "none" => Compression::Stored,
                "deflated" | "deflate" => Compression::Deflated,
                other => {
                    tracing::warn!("Ignoring unknown EPUB_ANATOMY_COMPRESSION={:?}", other);
                    defaults.compression
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cover_stem, "cover");
        assert_eq!(config.xml_indent, 2);
        assert_eq!(config.compression.method(), zip::CompressionMethod::Deflated);
    }

    // The only test touching these variables, so nothing races on them.
    #[test]
    fn test_from_env_falls_back_on_invalid_values() {
        env::set_var("EPUB_ANATOMY_COVER_STEM", "front");
        env::set_var("EPUB_ANATOMY_XML_INDENT", "4");
        env::set_var("EPUB_ANATOMY_COMPRESSION", "Stored");
        let config = Config::from_env();
        assert_eq!(config.cover_stem, "front");
        assert_eq!(config.xml_indent, 4);
        assert_eq!(config.compression, Compression::Stored);

        env::set_var("EPUB_ANATOMY_COVER_STEM", "images/front");
        env::set_var("EPUB_ANATOMY_XML_INDENT", "wide");
        env::set_var("EPUB_ANATOMY_COMPRESSION", "zstd");
        let config = Config::from_env();
        assert_eq!(config.cover_stem, "cover");
        assert_eq!(config.xml_indent, 2);
        assert_eq!(config.compression, Compression::Deflated);

        env::set_var("EPUB_ANATOMY_COVER_STEM", "  ");
        assert_eq!(Config::from_env().cover_stem, "cover");

        env::remove_var("EPUB_ANATOMY_COVER_STEM");
        env::remove_var("EPUB_ANATOMY_XML_INDENT");
        env::remove_var("EPUB_ANATOMY_COMPRESSION");
        let config = Config::from_env();
        assert_eq!(config.cover_stem, "cover");
        assert_eq!(config.compression, Compression::Deflated);
    }
}

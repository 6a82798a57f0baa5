//! `mimetype` and `META-INF/container.xml`

use serde::Serialize;

use crate::error::{EpubError, Result};
use crate::xml::parse_readonly;

/// Where the `mimetype` file should be stored
pub const MIMETYPE_PATH: &str = "mimetype";

/// What the `mimetype` file must contain, with no trailing newline
pub const MIMETYPE_DATA: &[u8] = b"application/epub+zip";

/// The fixed location of the container document
pub const CONTAINER_XML_PATH: &str = "META-INF/container.xml";

/// Media type of an OPF package document rootfile
pub const PACKAGE_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// Check the contents of a `mimetype` entry, `None` meaning it is absent
pub fn validate_mimetype(contents: Option<&[u8]>) -> Result<()> {
    let contents = contents.ok_or(EpubError::MissingMimetype)?;
    if contents != MIMETYPE_DATA {
        return Err(EpubError::BadMimetype {
            found: String::from_utf8_lossy(contents).into_owned(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rootfile {
    pub full_path: String,
    pub media_type: Option<String>,
}

/// Parsed `container.xml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Container {
    pub rootfiles: Vec<Rootfile>,
}

impl Container {
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = parse_readonly(xml)?;

        let rootfiles: Vec<Rootfile> = doc
            .descendants()
            .filter(|n| n.tag_name().name() == "rootfile")
            .filter(|n| n.parent().map(|p| p.tag_name().name() == "rootfiles").unwrap_or(false))
            .filter_map(|n| {
                let full_path = n.attribute("full-path")?.trim();
                if full_path.is_empty() {
                    return None;
                }
                Some(Rootfile {
                    full_path: full_path.trim_start_matches('/').to_string(),
                    media_type: n.attribute("media-type").map(|s| s.to_string()),
                })
            })
            .collect();

        if rootfiles.is_empty() {
            return Err(EpubError::MissingRootfile);
        }
        Ok(Self { rootfiles })
    }

    /// Path of the OPF package document.
    ///
    /// Prefers the first rootfile declared as an OPF package, since a
    /// container may list alternate renditions first.
    pub fn package_path(&self) -> &str {
        self.rootfiles
            .iter()
            .find(|r| r.media_type.as_deref() == Some(PACKAGE_MEDIA_TYPE))
            .unwrap_or(&self.rootfiles[0])
            .full_path
            .as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mimetype_validation() {
        assert!(validate_mimetype(Some(b"application/epub+zip")).is_ok());
        assert!(matches!(validate_mimetype(None), Err(EpubError::MissingMimetype)));
        match validate_mimetype(Some(b"application/epub+zip\n")) {
            Err(EpubError::BadMimetype { found }) => assert_eq!(found, "application/epub+zip\n"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_container_picks_package_rootfile() {
        let xml = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/book.pdf" media-type="application/pdf"/>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;
        let container = Container::parse(xml).unwrap();
        assert_eq!(container.rootfiles.len(), 2);
        assert_eq!(container.package_path(), "OEBPS/content.opf");
    }

    #[test]
    fn test_container_without_media_type_uses_first() {
        let xml = r#"<container xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="content.opf"/></rootfiles></container>"#;
        assert_eq!(Container::parse(xml).unwrap().package_path(), "content.opf");
    }

    #[test]
    fn test_container_without_rootfile() {
        let xml = r#"<container xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles/></container>"#;
        assert!(matches!(Container::parse(xml), Err(EpubError::MissingRootfile)));
    }
}

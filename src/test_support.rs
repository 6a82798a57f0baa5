//! In-memory EPUB fixtures for tests

use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub(crate) struct EpubFixture {
    entries: Vec<(String, Vec<u8>, CompressionMethod)>,
}

impl EpubFixture {
    pub(crate) fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// A two-chapter EPUB 2 book laid out under `OEBPS/`
    pub(crate) fn standard(title: &str) -> Self {
        Self::empty()
            .stored("mimetype", "application/epub+zip")
            .file("META-INF/container.xml", CONTAINER)
            .file("OEBPS/content.opf", standard_opf(title))
            .file("OEBPS/toc.ncx", standard_ncx(title))
            .file("OEBPS/Text/chapter1.xhtml", CHAPTER1)
            .file("OEBPS/Text/chapter2.xhtml", CHAPTER2)
            .file("OEBPS/Styles/style.css", STYLE)
            .file("OEBPS/Images/pic.png", [0x89u8, b'P', b'N', b'G', 0, 1, 2, 3])
    }

    /// Add or replace a deflated entry
    pub(crate) fn file(self, name: &str, data: impl AsRef<[u8]>) -> Self {
        self.put(name, data.as_ref(), CompressionMethod::Deflated)
    }

    /// Add or replace a stored entry
    pub(crate) fn stored(self, name: &str, data: impl AsRef<[u8]>) -> Self {
        self.put(name, data.as_ref(), CompressionMethod::Stored)
    }

    pub(crate) fn without(mut self, name: &str) -> Self {
        self.entries.retain(|(n, _, _)| n != name);
        self
    }

    fn put(mut self, name: &str, data: &[u8], method: CompressionMethod) -> Self {
        match self.entries.iter_mut().find(|(n, _, _)| n == name) {
            Some(entry) => {
                entry.1 = data.to_vec();
                entry.2 = method;
            }
            None => self.entries.push((name.to_string(), data.to_vec(), method)),
        }
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data, method) in &self.entries {
            let options = SimpleFileOptions::default().compression_method(*method);
            zip.start_file(name.as_str(), options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    pub(crate) fn write_to(&self, path: &Path) {
        std::fs::write(path, self.build()).unwrap();
    }
}

const CONTAINER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

fn standard_opf(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>{title}</dc:title>
    <dc:creator opf:role="aut">Jane Doe</dc:creator>
    <dc:language>en</dc:language>
    <dc:identifier id="bookid">urn:uuid:{title}</dc:identifier>
    <dc:publisher>Archive of Our Own</dc:publisher>
    <meta name="generator" content="calibre"/>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="style" href="Styles/style.css" media-type="text/css"/>
    <item id="pic" href="Images/pic.png" media-type="image/png"/>
    <item id="chapter1" href="Text/chapter1.xhtml" media-type="application/xhtml+xml"/>
    <item id="chapter2" href="Text/chapter2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="chapter1"/>
    <itemref idref="chapter2"/>
  </spine>
  <guide>
    <reference type="text" title="Start" href="Text/chapter1.xhtml"/>
  </guide>
</package>"#
    )
}

fn standard_ncx(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="urn:uuid:{title}"/>
  </head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
    <navPoint id="navpoint-1" playOrder="1">
      <navLabel><text>Chapter 1</text></navLabel>
      <content src="Text/chapter1.xhtml"/>
    </navPoint>
    <navPoint id="navpoint-2" playOrder="2">
      <navLabel><text>Chapter 2</text></navLabel>
      <content src="Text/chapter2.xhtml#part"/>
    </navPoint>
  </navMap>
</ncx>"#
    )
}

const CHAPTER1: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <title>Chapter 1</title>
  <link href="../Styles/style.css" rel="stylesheet" type="text/css"/>
</head>
<body>
  <h1>Chapter 1</h1>
  <p><img src="../Images/pic.png" alt="pic"/></p>
  <p><a href="chapter2.xhtml#part">Onwards</a> or <a href="#top">back up</a>.</p>
</body>
</html>"##;

const CHAPTER2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <title>Chapter 2</title>
  <link href='../Styles/style.css' rel="stylesheet" type="text/css"/>
</head>
<body>
  <h1 id="part">Chapter 2</h1>
  <p><a href="chapter1.xhtml">Back</a>, <a href="https://archiveofourown.org/">source</a>.</p>
</body>
</html>"#;

const STYLE: &str = "body { background: url(\"../Images/pic.png\") no-repeat; }\n";

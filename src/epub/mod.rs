//! EPUB container model
//!
//! Reading side of the crate: the `mimetype`/`container.xml` pair, the OPF
//! package document, NCX and nav tables of contents, and the archive
//! inspector tying them together.

mod archive;
pub mod container;
pub mod layout;
pub mod opf;
pub mod toc;

pub use archive::{ArchiveEntry, BookSummary, EpubArchive, TocSource};
pub use container::{Container, Rootfile, CONTAINER_XML_PATH, MIMETYPE_DATA, MIMETYPE_PATH};
pub use layout::{PackageLayout, Producer};
pub use opf::{Creator, GuideReference, Identifier, ManifestItem, Metadata, Package, Spine, SpineItem};
pub use toc::TocEntry;

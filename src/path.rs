//! Archive-internal path handling
//!
//! EPUB hrefs are URLs relative to the document that contains them, while
//! ZIP entry names are plain `/`-separated paths from the archive root.
//! Nothing here touches the file system.

/// Directory part of an archive path, `""` for entries at the root
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// File name part of an archive path
pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// Split `Text/ch1.xhtml#part` into `("Text/ch1.xhtml", Some("part"))`
pub fn split_fragment(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    }
}

/// Whether an href points outside the archive (`http:`, `mailto:`, ...)
pub fn is_external(href: &str) -> bool {
    match href.split_once(':') {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && !scheme.contains('/')
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Join `rel` onto `base_dir`, collapsing `.` and `..` segments
pub fn join(base_dir: &str, rel: &str) -> String {
    let mut segments: Vec<&str> = if rel.starts_with('/') {
        Vec::new()
    } else {
        base_dir.split('/').filter(|s| !s.is_empty()).collect()
    };

    for segment in rel.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Resolve an href found in a document living in `base_dir` to the archive
/// entry name it designates. Fragment and query are dropped and
/// percent-escapes decoded.
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let (path, _) = split_fragment(href);
    let path = path.split('?').next().unwrap_or(path);
    let decoded = urlencoding::decode(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string());
    join(base_dir, &decoded)
}

/// Prepend `prefix` to the file name of `path`, keeping its directories.
///
/// `prefix_file_name("0_", "Text/ch1.xhtml")` gives `Text/0_ch1.xhtml`.
pub fn prefix_file_name(prefix: &str, path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, name)) => format!("{}/{}{}", dir, prefix, name),
        None => format!("{}{}", prefix, path),
    }
}

/// Relative, percent-encoded href from documents in `from_dir` to the
/// archive entry `target`.
pub fn relative_href(from_dir: &str, target: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = target.split('/').filter(|s| !s.is_empty()).collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take(to.len().saturating_sub(1))
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    parts.extend(std::iter::repeat("..".to_string()).take(from.len() - common));
    parts.extend(to[common..].iter().map(|s| urlencoding::encode(s).into_owned()));
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_and_file_name() {
        assert_eq!(parent_dir("OEBPS/content.opf"), "OEBPS");
        assert_eq!(parent_dir("content.opf"), "");
        assert_eq!(file_name("OEBPS/Text/a.xhtml"), "a.xhtml");
        assert_eq!(file_name("toc.ncx"), "toc.ncx");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("OEBPS", "Text/ch1.xhtml"), "OEBPS/Text/ch1.xhtml");
        assert_eq!(join("OEBPS/Text", "../Styles/a.css"), "OEBPS/Styles/a.css");
        assert_eq!(join("", "./content.opf"), "content.opf");
        assert_eq!(join("res", "../1"), "1");
        assert_eq!(join("OEBPS/Text", "/cover.jpg"), "cover.jpg");
    }

    #[test]
    fn test_resolve_href_decodes_and_drops_fragment() {
        assert_eq!(
            resolve_href("OEBPS/Text", "Chapter%201.xhtml#p3"),
            "OEBPS/Text/Chapter 1.xhtml"
        );
        assert_eq!(resolve_href("", "toc.ncx"), "toc.ncx");
    }

    #[test]
    fn test_is_external() {
        assert!(is_external("http://archiveofourown.org/works/1"));
        assert!(is_external("mailto:someone@example.com"));
        assert!(!is_external("Text/ch1.xhtml"));
        assert!(!is_external("#note"));
        assert!(!is_external("odd/name:with-colon.xhtml"));
    }

    #[test]
    fn test_prefix_file_name() {
        assert_eq!(prefix_file_name("0_", "stylesheet.css"), "0_stylesheet.css");
        assert_eq!(prefix_file_name("1_", "Text/ch1.xhtml"), "Text/1_ch1.xhtml");
    }

    #[test]
    fn test_relative_href() {
        assert_eq!(relative_href("OEBPS", "OEBPS/Text/1_a.xhtml"), "Text/1_a.xhtml");
        assert_eq!(relative_href("OEBPS/Text", "OEBPS/Styles/s.css"), "../Styles/s.css");
        assert_eq!(relative_href("", "chapter one.xhtml"), "chapter%20one.xhtml");
        assert_eq!(relative_href("a", "a"), "../a");
    }
}

//! Minimal owned XML tree
//!
//! `roxmltree` gives read-only documents, which is all inspection needs.
//! Rewriting a package document or an NCX needs something editable, so this
//! module keeps a small tree built from `quick-xml` events. Element names keep
//! their prefixes verbatim (`dc:title`), and lookups match on the local name
//! so a default namespace and a prefixed one behave the same.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{EpubError, Result};

/// Parse read-only with DTDs allowed; NCX files usually carry a DOCTYPE.
pub fn parse_readonly(text: &str) -> Result<roxmltree::Document<'_>> {
    let mut options = roxmltree::ParsingOptions::default();
    options.allow_dtd = true;
    Ok(roxmltree::Document::parse_with_options(
        strip_bom(text),
        options,
    )?)
}

/// Drop a leading UTF-8 byte order mark
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    /// Attribute value by qualified name, falling back to local name
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .or_else(|| self.attributes.iter().find(|(k, _)| local(k) == key))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attributes.push((key.to_string(), value.to_string())),
        }
    }

    pub fn remove_attr(&mut self, key: &str) {
        self.attributes.retain(|(k, _)| k != key);
    }

    /// Child elements in document order
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First child element with the given local name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.local_name() == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.local_name() == name)
    }

    /// Depth-first search over descendants by local name
    pub fn find(&self, name: &str) -> Option<&Element> {
        for e in self.elements() {
            if e.local_name() == name {
                return Some(e);
            }
            if let Some(found) = e.find(name) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Element> {
        for e in self.elements_mut() {
            if e.local_name() == name {
                return Some(e);
            }
            if let Some(found) = e.find_mut(name) {
                return Some(found);
            }
        }
        None
    }

    pub fn push(&mut self, element: Element) {
        self.children.push(Node::Element(element));
    }

    /// Remove all children, keeping the element's own attributes
    pub fn clear(&mut self) {
        self.children.clear();
    }

    /// Take the child elements out, leaving text and comments in place
    pub fn take_elements(&mut self) -> Vec<Element> {
        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(self.children.len());
        for node in self.children.drain(..) {
            match node {
                Node::Element(e) => taken.push(e),
                other => kept.push(other),
            }
        }
        self.children = kept;
        taken
    }

    /// Concatenated text of this element and its descendants
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Text(t) | Node::CData(t) => out.push_str(t),
                Node::Element(e) => out.push_str(&e.text()),
                Node::Comment(_) => {}
            }
        }
        out
    }

    fn from_start(start: &BytesStart) -> Result<Self> {
        let name = String::from_utf8(start.name().as_ref().to_vec())?;
        let mut element = Element::new(name);
        for attr in start.attributes() {
            let attr = attr.map_err(|e| EpubError::Xml(e.to_string()))?;
            let key = String::from_utf8(attr.key.as_ref().to_vec())?;
            let value = attr.unescape_value()?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    fn write<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (k, v) in &self.attributes {
            start.push_attribute((k.as_str(), v.as_str()));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        for node in &self.children {
            match node {
                Node::Element(e) => e.write(writer)?,
                Node::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
                Node::CData(t) => {
                    writer.write_event(Event::CData(quick_xml::events::BytesCData::new(t)))?
                }
                Node::Comment(t) => {
                    writer.write_event(Event::Comment(BytesText::from_escaped(t.as_str())))?
                }
            }
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

/// An editable XML document: optional DOCTYPE plus a root element
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub doctype: Option<String>,
    pub root: Element,
}

impl Document {
    /// Parse, dropping whitespace-only text between elements
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(strip_bom(text));
        reader.trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut doctype = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                EpubError::Xml(format!("at byte {}: {}", reader.buffer_position(), e))
            })?;
            match event {
                Event::Start(e) => stack.push(Element::from_start(&e)?),
                Event::Empty(e) => {
                    let element = Element::from_start(&e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| EpubError::Xml("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(t) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(t.unescape()?.into_owned()));
                    }
                }
                Event::CData(t) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::CData(String::from_utf8(t.into_inner().into_owned())?));
                    }
                }
                Event::Comment(t) => {
                    if let Some(parent) = stack.last_mut() {
                        parent
                            .children
                            .push(Node::Comment(String::from_utf8(t.into_inner().into_owned())?));
                    }
                }
                Event::DocType(t) => {
                    doctype = Some(String::from_utf8(t.into_inner().into_owned())?.trim().to_string());
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(EpubError::Xml(format!("unclosed element <{}>", stack[stack.len() - 1].name)));
        }
        let root = root.ok_or_else(|| EpubError::Xml("document has no root element".to_string()))?;
        Ok(Self { doctype, root })
    }

    /// Serialize with an XML declaration, indenting nested elements
    pub fn to_xml(&self, indent: usize) -> Result<String> {
        let mut writer = if indent == 0 {
            Writer::new(Vec::new())
        } else {
            Writer::new_with_indent(Vec::new(), b' ', indent)
        };
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        if let Some(doctype) = &self.doctype {
            writer.write_event(Event::DocType(BytesText::from_escaped(doctype.as_str())))?;
        }
        self.root.write(&mut writer)?;

        let mut out = String::from_utf8(writer.into_inner())?;
        out.push('\n');
        Ok(out)
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(EpubError::Xml("more than one root element".to_string())),
    }
    Ok(())
}

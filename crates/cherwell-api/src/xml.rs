// Owned XML element tree
//
// Both the SOAP transport and the business-object document model work on
// this tree. Every element exclusively owns its children, so moving a
// subtree from one document into another is a plain ownership transfer.
// Parsing keeps the declaration, attribute order, whitespace text, comments
// and the spelling of empty tags, so an untouched document serializes back
// to the same bytes.

use std::borrow::Cow;

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use thiserror::Error;

/// Failure to read or write XML text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum XmlError {
    /// The text is not well-formed XML.
    #[error("malformed XML: {0}")]
    Syntax(String),

    /// Well-formed input without any element.
    #[error("XML document has no root element")]
    MissingRoot,

    /// An element was opened but never closed.
    #[error("unclosed element <{0}>")]
    Unclosed(String),

    /// More than one top-level element.
    #[error("XML document has more than one root element (found <{0}>)")]
    MultipleRoots(String),

    /// Serialization produced bytes that are not UTF-8.
    #[error("XML output is not valid UTF-8: {0}")]
    Encoding(String),
}

// ── Nodes ───────────────────────────────────────────────────────────

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

/// How an element without children is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyTag {
    /// `<Field/>`
    #[default]
    SelfClosing,
    /// `<Field />`
    SpacedSelfClosing,
    /// `<Field></Field>`
    Paired,
}

/// An XML element with ordered attributes and owned children.
///
/// Equality is structural: [`EmptyTag`] only affects serialization.
#[derive(Debug, Clone, Default)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
    empty_tag: EmptyTag,
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.attributes == other.attributes
            && self.children == other.children
    }
}

impl Eq for Element {}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            empty_tag: EmptyTag::default(),
        }
    }

    /// Spelling used when this element has no children.
    pub fn empty_tag(&self) -> EmptyTag {
        self.empty_tag
    }

    pub fn set_empty_tag(&mut self, style: EmptyTag) {
        self.empty_tag = style;
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Builder-style child append.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Builder-style text content.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.set_text(text);
        self
    }

    /// Qualified name as written (`soap:Envelope`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name with any namespace prefix removed (`Envelope`).
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Attribute value by exact key.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value matched on the key's local part (`xsi:nil` ~ `nil`).
    pub fn attr_local(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| local_part(k) == key)
            .map(|(_, v)| v.as_str())
    }

    /// Overwrite an existing attribute in place, or append a new one.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.attributes.push((key, value));
        }
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn push_child(&mut self, child: impl Into<Node>) {
        self.children.push(child.into());
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First direct child element with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.local_name() == local_name)
    }

    pub fn child_mut(&mut self, local_name: &str) -> Option<&mut Element> {
        self.child_elements_mut()
            .find(|e| e.local_name() == local_name)
    }

    /// Return the first direct child with `local_name`, appending an empty
    /// one when there is none.
    pub fn child_or_insert(&mut self, local_name: &str) -> &mut Element {
        let position = self
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if e.local_name() == local_name));
        let index = position.unwrap_or_else(|| {
            self.children.push(Node::Element(Element::new(local_name)));
            self.children.len() - 1
        });
        match &mut self.children[index] {
            Node::Element(e) => e,
            // `index` always points at an element: either found above or just pushed.
            _ => unreachable!("child_or_insert index points at a non-element node"),
        }
    }

    /// Pre-order iterator over every element below this one (self excluded).
    pub fn descendants(&self) -> Descendants<'_> {
        let mut stack: Vec<&Element> = self.child_elements().collect();
        stack.reverse();
        Descendants { stack }
    }

    pub fn has_element_children(&self) -> bool {
        self.child_elements().next().is_some()
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Replace all children with a single text node (none for empty text).
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.children.clear();
        if !text.is_empty() {
            self.children.push(Node::Text(text));
        }
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for node in &element.children {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(e, out),
            Node::Comment(_) => {}
        }
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// Iterator returned by [`Element::descendants`].
pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        let before = self.stack.len();
        self.stack.extend(next.child_elements());
        self.stack[before..].reverse();
        Some(next)
    }
}

// ── Documents ───────────────────────────────────────────────────────

/// The `<?xml ...?>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

/// A parsed XML text: optional declaration, one root element, and whatever
/// whitespace or comments surround it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub declaration: Option<Declaration>,
    pub prolog: Vec<Node>,
    pub root: Element,
    pub epilog: Vec<Node>,
}

impl XmlDocument {
    /// Wrap a root element with no declaration.
    pub fn new(root: Element) -> Self {
        Self {
            declaration: None,
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }

    /// Serialize to text. Childless elements keep the tag spelling they were
    /// parsed with; new ones are written self-closed.
    pub fn to_xml(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::new());

        if let Some(decl) = &self.declaration {
            let event = BytesDecl::new(
                &decl.version,
                decl.encoding.as_deref(),
                decl.standalone.as_deref(),
            );
            writer
                .write_event(Event::Decl(event))
                .map_err(|e| XmlError::Syntax(e.to_string()))?;
        }
        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        write_element(&mut writer, &self.root)?;
        for node in &self.epilog {
            write_node(&mut writer, node)?;
        }

        String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Encoding(e.to_string()))
    }
}

/// Serialize a lone element (no declaration).
pub fn element_to_string(element: &Element) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::new());
    write_element(&mut writer, element)?;
    String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Encoding(e.to_string()))
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<(), XmlError> {
    let result = match node {
        Node::Element(e) => return write_element(writer, e),
        Node::Text(t) => {
            writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(t.as_str()))))
        }
        Node::Comment(c) => writer.write_event(Event::Comment(BytesText::from_escaped(c.as_str()))),
    };
    result.map_err(|e| XmlError::Syntax(e.to_string()))
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), XmlError> {
    let mut content = element.name.clone();
    for (key, value) in &element.attributes {
        content.push(' ');
        content.push_str(key);
        content.push_str("=\"");
        content.push_str(&escape_attr(value));
        content.push('"');
    }

    let name_len = element.name.len();
    if element.children.is_empty() {
        let event = match element.empty_tag {
            EmptyTag::SelfClosing => Event::Empty(BytesStart::from_content(content, name_len)),
            EmptyTag::SpacedSelfClosing => {
                content.push(' ');
                Event::Empty(BytesStart::from_content(content, name_len))
            }
            EmptyTag::Paired => {
                writer
                    .write_event(Event::Start(BytesStart::from_content(content, name_len)))
                    .map_err(|e| XmlError::Syntax(e.to_string()))?;
                Event::End(BytesEnd::new(element.name.as_str()))
            }
        };
        return writer
            .write_event(event)
            .map_err(|e| XmlError::Syntax(e.to_string()));
    }

    let start = BytesStart::from_content(content, name_len);

    writer
        .write_event(Event::Start(start))
        .map_err(|e| XmlError::Syntax(e.to_string()))?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(|e| XmlError::Syntax(e.to_string()))
}

/// Attribute values are always double-quoted, so only `"` joins the markup
/// characters.
fn escape_attr(value: &str) -> Cow<'_, str> {
    let escaped = partial_escape(value);
    if escaped.contains('"') {
        Cow::Owned(escaped.replace('"', "&quot;"))
    } else {
        escaped
    }
}

// ── Parsing ─────────────────────────────────────────────────────────

/// Parse XML text into an owned tree.
pub fn parse_document(text: &str) -> Result<XmlDocument, XmlError> {
    let mut reader = Reader::from_str(text);
    let mut builder = TreeBuilder::default();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::Syntax(format!("{e} at byte {}", reader.buffer_position())))?;
        match event {
            Event::Decl(decl) => builder.declaration = Some(declaration_from(&decl)),
            Event::Start(start) => {
                let mut element = element_from_start(&start)?;
                element.empty_tag = EmptyTag::Paired;
                builder.open.push(element);
            }
            Event::Empty(start) => {
                let mut element = element_from_start(&start)?;
                if start.last().is_some_and(u8::is_ascii_whitespace) {
                    element.empty_tag = EmptyTag::SpacedSelfClosing;
                }
                builder.attach(Node::Element(element))?;
            }
            Event::End(_) => {
                let element = builder
                    .open
                    .pop()
                    .ok_or_else(|| XmlError::Syntax("unexpected closing tag".into()))?;
                builder.attach(Node::Element(element))?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| XmlError::Syntax(e.to_string()))?;
                builder.attach(Node::Text(text.into_owned()))?;
            }
            Event::CData(data) => {
                builder.attach(Node::Text(String::from_utf8_lossy(&data).into_owned()))?;
            }
            Event::Comment(comment) => {
                builder.attach(Node::Comment(String::from_utf8_lossy(&comment).into_owned()))?;
            }
            Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    builder.finish()
}

#[derive(Default)]
struct TreeBuilder {
    declaration: Option<Declaration>,
    prolog: Vec<Node>,
    root: Option<Element>,
    epilog: Vec<Node>,
    open: Vec<Element>,
}

impl TreeBuilder {
    fn attach(&mut self, node: Node) -> Result<(), XmlError> {
        if let Some(parent) = self.open.last_mut() {
            parent.children.push(node);
            return Ok(());
        }
        match (node, self.root.is_some()) {
            (Node::Element(e), false) => self.root = Some(e),
            (Node::Element(e), true) => return Err(XmlError::MultipleRoots(e.name)),
            (other, false) => self.prolog.push(other),
            (other, true) => self.epilog.push(other),
        }
        Ok(())
    }

    fn finish(self) -> Result<XmlDocument, XmlError> {
        if let Some(open) = self.open.last() {
            return Err(XmlError::Unclosed(open.name.clone()));
        }
        let root = self.root.ok_or(XmlError::MissingRoot)?;
        Ok(XmlDocument {
            declaration: self.declaration,
            prolog: self.prolog,
            root,
            epilog: self.epilog,
        })
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, XmlError> {
    let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Syntax(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Syntax(e.to_string()))?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn declaration_from(decl: &BytesDecl<'_>) -> Declaration {
    let lossy = |bytes: Cow<'_, [u8]>| String::from_utf8_lossy(&bytes).into_owned();
    Declaration {
        version: decl.version().map_or_else(|_| "1.0".to_owned(), lossy),
        encoding: decl.encoding().and_then(Result::ok).map(lossy),
        standalone: decl.standalone().and_then(Result::ok).map(lossy),
    }
}

//! Namespace-aware XML element tree.
//!
//! Business cards are small documents, so they are read completely into an
//! owned tree before any schema reader looks at them. Whitespace-only text is
//! dropped; element text is the concatenation of its text and CDATA nodes.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XmlError {
    #[error("Malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    #[error("Unbound namespace prefix '{0}'")]
    UnboundPrefix(String),

    #[error("Document has no root element")]
    NoRoot,

    #[error("Document has content after the root element")]
    TrailingContent,
}

/// One element of a parsed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Resolved namespace URI, `None` when the element is unqualified
    pub namespace: Option<String>,
    /// Local name without prefix
    pub name: String,
    /// Attributes in document order, namespace declarations excluded
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Parse a complete document and return its root element.
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        TreeBuilder::default().build(xml)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.name == name
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

#[derive(Default)]
struct TreeBuilder {
    open: Vec<XmlElement>,
    root: Option<XmlElement>,
}

impl TreeBuilder {
    fn build(mut self, xml: &str) -> Result<XmlElement, XmlError> {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        loop {
            let position = reader.buffer_position() as u64;
            let malformed = |message: String| XmlError::Malformed { position, message };
            match reader.read_resolved_event_into(&mut buf) {
                Ok((resolved, Event::Start(e))) => {
                    let element = open_element(resolved, &e, &malformed)?;
                    self.open.push(element);
                }
                Ok((resolved, Event::Empty(e))) => {
                    let element = open_element(resolved, &e, &malformed)?;
                    self.close_element(element)?;
                }
                Ok((_, Event::End(_))) => {
                    let element = self
                        .open
                        .pop()
                        .ok_or_else(|| malformed("unexpected end tag".to_string()))?;
                    self.close_element(element)?;
                }
                Ok((_, Event::Text(t))) => {
                    let text = t.unescape().map_err(|e| malformed(e.to_string()))?;
                    self.append_text(&text, &malformed)?;
                }
                Ok((_, Event::CData(c))) => {
                    let bytes = c.into_inner();
                    let text = std::str::from_utf8(&bytes).map_err(|e| malformed(e.to_string()))?;
                    self.append_text(text, &malformed)?;
                }
                Ok((_, Event::Eof)) => break,
                Ok(_) => {}
                Err(e) => return Err(malformed(e.to_string())),
            }
            buf.clear();
        }

        if !self.open.is_empty() {
            return Err(XmlError::Malformed {
                position: reader.buffer_position() as u64,
                message: "unexpected end of document".to_string(),
            });
        }
        self.root.ok_or(XmlError::NoRoot)
    }

    fn close_element(&mut self, element: XmlElement) -> Result<(), XmlError> {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(element),
            None if self.root.is_none() => self.root = Some(element),
            None => return Err(XmlError::TrailingContent),
        }
        Ok(())
    }

    fn append_text(
        &mut self,
        text: &str,
        malformed: &dyn Fn(String) -> XmlError,
    ) -> Result<(), XmlError> {
        match self.open.last_mut() {
            Some(element) => {
                element.text.push_str(text);
                Ok(())
            }
            None => Err(malformed("text outside the root element".to_string())),
        }
    }
}

/// Build an element from a start tag the reader has already resolved.
fn open_element(
    resolved: ResolveResult<'_>,
    start: &BytesStart<'_>,
    malformed: &dyn Fn(String) -> XmlError,
) -> Result<XmlElement, XmlError> {
    let namespace = match resolved {
        ResolveResult::Bound(Namespace(uri)) => Some(utf8(uri, malformed)?.to_string()),
        ResolveResult::Unbound => None,
        ResolveResult::Unknown(prefix) => {
            return Err(XmlError::UnboundPrefix(
                String::from_utf8_lossy(&prefix).into_owned(),
            ))
        }
    };

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(e.to_string()))?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = utf8(attr.key.as_ref(), malformed)?.to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }

    let local = start.local_name();
    Ok(XmlElement {
        namespace,
        name: utf8(local.as_ref(), malformed)?.to_string(),
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn utf8<'a>(bytes: &'a [u8], malformed: &dyn Fn(String) -> XmlError) -> Result<&'a str, XmlError> {
    std::str::from_utf8(bytes).map_err(|e| malformed(e.to_string()))
}

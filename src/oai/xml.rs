//! Minimal owned element tree over quick-xml events.
//!
//! The OAI-PMH/EDM feed is a deeply nested RDF/XML graph with stable,
//! server-controlled namespace prefixes; elements are matched by their
//! qualified name as emitted (`rdf:Description`, `dc:identifier`, …).
//! Comments, processing instructions and the XML declaration are dropped.

use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML syntax error: {0}")]
    Syntax(String),

    #[error("unbalanced document: {0}")]
    Unbalanced(String),

    #[error("document has no root element")]
    Empty,
}

/// One XML element with its attributes, direct text, and children in
/// document order.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    /// Parse a complete document into its root element.
    pub fn parse(xml: &str) -> Result<Element, XmlError> {
        let mut reader = Reader::from_str(xml);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    stack.push(element_from_start(&start)?);
                }
                Ok(Event::Empty(start)) => {
                    let element = element_from_start(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(end)) => {
                    let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::Unbalanced(format!("unexpected </{name}>")))?;
                    if element.name != name {
                        return Err(XmlError::Unbalanced(format!(
                            "<{}> closed by </{name}>",
                            element.name
                        )));
                    }
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(text)) => {
                    let decoded = text
                        .unescape()
                        .map_err(|e| XmlError::Syntax(e.to_string()))?;
                    append_text(&mut stack, decoded.trim());
                }
                Ok(Event::CData(data)) => {
                    let decoded = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    append_text(&mut stack, decoded.trim());
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(XmlError::Syntax(e.to_string())),
            }
        }

        if let Some(open) = stack.pop() {
            return Err(XmlError::Unbalanced(format!("<{}> never closed", open.name)));
        }
        root.ok_or(XmlError::Empty)
    }

    /// Attribute value by qualified name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given qualified name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given qualified name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed direct text, `None` when empty.
    pub fn text_content(&self) -> Option<&str> {
        let trimmed = self.text.trim();
        if trimmed.is_empty() { None } else { Some(trimmed) }
    }

    /// First descendant with the given name (depth-first), self excluded.
    pub fn descendant(&self, name: &str) -> Option<&Element> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.descendant(name) {
                return Some(found);
            }
        }
        None
    }
}

fn append_text(stack: &mut [Element], text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(current) = stack.last_mut() {
        if !current.text.is_empty() {
            current.text.push(' ');
        }
        current.text.push_str(text);
    }
}

fn element_from_start(start: &quick_xml::events::BytesStart<'_>) -> Result<Element, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Syntax(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Syntax(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(XmlError::Unbalanced(format!(
            "second root element <{}>",
            element.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_with_attributes() {
        let root = Element::parse(
            r#"<?xml version="1.0"?>
            <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
              <rdf:Description rdf:about="http://example.org/a">
                <dc:title xml:lang="en">The Night Watch</dc:title>
                <dc:title xml:lang="nl">De Nachtwacht</dc:title>
                <empty rdf:resource="http://example.org/b"/>
              </rdf:Description>
            </rdf:RDF>"#,
        )
        .unwrap();

        assert_eq!(root.name, "rdf:RDF");
        let desc = root.child("rdf:Description").unwrap();
        assert_eq!(desc.attr("rdf:about"), Some("http://example.org/a"));
        let titles: Vec<_> = desc.children_named("dc:title").collect();
        assert_eq!(titles.len(), 2);
        assert_eq!(titles[0].attr("xml:lang"), Some("en"));
        assert_eq!(titles[0].text_content(), Some("The Night Watch"));
        assert_eq!(
            desc.child("empty").unwrap().attr("rdf:resource"),
            Some("http://example.org/b")
        );
    }

    #[test]
    fn entities_are_unescaped() {
        let root = Element::parse("<a>Tom &amp; Jerry</a>").unwrap();
        assert_eq!(root.text_content(), Some("Tom & Jerry"));
    }

    #[test]
    fn descendant_search() {
        let root = Element::parse("<a><b><c><d>x</d></c></b></a>").unwrap();
        assert_eq!(root.descendant("d").unwrap().text_content(), Some("x"));
        assert!(root.descendant("e").is_none());
    }

    #[test]
    fn unbalanced_documents_error() {
        assert!(matches!(
            Element::parse("<a><b></a>"),
            Err(XmlError::Unbalanced(_)) | Err(XmlError::Syntax(_))
        ));
    }

    #[test]
    fn empty_document_errors() {
        assert!(matches!(Element::parse("  "), Err(XmlError::Empty)));
    }
}

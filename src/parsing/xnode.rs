use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Result, SqlMapperError};

/// One element of a parsed XML document, owned and cheaply clonable so
/// `<sql>` fragments can be grafted into including statements.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlChild>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlChild {
    Element(XmlNode),
    /// Text or CDATA content, entity-decoded, whitespace preserved.
    Text(String),
}

impl XmlNode {
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute that must be present, or a configuration error naming the element.
    pub fn required_attr(&self, name: &str) -> Result<&str> {
        self.attr(name).ok_or_else(|| {
            SqlMapperError::Config(format!(
                "element <{}> is missing required attribute '{name}'",
                self.name
            ))
        })
    }

    /// Child elements, in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlNode> {
        self.children.iter().filter_map(|c| match c {
            XmlChild::Element(e) => Some(e),
            XmlChild::Text(_) => None,
        })
    }

    /// Child elements with the given name.
    pub fn elements_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.elements().filter(move |e| e.name == name)
    }

    #[must_use]
    pub fn first_element<'a>(&'a self, name: &'a str) -> Option<&'a XmlNode> {
        self.elements_named(name).next()
    }

    /// Concatenated text content of this element (direct children only).
    #[must_use]
    pub fn text_body(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let XmlChild::Text(t) = child {
                out.push_str(t);
            }
        }
        out
    }
}

/// Parse a document into its root element. DOCTYPE, comments and
/// processing instructions are skipped.
pub fn parse_document(xml: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().expand_empty_elements = false;

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| SqlMapperError::Config(format!("XML parse error: {e}")))?;
        match event {
            Event::Start(e) => {
                let node = element_from_start(&e)?;
                stack.push(node);
            }
            Event::Empty(e) => {
                let node = element_from_start(&e)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack.pop().ok_or_else(|| {
                    SqlMapperError::Config("unbalanced end tag in XML document".into())
                })?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| SqlMapperError::Config(format!("XML text error: {e}")))?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlChild::Text(text.into_owned()));
                }
            }
            Event::CData(t) => {
                let text = String::from_utf8_lossy(&t).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlChild::Text(text));
                }
            }
            Event::Eof => break,
            // Declarations, doctype, comments and PIs carry nothing we map.
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(SqlMapperError::Config(
            "unterminated element in XML document".into(),
        ));
    }
    root.ok_or_else(|| SqlMapperError::Config("XML document has no root element".into()))
}

fn element_from_start(e: &quick_xml::events::BytesStart<'_>) -> Result<XmlNode> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| SqlMapperError::Config(format!("XML attribute error: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| SqlMapperError::Config(format!("XML attribute error: {e}")))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(XmlNode {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(stack: &mut Vec<XmlNode>, root: &mut Option<XmlNode>, node: XmlNode) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(XmlChild::Element(node));
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(SqlMapperError::Config(
                    "multiple root elements in XML document".into(),
                ));
            }
            *root = Some(node);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_text() {
        let doc = parse_document(
            r#"<mapper namespace="m"><select id="a">SELECT 1 <if test="x"> AND 2</if></select></mapper>"#,
        )
        .unwrap();
        assert_eq!(doc.name, "mapper");
        assert_eq!(doc.attr("namespace"), Some("m"));
        let select = doc.first_element("select").unwrap();
        assert_eq!(select.attr("id"), Some("a"));
        assert_eq!(select.children.len(), 2);
        let if_node = select.first_element("if").unwrap();
        assert_eq!(if_node.attr("test"), Some("x"));
        assert_eq!(if_node.text_body(), " AND 2");
    }

    #[test]
    fn empty_elements_and_entities() {
        let doc = parse_document(r#"<a><b x="1 &lt; 2"/>t &amp; u</a>"#).unwrap();
        let b = doc.first_element("b").unwrap();
        assert_eq!(b.attr("x"), Some("1 < 2"));
        assert_eq!(doc.text_body(), "t & u");
    }

    #[test]
    fn doctype_is_skipped() {
        let doc = parse_document(
            "<?xml version=\"1.0\"?>\n<!DOCTYPE mapper PUBLIC \"-//x//DTD//EN\" \"http://x/dtd\">\n<mapper/>",
        )
        .unwrap();
        assert_eq!(doc.name, "mapper");
    }

    #[test]
    fn unbalanced_document_fails() {
        assert!(parse_document("<a><b></a>").is_err());
    }
}

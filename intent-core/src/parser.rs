use std::fs;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;
use thiserror::Error;

use crate::tree::ConfigNode;

/// Malformed configuration input.
///
/// Covers both document-level problems (bad XML) and intent-level problems
/// (unknown elements, invalid values, duplicate identifiers). A parse error
/// never carries a partial result.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Input could not be tokenized as XML.
    #[error("failed to parse XML: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Tag, attribute, or text bytes were not valid UTF-8.
    #[error("invalid UTF-8 in configuration: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    /// Text or attribute entity could not be decoded.
    #[error("failed to decode XML text: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),
    /// Failed to read input file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    /// Structural issue in the document.
    #[error("malformed configuration: {0}")]
    Malformed(String),
    /// Payload was empty or whitespace only.
    #[error("configuration payload is empty")]
    Empty,
    /// Document root is not an intent or config element.
    #[error("unsupported root element <{0}>")]
    UnsupportedRoot(String),
    /// An element appeared where it is not allowed.
    #[error("unexpected element <{found}> under <{parent}>")]
    UnexpectedElement { parent: String, found: String },
    /// A required field was absent.
    #[error("{object} is missing required field '{field}'")]
    MissingField { object: String, field: String },
    /// A field value could not be interpreted.
    #[error("{object}: invalid {field} '{value}': {reason}")]
    InvalidValue {
        object: String,
        field: String,
        value: String,
        reason: String,
    },
    /// Two objects of the same kind share an identifier.
    #[error("duplicate {kind} identifier '{name}'")]
    Duplicate { kind: String, name: String },
}

/// Parse configuration bytes into a [`ConfigNode`] tree.
pub fn parse(xml: &[u8]) -> Result<ConfigNode, ParseError> {
    if xml.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::Empty);
    }

    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut stack: Vec<ConfigNode> = Vec::new();
    let mut root: Option<ConfigNode> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let node = open_node(&e, &reader)?;
                stack.push(node);
            }
            Event::Empty(e) => {
                let node = open_node(&e, &reader)?;
                attach(node, &mut stack, &mut root)?;
            }
            Event::Text(e) => {
                if let Some(current) = stack.last_mut() {
                    let text = e.unescape()?.into_owned();
                    append_text(current, text);
                }
            }
            Event::CData(e) => {
                if let Some(current) = stack.last_mut() {
                    let text = std::str::from_utf8(e.as_ref())?.to_string();
                    append_text(current, text);
                }
            }
            Event::End(e) => {
                let node = stack.pop().ok_or_else(|| {
                    ParseError::Malformed("encountered closing tag without open tag".to_string())
                })?;
                let closing = qname_to_string(e.name())?;
                if closing != node.tag {
                    return Err(ParseError::Malformed(format!(
                        "closing tag </{closing}> does not match <{}>",
                        node.tag
                    )));
                }
                attach(node, &mut stack, &mut root)?;
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) | Event::Comment(_) => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(ParseError::Malformed(
            "unclosed element(s) at end of document".to_string(),
        ));
    }

    root.ok_or_else(|| ParseError::Malformed("no root element found".to_string()))
}

/// Parse a configuration file into a [`ConfigNode`] tree.
pub fn parse_file(path: &Path) -> Result<ConfigNode, ParseError> {
    let bytes = fs::read(path)?;
    parse(&bytes)
}

fn attach(
    node: ConfigNode,
    stack: &mut [ConfigNode],
    root: &mut Option<ConfigNode>,
) -> Result<(), ParseError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    if root.is_some() {
        return Err(ParseError::Malformed(
            "multiple top-level elements found".to_string(),
        ));
    }
    *root = Some(node);
    Ok(())
}

fn append_text(node: &mut ConfigNode, text: String) {
    if text.trim().is_empty() {
        return;
    }
    match &mut node.text {
        Some(existing) => existing.push_str(&text),
        None => node.text = Some(text),
    }
}

fn open_node(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<ConfigNode, ParseError> {
    let tag = qname_to_string(e.name())?;
    let mut node = ConfigNode::new(tag);

    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = qname_to_string(attr.key)?;
        let value = attr
            .decode_and_unescape_value(reader.decoder())?
            .into_owned();
        node.attributes.insert(key, value);
    }

    Ok(node)
}

fn qname_to_string(name: QName<'_>) -> Result<String, ParseError> {
    Ok(std::str::from_utf8(name.as_ref())?.to_string())
}

#[cfg(test)]
mod tests {
    use super::{parse, ParseError};

    #[test]
    fn whitespace_only_payload_is_empty() {
        assert!(matches!(parse(b"  \n\t"), Err(ParseError::Empty)));
    }

    #[test]
    fn mismatched_closing_tag_is_malformed() {
        let err = parse(b"<intent><rule></address></intent>").expect_err("should fail");
        assert!(matches!(err, ParseError::Malformed(_) | ParseError::Xml(_)));
    }

    #[test]
    fn text_fragments_are_concatenated() {
        let node = parse(b"<setting name=\"motd\">hello <![CDATA[world]]></setting>").expect("parse");
        assert_eq!(node.text.as_deref(), Some("hello world"));
        assert_eq!(node.attr("name"), Some("motd"));
    }
}

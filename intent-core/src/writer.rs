use std::fs;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;

use crate::tree::ConfigNode;

/// Errors that can occur while rendering a [`ConfigNode`] tree.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Failed to serialize XML bytes.
    #[error("failed to write configuration XML: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Failed to write output file.
    #[error("failed to write configuration file: {0}")]
    Io(#[from] std::io::Error),
}

/// Render a [`ConfigNode`] tree as indented XML with a declaration.
pub fn write(node: &ConfigNode) -> Result<Vec<u8>, WriteError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(quick_xml::Error::from)?;
    write_node(&mut writer, node)?;
    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

/// Render a [`ConfigNode`] tree and write it to `path`.
pub fn write_file(node: &ConfigNode, path: &Path) -> Result<(), WriteError> {
    let bytes = write(node)?;
    fs::write(path, bytes)?;
    Ok(())
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &ConfigNode) -> Result<(), WriteError> {
    let mut start = BytesStart::new(node.tag.as_str());

    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if node.children.is_empty() && node.text.is_none() {
        writer
            .write_event(Event::Empty(start))
            .map_err(quick_xml::Error::from)?;
        return Ok(());
    }

    writer
        .write_event(Event::Start(start))
        .map_err(quick_xml::Error::from)?;

    if let Some(text) = &node.text {
        writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(quick_xml::Error::from)?;
    }

    for child in &node.children {
        write_node(writer, child)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(node.tag.as_str())))
        .map_err(quick_xml::Error::from)?;
    Ok(())
}

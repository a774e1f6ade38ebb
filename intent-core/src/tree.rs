use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

/// One element of a device or intent configuration document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigNode {
    /// Element tag name.
    pub tag: String,
    /// Attributes keyed by name.
    pub attributes: BTreeMap<String, String>,
    /// Child elements in document order.
    pub children: Vec<ConfigNode>,
    /// Text content, if any non-blank text was present.
    pub text: Option<String>,
}

impl ConfigNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// Leaf element holding `text`.
    pub fn leaf(tag: impl Into<String>, text: impl Into<String>) -> Self {
        let mut node = Self::new(tag);
        node.text = Some(text.into());
        node
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn push(&mut self, child: ConfigNode) {
        self.children.push(child);
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Return the first child with the provided tag.
    pub fn get_child(&self, tag: &str) -> Option<&ConfigNode> {
        self.children.iter().find(|child| child.tag == tag)
    }

    /// Return all children with the provided tag.
    pub fn get_children(&self, tag: &str) -> Vec<&ConfigNode> {
        self.children
            .iter()
            .filter(|child| child.tag == tag)
            .collect()
    }

    /// Walk a nested child path and return terminal node text if found.
    pub fn get_text<'a>(&'a self, path: &[&str]) -> Option<&'a str> {
        if path.is_empty() {
            return self.text.as_deref();
        }

        let mut current = self;
        for segment in path {
            current = current.get_child(segment)?;
        }
        current.text.as_deref()
    }

    /// Trimmed text of this node, `None` when absent or blank.
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

impl Display for ConfigNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        for (key, value) in &self.attributes {
            write!(f, " {}=\"{}\"", key, value)?;
        }

        if self.children.is_empty() && self.text.is_none() {
            return write!(f, "/>");
        }

        write!(f, ">")?;
        if let Some(text) = &self.text {
            write!(f, "{}", text)?;
        }
        for child in &self.children {
            write!(f, "{}", child)?;
        }
        write!(f, "</{}>", self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::ConfigNode;

    #[test]
    fn get_text_walks_nested_path() {
        let mut root = ConfigNode::new("intent");
        let mut rule = ConfigNode::new("rule");
        rule.push(ConfigNode::leaf("action", "allow"));
        root.push(rule);

        assert_eq!(root.get_text(&["rule", "action"]), Some("allow"));
        assert_eq!(root.get_text(&["rule", "log"]), None);
    }

    #[test]
    fn trimmed_text_drops_blank_content() {
        let node = ConfigNode::leaf("description", "   ");
        assert_eq!(node.trimmed_text(), None);
        let node = ConfigNode::leaf("description", " edge ");
        assert_eq!(node.trimmed_text(), Some("edge"));
    }

    #[test]
    fn display_renders_empty_flag_elements() {
        let node = ConfigNode::new("log").with_attr("k", "v");
        assert_eq!(node.to_string(), "<log k=\"v\"/>");
    }
}

//! Owned XML tree for MPD documents.
//!
//! The tree keeps element order and attributes so that it can be written back
//! out as line-addressable text after segments have been attached.

use std::fmt::Display;

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};

use crate::error::{VidlensError, VidlensResult};

fn xml_error(e: impl Display) -> VidlensError {
    VidlensError::MpdParsing(e.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    fn from_start(start: &BytesStart) -> VidlensResult<Self> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(xml_error)?.into_owned();
            attributes.push((key, value));
        }

        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            children: Vec::new(),
        })
    }

    /// Name without namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// Child elements named `local_name`, with their index in `children`.
    pub fn children_named<'a, 'b>(
        &'a self,
        local_name: &'b str,
    ) -> impl Iterator<Item = (usize, &'a XmlElement)> + 'b
    where
        'a: 'b,
    {
        self.children
            .iter()
            .enumerate()
            .filter_map(move |(index, node)| match node {
                XmlNode::Element(element) if element.local_name() == local_name => {
                    Some((index, element))
                }
                _ => None,
            })
    }

    pub fn child(&self, local_name: &str) -> Option<&XmlElement> {
        self.children.iter().find_map(|node| match node {
            XmlNode::Element(element) if element.local_name() == local_name => Some(element),
            _ => None,
        })
    }

    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Follow child indices down from this element.
    pub fn descendant_mut(&mut self, path: &[usize]) -> Option<&mut XmlElement> {
        let mut current = self;
        for index in path {
            current = match current.children.get_mut(*index)? {
                XmlNode::Element(element) => element,
                XmlNode::Text(_) => return None,
            };
        }
        Some(current)
    }

    fn write<W: std::io::Write>(&self, writer: &mut Writer<W>) -> VidlensResult<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            writer.write_event(Event::Empty(start)).map_err(xml_error)?;
            return Ok(());
        }

        writer.write_event(Event::Start(start)).map_err(xml_error)?;
        for child in &self.children {
            match child {
                XmlNode::Element(element) => element.write(writer)?,
                XmlNode::Text(text) => writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .map_err(xml_error)?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(xml_error)?;
        Ok(())
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Parse a document into its root element.
pub fn parse_xml(text: &str) -> VidlensResult<XmlElement> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(ref e) => stack.push(XmlElement::from_start(e)?),
            Event::Empty(ref e) => {
                let element = XmlElement::from_start(e)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| xml_error("unexpected closing tag"))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(ref e) => {
                let text = e.unescape().map_err(xml_error)?;
                if let Some(parent) = stack.last_mut() {
                    if !text.trim().is_empty() {
                        parent.children.push(XmlNode::Text(text.into_owned()));
                    }
                }
            }
            Event::CData(ref e) => {
                if let Some(parent) = stack.last_mut() {
                    parent
                        .children
                        .push(XmlNode::Text(String::from_utf8_lossy(e).into_owned()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(xml_error("unclosed element at end of document"));
    }
    root.ok_or_else(|| xml_error("document has no root element"))
}

/// Serialize with two-space indentation, one element per line.
pub fn to_xml_string(root: &XmlElement) -> VidlensResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_error)?;
    root.write(&mut writer)?;
    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

//! Element stream source.
//!
//! [`WikiReader`] turns a (possibly bzip2-compressed) dump into a sequence of
//! closed [`Element`]s in document order: `<b>` is yielded before the `<a>`
//! that encloses it. Only leaf elements keep their text, and nothing is
//! retained once an element has been yielded, so memory stays bounded by the
//! largest single leaf (usually one revision text).

use crate::config::READER_BUFFER_SIZE;
use crate::error::SonetError;
use anyhow::{bail, Context, Result};
use bzip2::read::MultiBzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A closed element: qualified tag name, leaf text and attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub text: Option<String>,
    pub attributes: Vec<(String, String)>,
}

impl Element {
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

struct OpenElement {
    name: String,
    text: String,
    has_children: bool,
    attributes: Vec<(String, String)>,
}

impl OpenElement {
    fn close(self) -> Element {
        let text = if self.has_children || self.text.is_empty() {
            None
        } else {
            Some(self.text)
        };
        Element {
            name: self.name,
            text,
            attributes: self.attributes,
        }
    }
}

fn open_element(
    start: &BytesStart<'_>,
    root: &mut Option<String>,
    stack: &mut [OpenElement],
) -> Result<OpenElement> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.with_context(|| format!("Bad attribute on <{}>", name))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .with_context(|| format!("Bad attribute value on <{}>", name))?
            .into_owned();
        attributes.push((key, value));
    }
    if root.is_none() {
        *root = Some(name.clone());
    }
    if let Some(parent) = stack.last_mut() {
        // Text between children is layout whitespace; drop it.
        parent.has_children = true;
        parent.text.clear();
    }
    Ok(OpenElement {
        name,
        text: String::new(),
        has_children: false,
        attributes,
    })
}

pub struct WikiReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    stack: Vec<OpenElement>,
    root: Option<String>,
    closed: u64,
    finished: bool,
}

impl WikiReader<Box<dyn BufRead + Send>> {
    /// Opens a dump file, decompressing `.bz2` input on the fly.
    pub fn open(path: &str) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Failed to open wiki dump at: {}", path))?;
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let inner: Box<dyn BufRead + Send> = match ext {
            "bz2" => Box::new(BufReader::with_capacity(
                READER_BUFFER_SIZE,
                MultiBzDecoder::new(file),
            )),
            "gz" | "7z" => bail!("Unsupported compression for {}: {}", path, ext),
            _ => Box::new(BufReader::with_capacity(READER_BUFFER_SIZE, file)),
        };
        Ok(Self::from_reader(inner))
    }
}

impl<R: BufRead> WikiReader<R> {
    pub fn from_reader(inner: R) -> Self {
        Self {
            reader: Reader::from_reader(inner),
            buf: Vec::with_capacity(8192),
            stack: Vec::with_capacity(16),
            root: None,
            closed: 0,
            finished: false,
        }
    }

    /// Qualified name of the document root, once it has been read.
    pub fn root_name(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Number of elements closed so far.
    pub fn position(&self) -> u64 {
        self.closed
    }

    fn next_element(&mut self) -> Result<Option<Element>> {
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|e| SonetError::Malformed {
                    index: self.closed,
                    reason: e.to_string(),
                })?;

            match event {
                Event::Start(start) => {
                    let open = open_element(&start, &mut self.root, &mut self.stack)?;
                    self.stack.push(open);
                }
                Event::Empty(start) => {
                    let open = open_element(&start, &mut self.root, &mut self.stack)?;
                    self.closed += 1;
                    return Ok(Some(open.close()));
                }
                Event::Text(text) => {
                    if let Some(current) = self.stack.last_mut() {
                        if !current.has_children {
                            let text = text.unescape().map_err(|e| SonetError::Malformed {
                                index: self.closed,
                                reason: e.to_string(),
                            })?;
                            current.text.push_str(&text);
                        }
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = self.stack.last_mut() {
                        if !current.has_children {
                            current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                        }
                    }
                }
                Event::End(_) => {
                    let open = self.stack.pop().ok_or_else(|| SonetError::Malformed {
                        index: self.closed,
                        reason: "closing tag without matching opening tag".to_string(),
                    })?;
                    self.closed += 1;
                    return Ok(Some(open.close()));
                }
                Event::Eof => {
                    if let Some(open) = self.stack.last() {
                        return Err(SonetError::Malformed {
                            index: self.closed,
                            reason: format!("unexpected end of input inside <{}>", open.name),
                        }
                        .into());
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for WikiReader<R> {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_element() {
            Ok(Some(elem)) => Some(Ok(elem)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

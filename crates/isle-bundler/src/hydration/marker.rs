//! Mount marker scanning.
//!
//! A marker is any element carrying an `isle-mount` attribute whose value is
//! the serialized triple `[name, props, hydrateOptions]`. Scanning is a
//! single forward pass with `memchr`; every search starts where the previous
//! marker ended.

use std::borrow::Cow;

use memchr::{memchr, memmem, memrchr};
use serde_json::{Map, Value};

/// Attribute carrying the serialized mount triple.
pub const MOUNT_ATTRIBUTE: &str = "isle-mount";

/// A marker element found in a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountMarker<'a> {
    /// Byte range of the whole element, closing tag included.
    pub start: usize,
    pub end: usize,
    pub tag: &'a str,
    /// Decoded attributes in source order.
    pub attributes: Vec<(&'a str, String)>,
}

impl MountMarker<'_> {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The parsed mount triple.
#[derive(Debug, Clone, PartialEq)]
pub struct MountPayload {
    pub name: String,
    /// `Value::Null` when absent.
    pub props: Value,
    pub hydrate_options: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarkerError {
    #[error("unterminated marker element at byte {0}")]
    Unterminated(usize),
    #[error("invalid mount payload: {0}")]
    Payload(String),
}

/// Iterator over the markers of a page, in document order.
#[derive(Debug)]
pub struct MarkerScanner<'a> {
    html: &'a str,
    cursor: usize,
    finder: memmem::Finder<'static>,
}

impl<'a> MarkerScanner<'a> {
    pub fn new(html: &'a str) -> Self {
        Self {
            html,
            cursor: 0,
            finder: memmem::Finder::new(MOUNT_ATTRIBUTE.as_bytes()),
        }
    }
}

impl<'a> Iterator for MarkerScanner<'a> {
    type Item = Result<MountMarker<'a>, MarkerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.html.as_bytes();
        loop {
            let found = self.cursor + self.finder.find(&bytes[self.cursor..])?;
            let search_from = self.cursor;
            self.cursor = found + MOUNT_ATTRIBUTE.len();

            // the attribute name must sit inside an opening tag
            let Some(open) = memrchr(b'<', &bytes[search_from..found]).map(|i| search_from + i) else {
                continue;
            };
            if memchr(b'>', &bytes[open..found]).is_some() || bytes.get(open + 1) == Some(&b'/') {
                continue;
            }

            return Some(match parse_element(self.html, open) {
                Ok(marker) => {
                    self.cursor = marker.end;
                    Ok(marker)
                }
                Err(err) => Err(err),
            });
        }
    }
}

fn parse_element(html: &str, open: usize) -> Result<MountMarker<'_>, MarkerError> {
    let bytes = html.as_bytes();
    let name_start = open + 1;
    let name_end = bytes[name_start..]
        .iter()
        .position(|b| b.is_ascii_whitespace() || *b == b'>' || *b == b'/')
        .map(|i| name_start + i)
        .ok_or(MarkerError::Unterminated(open))?;
    let tag = &html[name_start..name_end];

    let (attributes, tag_end, self_closing) = parse_attributes(html, name_end)?;
    let end = if self_closing || is_void(tag) {
        tag_end + 1
    } else {
        closing_tag_end(html, tag, tag_end + 1).ok_or(MarkerError::Unterminated(open))?
    };

    Ok(MountMarker {
        start: open,
        end,
        tag,
        attributes,
    })
}

type Attributes<'a> = Vec<(&'a str, String)>;

/// Attributes up to the `>` of the opening tag. Returns them with the
/// position of that `>` and whether the tag self-closes.
fn parse_attributes(html: &str, mut pos: usize) -> Result<(Attributes<'_>, usize, bool), MarkerError> {
    let bytes = html.as_bytes();
    let start = pos;
    let mut attributes = Vec::new();
    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        match bytes.get(pos) {
            None => return Err(MarkerError::Unterminated(start)),
            Some(b'>') => return Ok((attributes, pos, false)),
            Some(b'/') if bytes.get(pos + 1) == Some(&b'>') => {
                return Ok((attributes, pos + 1, true));
            }
            _ => {}
        }

        let name_start = pos;
        while pos < bytes.len() && !matches!(bytes[pos], b'=' | b'>' | b'/') && !bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let name = &html[name_start..pos];
        if name.is_empty() {
            // stray `/`
            pos += 1;
            continue;
        }
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if bytes.get(pos) != Some(&b'=') {
            attributes.push((name, String::new()));
            continue;
        }
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }

        let raw = match bytes.get(pos) {
            Some(&quote @ (b'"' | b'\'')) => {
                let value_start = pos + 1;
                let close = memchr(quote, &bytes[value_start..]).ok_or(MarkerError::Unterminated(start))?;
                pos = value_start + close + 1;
                &html[value_start..value_start + close]
            }
            Some(_) => {
                let value_start = pos;
                while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() && bytes[pos] != b'>' {
                    pos += 1;
                }
                &html[value_start..pos]
            }
            None => return Err(MarkerError::Unterminated(start)),
        };
        attributes.push((name, decode_entities(raw).into_owned()));
    }
}

/// End of the `</tag>` matching an element whose content starts at `from`,
/// counting nested elements of the same name.
fn closing_tag_end(html: &str, tag: &str, from: usize) -> Option<usize> {
    let bytes = html.as_bytes();
    let mut depth = 1usize;
    let mut pos = from;
    while let Some(offset) = memchr(b'<', &bytes[pos..]) {
        let lt = pos + offset;
        let closing = bytes.get(lt + 1) == Some(&b'/');
        let name_start = if closing { lt + 2 } else { lt + 1 };
        let matches_tag = html
            .get(name_start..name_start + tag.len())
            .is_some_and(|name| name.eq_ignore_ascii_case(tag))
            && bytes
                .get(name_start + tag.len())
                .is_some_and(|b| b.is_ascii_whitespace() || *b == b'>' || *b == b'/');
        pos = lt + 1;
        if !matches_tag {
            continue;
        }
        let gt = memchr(b'>', &bytes[name_start..])? + name_start;
        if closing {
            depth -= 1;
            if depth == 0 {
                return Some(gt + 1);
            }
        } else if bytes[gt - 1] != b'/' {
            depth += 1;
        }
        pos = gt + 1;
    }
    None
}

fn is_void(tag: &str) -> bool {
    matches!(
        tag.to_ascii_lowercase().as_str(),
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta"
            | "source" | "track" | "wbr"
    )
}

/// Decode the entities marker payloads are escaped with.
pub fn decode_entities(raw: &str) -> Cow<'_, str> {
    if memchr(b'&', raw.as_bytes()).is_none() {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = [
            ("&quot;", '"'),
            ("&#34;", '"'),
            ("&#39;", '\''),
            ("&apos;", '\''),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&amp;", '&'),
        ]
        .iter()
        .find(|(entity, _)| tail.starts_with(entity));
        match decoded {
            Some((entity, ch)) => {
                out.push(*ch);
                rest = &tail[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Parse the `[name, props, hydrateOptions]` triple.
pub fn parse_payload(raw: &str) -> Result<MountPayload, MarkerError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| MarkerError::Payload(err.to_string()))?;
    let Value::Array(items) = value else {
        return Err(MarkerError::Payload("expected an array".to_string()));
    };
    let mut items = items.into_iter();
    let name = match items.next() {
        Some(Value::String(name)) if !name.is_empty() => name,
        _ => return Err(MarkerError::Payload("missing component name".to_string())),
    };
    let props = items.next().unwrap_or(Value::Null);
    let hydrate_options = match items.next() {
        Some(Value::Object(options)) => options,
        None | Some(Value::Null) => Map::new(),
        Some(other) => {
            return Err(MarkerError::Payload(format!(
                "hydrate options must be an object, got {other}"
            )));
        }
    };
    Ok(MountPayload {
        name,
        props,
        hydrate_options,
    })
}

//! XML decoding front end shared by the description and SCPD parsers.
//!
//! UPnP documents arrive with namespace prefixes that vary by vendor. The
//! prefixes carry no information we need, so they are stripped before the
//! serde pass; struct definitions then match on bare local names.

use serde::de::DeserializeOwned;

use crate::error::{ParseError, ParseResult};

/// Parse an XML document into a deserializable type, ignoring namespaces.
pub fn parse<T: DeserializeOwned>(xml: &str) -> ParseResult<T> {
    let stripped = strip_namespaces(xml);
    quick_xml::de::from_str(&stripped)
        .map_err(|e| ParseError::XmlDeserializationFailed(e.to_string()))
}

/// Remove namespace prefixes from tags and attributes, and drop xmlns
/// declarations entirely.
pub fn strip_namespaces(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;

    while let Some(start) = rest.find('<') {
        let (text, tail) = rest.split_at(start);
        out.push_str(text);

        let end = match tail.find('>') {
            Some(i) => i,
            None => {
                out.push_str(tail);
                return out;
            }
        };
        let tag = &tail[..=end];
        rest = &tail[end + 1..];

        if tag.starts_with("<?") || tag.starts_with("<!") {
            out.push_str(tag);
            continue;
        }

        out.push_str(&strip_tag(tag));
    }
    out.push_str(rest);
    out
}

fn strip_tag(tag: &str) -> String {
    let inner = tag.trim_start_matches('<').trim_end_matches('>');
    let (slash, inner) = match inner.strip_prefix('/') {
        Some(rest) => ("/", rest),
        None => ("", inner),
    };
    let (inner, self_close) = match inner.strip_suffix('/') {
        Some(rest) => (rest, "/"),
        None => (inner, ""),
    };

    let mut parts = split_tag_parts(inner);
    if parts.is_empty() {
        return tag.to_string();
    }

    let name = strip_prefix(&parts.remove(0));
    let mut rebuilt = format!("<{}{}", slash, name);

    for part in parts {
        if part.starts_with("xmlns") {
            continue;
        }
        rebuilt.push(' ');
        match part.split_once('=') {
            Some((attr, value)) => {
                rebuilt.push_str(&strip_prefix(attr));
                rebuilt.push('=');
                rebuilt.push_str(value);
            }
            None => rebuilt.push_str(&part),
        }
    }

    rebuilt.push_str(self_close);
    rebuilt.push('>');
    rebuilt
}

/// Split a tag body into the tag name and attribute chunks, keeping quoted
/// values (which may contain spaces) intact.
fn split_tag_parts(inner: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in inner.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => {
                    current.push(c);
                    quote = Some(c);
                }
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        parts.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(c),
            },
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn strip_prefix(name: &str) -> String {
    match name.split_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.to_string(),
    }
}

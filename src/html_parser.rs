use encoding_rs::{Encoding, UTF_8};
use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{parse_document, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use regex::bytes::Regex;
use std::sync::OnceLock;

use crate::error::{MirrorError, Result};

/// A parsed HTML page whose attributes can be edited in place.
pub struct HtmlDocument {
    dom: RcDom,
}

/// An element node of an [`HtmlDocument`].
#[derive(Clone)]
pub struct Element {
    handle: Handle,
}

impl HtmlDocument {
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html);
        Self { dom }
    }

    /// Decode a fetched page body and parse it.
    ///
    /// The charset comes from the `Content-Type` header, then from a
    /// `<meta>` declaration, then defaults to UTF-8. Pages are always
    /// serialized back as UTF-8, so any meta charset is rewritten to match.
    pub fn from_response(body: &[u8], content_type: Option<&str>) -> Self {
        let (text, encoding) = decode_body(body, content_type);
        let doc = Self::parse(&text);
        if encoding != UTF_8 {
            doc.declare_utf8();
        }
        doc
    }

    fn declare_utf8(&self) {
        for meta in self.find("meta") {
            if meta.attr("charset").is_some() {
                meta.set_attr("charset", "utf-8");
            } else if meta
                .attr("http-equiv")
                .is_some_and(|v| v.eq_ignore_ascii_case("content-type"))
            {
                meta.set_attr("content", "text/html; charset=utf-8");
            }
        }
    }

    /// Every element named `tag`, in document order.
    pub fn find(&self, tag: &str) -> Vec<Element> {
        let mut found = Vec::new();
        let mut stack = vec![self.dom.document.clone()];
        while let Some(node) = stack.pop() {
            if let NodeData::Element { ref name, .. } = node.data {
                if name.local.as_ref().eq_ignore_ascii_case(tag) {
                    found.push(Element {
                        handle: node.clone(),
                    });
                }
            }
            let children = node.children.borrow();
            stack.extend(children.iter().rev().cloned());
        }
        found
    }

    pub fn to_html(&self) -> Result<String> {
        let mut out = Vec::new();
        let document: SerializableHandle = self.dom.document.clone().into();
        serialize(&mut out, &document, SerializeOpts::default())
            .map_err(|e| MirrorError::Parse(e.to_string()))?;
        String::from_utf8(out).map_err(|e| MirrorError::Parse(e.to_string()))
    }
}

/// Decode `body` to text. A byte order mark wins over any declared charset.
fn decode_body(body: &[u8], content_type: Option<&str>) -> (String, &'static Encoding) {
    let declared = content_type
        .and_then(charset_from_content_type)
        .or_else(|| charset_from_meta(body))
        .unwrap_or(UTF_8);
    let (text, used, _) = declared.decode(body);
    (text.into_owned(), used)
}

fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    let mime: mime::Mime = content_type.parse().ok()?;
    let charset = mime.get_param(mime::CHARSET)?;
    Encoding::for_label(charset.as_str().as_bytes())
}

fn meta_charset() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i-u)<meta[^>]*charset\s*=\s*["']?\s*([a-z0-9_:.-]+)"#)
            .expect("static regex")
    })
}

/// Look for a charset declaration in the first kilobyte of the page.
/// A meta tag that claims UTF-16 was necessarily read as ASCII, so it means UTF-8.
fn charset_from_meta(body: &[u8]) -> Option<&'static Encoding> {
    let head = &body[..body.len().min(1024)];
    let caps = meta_charset().captures(head)?;
    Encoding::for_label(caps.get(1)?.as_bytes()).map(Encoding::output_encoding)
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<String> {
        let NodeData::Element { ref attrs, .. } = self.handle.data else {
            return None;
        };
        let attrs = attrs.borrow();
        attrs
            .iter()
            .find(|a| a.name.local.as_ref().eq_ignore_ascii_case(name))
            .map(|a| a.value.to_string())
    }

    /// Replace the value of an existing attribute. Returns `false` when the
    /// element has no such attribute.
    pub fn set_attr(&self, name: &str, value: &str) -> bool {
        let NodeData::Element { ref attrs, .. } = self.handle.data else {
            return false;
        };
        let mut attrs = attrs.borrow_mut();
        match attrs
            .iter_mut()
            .find(|a| a.name.local.as_ref().eq_ignore_ascii_case(name))
        {
            Some(attr) => {
                attr.value = StrTendril::from_slice(value);
                true
            }
            None => false,
        }
    }

    /// Whether a whitespace-separated token attribute (like `rel`) contains `token`.
    pub fn has_token(&self, attr: &str, token: &str) -> bool {
        self.attr(attr).is_some_and(|value| {
            value
                .split_ascii_whitespace()
                .any(|t| t.eq_ignore_ascii_case(token))
        })
    }
}

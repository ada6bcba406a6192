//! Just enough OAI-PMH response inspection to drive pagination.
//!
//! Responses are stored verbatim; only the resumption token and the error
//! element are ever looked at, so there is no full XML decoding here.

/// An `<error code="...">` element from an OAI-PMH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OaiError {
    pub code: String,
    pub message: String,
}

impl OaiError {
    /// The provider has no records for the request. Not a failure.
    pub fn is_no_records_match(&self) -> bool {
        self.code == "noRecordsMatch"
    }
}

/// Removes characters that are not allowed in an XML 1.0 document.
///
/// # Examples
///
/// ```
/// use snapshot_client::xml::clean_xml;
///
/// assert_eq!(clean_xml("a\u{0}b\u{1b}c\n"), "abc\n");
/// ```
pub fn clean_xml(body: &str) -> String {
    body.chars().filter(|c| is_xml_char(*c)).collect()
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Returns the resumption token, or `None` when the list is complete.
///
/// The token follows the last record, so record payloads are never searched.
pub fn resumption_token(body: &str) -> Option<String> {
    let (_, content) = element(after_records(body), "resumptionToken")?;
    let token = unescape(content?.trim());
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Returns the OAI-PMH error element, if any.
///
/// Errors replace the verb element, so only the envelope ahead of it is
/// searched.
pub fn oai_error(body: &str) -> Option<OaiError> {
    let (attrs, content) = element(before_payload(body), "error")?;
    let code = attribute(attrs, "code").unwrap_or_default();
    let message = content.map(|m| unescape(m.trim())).unwrap_or_default();
    Some(OaiError { code, message })
}

/// Verb elements whose content may carry arbitrary provider XML.
const PAYLOAD_ELEMENTS: [&str; 3] = ["<ListRecords", "<Identify", "<record"];

fn before_payload(body: &str) -> &str {
    let end = PAYLOAD_ELEMENTS
        .iter()
        .filter_map(|tag| body.find(tag))
        .min()
        .unwrap_or(body.len());
    &body[..end]
}

fn after_records(body: &str) -> &str {
    body.rfind("</record>").map_or(body, |pos| &body[pos..])
}

/// Finds `<name ...>content</name>` or `<name .../>`.
///
/// Returns the raw attribute text and the content (`None` if self-closing).
fn element<'a>(body: &'a str, name: &str) -> Option<(&'a str, Option<&'a str>)> {
    let open = format!("<{}", name);
    let mut search_from = 0;

    loop {
        let start = search_from + body[search_from..].find(&open)?;
        let after_name = start + open.len();
        let rest = &body[after_name..];

        // `<error` must not match `<errors`
        if !rest.starts_with(|c: char| c == '>' || c == '/' || c.is_whitespace()) {
            search_from = after_name;
            continue;
        }

        let tag_end = rest.find('>')?;
        let tag = &rest[..tag_end];
        if let Some(attrs) = tag.strip_suffix('/') {
            return Some((attrs, None));
        }

        let content_start = after_name + tag_end + 1;
        let close = format!("</{}>", name);
        let content_len = body[content_start..].find(&close)?;
        return Some((tag, Some(&body[content_start..content_start + content_len])));
    }
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    for quote in ['"', '\''] {
        let needle = format!("{}={}", name, quote);
        if let Some(pos) = attrs.find(&needle) {
            let value_start = pos + needle.len();
            let value_len = attrs[value_start..].find(quote)?;
            return Some(unescape(&attrs[value_start..value_start + value_len]));
        }
    }
    None
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

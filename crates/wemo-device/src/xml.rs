//! Minimal XML text extraction
//!
//! Device descriptions and SOAP replies are small, flat and well-formed, so
//! plain tag scanning is enough. Namespace prefixes on the wanted tag are
//! not supported; callers ask for unprefixed names.

/// Text of the first `<tag>...</tag>`, unescaped and trimmed
pub(crate) fn element_text(xml: &str, tag: &str) -> Option<String> {
    element_body(xml, tag).map(|body| unescape(body.trim()))
}

/// Raw bodies of every `<tag>...</tag>`, in document order
pub(crate) fn element_bodies<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let mut bodies = Vec::new();
    let mut rest = xml;
    while let Some((body, after)) = next_element(rest, tag) {
        bodies.push(body);
        rest = after;
    }
    bodies
}

/// Every `<name>text</name>` with no child elements, in document order
pub(crate) fn leaf_elements(xml: &str) -> Vec<(String, String)> {
    let mut leaves = Vec::new();
    let mut rest = xml;

    while let Some(open) = rest.find('<') {
        rest = &rest[open + 1..];
        let Some(close) = rest.find('>') else {
            break;
        };
        let tag = &rest[..close];
        rest = &rest[close + 1..];

        if tag.starts_with(['/', '?', '!']) || tag.ends_with('/') {
            continue;
        }
        let name = tag.split_whitespace().next().unwrap_or(tag);

        let end_tag = format!("</{}>", name);
        let Some(end) = rest.find(&end_tag) else {
            continue;
        };
        let body = &rest[..end];
        if !body.contains('<') {
            leaves.push((name.to_string(), unescape(body.trim())));
            rest = &rest[end + end_tag.len()..];
        }
    }

    leaves
}

fn element_body<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    next_element(xml, tag).map(|(body, _)| body)
}

/// Find the next `<tag>` or `<tag attr..>` and return (body, rest after close)
fn next_element<'a>(xml: &'a str, tag: &str) -> Option<(&'a str, &'a str)> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut search = xml;

    loop {
        let start = search.find(&open)?;
        let after_name = &search[start + open.len()..];
        // Reject longer names sharing the prefix (<service> vs <serviceList>)
        match after_name.chars().next() {
            Some('>') | Some(' ') | Some('\t') | Some('\n') | Some('\r') => {}
            _ => {
                search = after_name;
                continue;
            }
        }
        let body_start = after_name.find('>')? + 1;
        let body_and_rest = &after_name[body_start..];
        let end = body_and_rest.find(&close)?;
        return Some((&body_and_rest[..end], &body_and_rest[end + close.len()..]));
    }
}

/// Decode the five predefined entities
pub(crate) fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Encode text for an element body
pub(crate) fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

//! HTML entity decoding for feed text fields.
//!
//! Feeds routinely double-escape their text: the XML layer removes one level
//! and the producer's HTML escaping is still there (`Ben &amp; Jerry&#39;s`).
//! [`unescape`] removes that second level. It never fails: anything that does
//! not resolve to a known entity is kept as written.
use quick_xml::escape::resolve_html5_entity;
use std::borrow::Cow;

/// Longest entity name we try to resolve (the HTML5 table tops out at 32).
const MAX_ENTITY_LEN: usize = 32;

/// Decode named, decimal and hexadecimal character references.
pub fn unescape(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];

        let resolved = tail
            .find(';')
            .filter(|&end| end > 0 && end <= MAX_ENTITY_LEN)
            .and_then(|end| resolve(&tail[..end]).map(|decoded| (decoded, end)));

        match resolved {
            Some((decoded, end)) => {
                out.push_str(&decoded);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }

    out.push_str(rest);
    Cow::Owned(out)
}

fn resolve(entity: &str) -> Option<Cow<'static, str>> {
    if let Some(number) = entity.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse::<u32>().ok()?,
        };
        let ch = char::from_u32(code)
            .filter(|c| *c != '\0')
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        return Some(Cow::Owned(ch.to_string()));
    }
    resolve_html5_entity(entity).map(Cow::Borrowed)
}

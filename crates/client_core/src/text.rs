//! Plain-text extraction for rich descriptions.
//!
//! The service stores descriptions as plain text, so everything the editor
//! produces is stripped of markup, entity-decoded and passed through the
//! same normalization before it is measured or sent.

use unicode_normalization::UnicodeNormalization;

const MAX_ENTITY_LEN: usize = 10;

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "blockquote", "br", "caption", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "ol", "p",
    "pre", "section", "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

const SKIPPED_CONTENT_TAGS: &[&str] = &["script", "style"];

/// Extracts normalized plain text from editor markup. Repeats until the
/// output is stable so entity-encoded markup cannot survive a second call.
/// Every pass that changes the text consumes at least one entity or tag, so
/// the input length bounds the number of passes.
pub fn extract_plain_text(html: &str) -> String {
    let mut current = extract_once(html);
    for _ in 0..=html.len() {
        let next = extract_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn extract_once(input: &str) -> String {
    normalize_text(&decode_entities(&strip_tags(input)))
}

/// Whitespace folding, NFKC and the character whitelist, applied to text
/// that is already free of markup.
pub fn normalize_text(input: &str) -> String {
    let unified: String = input
        .chars()
        .map(|ch| if is_special_space(ch) { ' ' } else { ch })
        .collect();
    let folded = collapse_whitespace(&unified);
    let composed: String = folded.nfkc().collect();
    let filtered: String = composed.chars().filter(|ch| is_allowed(*ch)).collect();
    collapse_whitespace(&filtered)
}

/// Length as the service counts it.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_special_space(ch: char) -> bool {
    matches!(
        ch,
        '\r' | '\n'
            | '\t'
            | '\u{00A0}'
            | '\u{1680}'
            | '\u{180E}'
            | '\u{2000}'..='\u{200B}'
            | '\u{202F}'
            | '\u{205F}'
            | '\u{3000}'
            | '\u{FEFF}'
    )
}

fn is_allowed(ch: char) -> bool {
    matches!(
        ch,
        '\u{0600}'..='\u{06FF}'
            | '\u{0750}'..='\u{077F}'
            | '\u{08A0}'..='\u{08FF}'
            | '\u{FB50}'..='\u{FDFF}'
            | '\u{FE70}'..='\u{FEFF}'
            | '\u{0020}'..='\u{007E}'
            | '\u{00A0}'..='\u{00FF}'
            | '\u{0100}'..='\u{017F}'
            | '\u{0180}'..='\u{024F}'
            | '\u{1E00}'..='\u{1EFF}'
    )
}

fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];

        let Some(tag) = parse_tag(candidate) else {
            out.push('<');
            rest = &candidate[1..];
            continue;
        };

        if BLOCK_TAGS.contains(&tag.name.as_str()) {
            out.push(' ');
        }
        rest = &candidate[tag.len..];

        if !tag.closing && SKIPPED_CONTENT_TAGS.contains(&tag.name.as_str()) {
            let closing = format!("</{}", tag.name);
            match rest.to_ascii_lowercase().find(&closing) {
                Some(end) => {
                    let after = &rest[end..];
                    let close_len = after.find('>').map(|i| i + 1).unwrap_or(after.len());
                    rest = &after[close_len..];
                }
                None => rest = "",
            }
        }
    }

    out.push_str(rest);
    out
}

struct Tag {
    name: String,
    closing: bool,
    len: usize,
}

/// Recognizes `<name ...>`, `</name>`, `<!...>` and `<?...>` at the start of
/// `input`. A lone `<` in prose is not a tag.
fn parse_tag(input: &str) -> Option<Tag> {
    let body = input.strip_prefix('<')?;
    let first = body.chars().next()?;
    if !(first.is_ascii_alphabetic() || matches!(first, '/' | '!' | '?')) {
        return None;
    }
    let end = body.find('>')?;
    let inner = &body[..end];
    let closing = inner.starts_with('/');
    let name: String = inner
        .trim_start_matches('/')
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    if closing && name.is_empty() {
        return None;
    }
    Some(Tag {
        name,
        closing,
        len: end + 2,
    })
}

fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let decoded = candidate[1..]
            .char_indices()
            .take(MAX_ENTITY_LEN)
            .find(|(_, ch)| *ch == ';')
            .and_then(|(semi, _)| decode_entity(&candidate[1..semi + 1]).map(|ch| (ch, semi + 2)));

        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &candidate[consumed..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "nbsp" => Some('\u{00A0}'),
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let numeric = name.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
#[path = "tests/text_tests.rs"]
mod tests;

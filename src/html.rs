//! Plain-text helpers for the HTML found in feed summaries and deal pages.
//!
//! Naive string scanning, no DOM. Tag and attribute names match
//! case-insensitively on ASCII.

/// Inner HTML of the first `<tag>` element whose class attribute holds every
/// class listed in `classes`, up to its matching close tag.
///
/// Nested elements of the same tag are counted, so
/// `<div class="a"><div>x</div> y</div>` yields `<div>x</div> y`. An element
/// that is never closed runs to the end of the input.
pub fn element_by_class<'a>(html: &'a str, tag: &str, classes: &str) -> Option<&'a str> {
    // ASCII lowercasing keeps byte offsets identical
    let lc = html.to_ascii_lowercase();
    let open_pat = format!("<{}", tag.to_ascii_lowercase());
    let close_pat = format!("</{}", tag.to_ascii_lowercase());
    let wanted: Vec<String> = classes.split_whitespace().map(|c| c.to_ascii_lowercase()).collect();

    let mut from = 0;
    while let Some(start) = find_tag(&lc, &open_pat, from) {
        let open_end = start + lc[start..].find('>')? + 1;
        from = open_end;

        let matches = class_attr(&lc[start..open_end]).is_some_and(|value| {
            let have: Vec<&str> = value.split_whitespace().collect();
            wanted.iter().all(|w| have.contains(&w.as_str()))
        });
        if !matches {
            continue;
        }

        let mut depth = 1usize;
        let mut pos = open_end;
        loop {
            let next_open = find_tag(&lc, &open_pat, pos);
            let Some(close) = find_tag(&lc, &close_pat, pos) else {
                return Some(&html[open_end..]);
            };
            match next_open {
                Some(open) if open < close => {
                    depth += 1;
                    pos = open + open_pat.len();
                }
                _ => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&html[open_end..close]);
                    }
                    pos = close + close_pat.len();
                }
            }
        }
    }
    None
}

/// Position of the next `pattern` (`<div`, `</div`) that is a whole tag name
fn find_tag(lc: &str, pattern: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    loop {
        let at = pos + lc.get(pos..)?.find(pattern)?;
        let after = at + pattern.len();
        match lc[after..].chars().next() {
            None | Some('>') | Some('/') => return Some(at),
            Some(c) if c.is_whitespace() => return Some(at),
            _ => pos = after,
        }
    }
}

/// Value of the `class` attribute inside an opening tag
fn class_attr(open_tag: &str) -> Option<&str> {
    let mut rest = open_tag;
    while let Some(i) = rest.find("class") {
        let standalone = rest[..i].ends_with(|c: char| c.is_whitespace());
        let tail = &rest[i + "class".len()..];
        if let Some(value) = tail.trim_start().strip_prefix('=').filter(|_| standalone) {
            let value = value.trim_start();
            return match value.chars().next() {
                Some(q @ ('"' | '\'')) => value[1..].split(q).next(),
                _ => value.split(|c: char| c.is_whitespace() || c == '>').next(),
            };
        }
        rest = tail;
    }
    None
}

/// Replace every `<...>` tag with a space, keeping line breaks in the text
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Decode numeric character references and the named entities deal copy uses.
/// Unknown or malformed references are left as written.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp + 1..];

        let decoded = candidate
            .char_indices()
            .take(12)
            .find(|(_, c)| *c == ';')
            .and_then(|(semi, _)| decode_entity(&candidate[..semi]).map(|ch| (ch, semi)));

        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &candidate[semi + 1..];
            }
            None => {
                out.push('&');
                rest = candidate;
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }

    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "dollar" => '$',
        "cent" => '\u{a2}',
        "pound" => '\u{a3}',
        "euro" => '\u{20ac}',
        "yen" => '\u{a5}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "deg" => '\u{b0}',
        "times" => '\u{d7}',
        "frac12" => '\u{bd}',
        "frac14" => '\u{bc}',
        "frac34" => '\u{be}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "bull" => '\u{2022}',
        "middot" => '\u{b7}',
        _ => return None,
    };
    Some(ch)
}

/// Collapse runs of whitespace into one space and trim
pub fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Tags stripped, entities decoded, whitespace collapsed
pub fn text(html: &str) -> String {
    normalize_ws(&decode_entities(&strip_tags(html)))
}

//! Small case-insensitive helpers for pulling rows and cells out of an HTML
//! fragment. Naive by intent: they know nothing about nesting beyond "first
//! matching close tag", which is enough for flat calendar tables.

/// ASCII-only lowercasing. Non-ASCII chars are kept as-is, so byte offsets in
/// the result line up with the input.
pub fn to_lowercase_fast(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { c })
        .collect()
}

/// Every complete `<tag ...>...</tag>` block in `s`, in document order.
pub fn tag_blocks<'a>(s: &'a str, tag: &str) -> Vec<&'a str> {
    let lc = to_lowercase_fast(s);
    let open = format!("<{}", to_lowercase_fast(tag));
    let close = format!("</{}>", to_lowercase_fast(tag));

    let mut out = Vec::new();
    let mut from = 0usize;
    while let Some(rel) = lc[from..].find(&open) {
        let start = from + rel;
        // `<tr` must not match `<track`.
        let boundary = lc[start + open.len()..].chars().next();
        if !matches!(boundary, Some(c) if c.is_whitespace() || c == '>' || c == '/') {
            from = start + open.len();
            continue;
        }
        let Some(open_end) = s[start..].find('>').map(|i| start + i + 1) else { break };
        let Some(close_rel) = lc[open_end..].find(&close) else { break };
        let end = open_end + close_rel + close.len();
        out.push(&s[start..end]);
        from = end;
    }
    out
}

/// The opening tag of a block, `<td class="x">` for `<td class="x">..</td>`.
pub fn open_tag(block: &str) -> &str {
    match block.find('>') {
        Some(i) => &block[..=i],
        None => block,
    }
}

/// Value of attribute `name` in an opening tag. Quoted or bare values.
pub fn attr(tag: &str, name: &str) -> Option<String> {
    let lc = to_lowercase_fast(tag);
    let needle = format!("{}=", to_lowercase_fast(name));

    let mut from = 0usize;
    while let Some(rel) = lc[from..].find(&needle) {
        let at = from + rel;
        // Must be a whole attribute name, not the tail of a longer one.
        let preceded_ok = at == 0 || lc[..at].ends_with(|c: char| c.is_whitespace());
        let value_start = at + needle.len();
        if !preceded_ok {
            from = value_start;
            continue;
        }
        let rest = &tag[value_start..];
        let value = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => {
                let body = &rest[1..];
                &body[..body.find(q)?]
            }
            _ => {
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                &rest[..end]
            }
        };
        return Some(value.to_string());
    }
    None
}

/// True if the opening tag's `class` attribute contains `class` as a token.
pub fn has_class(tag: &str, class: &str) -> bool {
    attr(tag, "class")
        .map(|c| c.split_whitespace().any(|t| t.eq_ignore_ascii_case(class)))
        .unwrap_or(false)
}

/// First `<tag>` block in `s` whose opening tag carries `class`.
pub fn find_by_class<'a>(s: &'a str, tag: &str, class: &str) -> Option<&'a str> {
    tag_blocks(s, tag)
        .into_iter()
        .find(|b| has_class(open_tag(b), class))
}

/// Case-insensitive count of non-overlapping occurrences of `needle`.
pub fn count_ci(s: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    to_lowercase_fast(s).matches(&to_lowercase_fast(needle)).count()
}

/// Case-insensitive substring test.
pub fn contains_ci(s: &str, needle: &str) -> bool {
    to_lowercase_fast(s).contains(&to_lowercase_fast(needle))
}

/// Remove all tags, decode the common entities and collapse whitespace.
pub fn text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    normalize_ws(&normalize_entities(&out))
}

/// Minimal entity decoding for what calendar tables actually contain.
pub fn normalize_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Collapse sequences of whitespace into a single space and trim.
pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROW: &str = r#"<TR id="eventRowId_1" class="js-event-item" data-event-datetime="2025/09/18 21:30:00">
        <td class="first left time">21:30</td>
        <td class="left flagCur noWrap"><span title="United States" class="ceFlags USA">&nbsp;</span> USD</td>
        <td class="event"><a href='/economic-calendar/cpi-733'>CPI&nbsp;(YoY)</a></td>
    </TR><track src="x"></track>"#;

    #[test]
    fn finds_blocks_case_insensitively_without_prefix_matches() {
        let rows = tag_blocks(ROW, "tr");
        assert_eq!(rows.len(), 1);
        assert_eq!(tag_blocks(rows[0], "td").len(), 3);
    }

    #[test]
    fn reads_attributes_with_either_quote() {
        let row = tag_blocks(ROW, "tr")[0];
        assert_eq!(
            attr(open_tag(row), "data-event-datetime").as_deref(),
            Some("2025/09/18 21:30:00")
        );
        assert_eq!(attr(open_tag(row), "id").as_deref(), Some("eventRowId_1"));
        let link = tag_blocks(row, "a")[0];
        assert_eq!(attr(open_tag(link), "href").as_deref(), Some("/economic-calendar/cpi-733"));
        assert_eq!(attr(open_tag(link), "title"), None);
    }

    #[test]
    fn class_lookup_matches_whole_tokens() {
        let row = tag_blocks(ROW, "tr")[0];
        assert!(find_by_class(row, "td", "flagCur").is_some());
        assert!(find_by_class(row, "td", "flag").is_none());
        let event = find_by_class(row, "td", "event").unwrap();
        assert_eq!(text(event), "CPI (YoY)");
    }

    #[test]
    fn text_strips_tags_and_entities() {
        assert_eq!(text("<b>1.2%</b>&nbsp;"), "1.2%");
        assert_eq!(text("  a \n <i></i> b&amp;c "), "a b&c");
        assert_eq!(count_ci("<i class='A'></i><i class='a'></i>", "class='a'"), 2);
    }
}

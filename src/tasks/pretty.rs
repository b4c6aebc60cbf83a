//! Markup reformatting with 2-space indentation
//!
//! Block elements get their own lines and indent their children. Text and
//! inline elements stay together on one line, with whitespace runs
//! collapsed. `pre`, `textarea`, `script` and `style` bodies are copied
//! verbatim.

const INDENT: &str = "  ";

const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const INLINE: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "br", "button", "cite", "code", "data", "dfn", "em", "i",
    "img", "input", "kbd", "label", "mark", "q", "s", "samp", "small", "span", "strong", "sub",
    "sup", "time", "u", "var", "wbr",
];

const RAW: &[&str] = &["pre", "textarea", "script", "style"];

#[derive(Debug, PartialEq)]
enum Tag {
    /// Comment, doctype or processing instruction
    Special,
    Open(String),
    Close(String),
    /// Void element or `<x/>`
    Standalone(String),
}

fn tag_name(after_bracket: &str) -> String {
    after_bracket
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == ':')
        .collect::<String>()
        .to_ascii_lowercase()
}

fn classify(tag: &str) -> Tag {
    if tag.starts_with("<!") || tag.starts_with("<?") {
        return Tag::Special;
    }
    if let Some(rest) = tag.strip_prefix("</") {
        return Tag::Close(tag_name(rest));
    }
    let name = tag_name(&tag[1..]);
    if tag.ends_with("/>") || VOID.contains(&name.as_str()) {
        Tag::Standalone(name)
    } else {
        Tag::Open(name)
    }
}

/// Byte length of the tag at the start of `s`, honouring quoted attribute
/// values. `None` when the tag never closes.
fn tag_len(s: &str) -> Option<usize> {
    if s.starts_with("<!--") {
        return s.find("-->").map(|i| i + 3);
    }
    let mut quote = None;
    for (i, c) in s.char_indices().skip(1) {
        match (quote, c) {
            (None, '"') | (None, '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '>') => return Some(i + 1),
            _ => {}
        }
    }
    None
}

/// Byte offset of `</name` in `s`, ignoring ASCII case
fn find_close(s: &str, name: &str) -> Option<usize> {
    let needle = format!("</{}", name);
    s.to_ascii_lowercase().find(&needle)
}

/// Whether `s` begins with `</name`, ignoring ASCII case
fn starts_with_close(s: &str, name: &str) -> bool {
    let needle = format!("</{}", name);
    s.get(..needle.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(&needle))
}

fn collapse_whitespace(text: &str, out: &mut String) {
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
}

struct Printer {
    out: String,
    depth: usize,
    line: String,
}

impl Printer {
    fn push_line(&mut self, s: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(s);
        self.out.push('\n');
    }

    fn flush(&mut self) {
        let line = std::mem::take(&mut self.line);
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            self.push_line(trimmed);
        }
    }
}

/// Reformat HTML markup
pub fn format_html(src: &str) -> String {
    let mut p = Printer {
        out: String::with_capacity(src.len() + src.len() / 4),
        depth: 0,
        line: String::new(),
    };
    let mut rest = src;

    while !rest.is_empty() {
        if !rest.starts_with('<') {
            let end = rest.find('<').unwrap_or(rest.len());
            collapse_whitespace(&rest[..end], &mut p.line);
            rest = &rest[end..];
            continue;
        }

        let Some(len) = tag_len(rest) else {
            // Unterminated tag, keep as text
            collapse_whitespace(rest, &mut p.line);
            break;
        };
        let tag = &rest[..len];
        rest = &rest[len..];

        match classify(tag) {
            Tag::Special => {
                p.flush();
                p.push_line(tag);
            }
            Tag::Open(name) if RAW.contains(&name.as_str()) => {
                p.flush();
                let body_len = find_close(rest, &name).unwrap_or(rest.len());
                let after = &rest[body_len..];
                let close_len = tag_len(after).unwrap_or(after.len());
                let block = format!("{}{}{}", tag, &rest[..body_len], &after[..close_len]);
                p.push_line(&block);
                rest = &after[close_len..];
            }
            Tag::Open(name) | Tag::Close(name) | Tag::Standalone(name)
                if INLINE.contains(&name.as_str()) =>
            {
                p.line.push_str(tag);
            }
            Tag::Open(name) => {
                p.flush();
                // `<p>text</p>` stays on one line
                let text_len = rest.find('<').unwrap_or(rest.len());
                let after = &rest[text_len..];
                if starts_with_close(after, &name) {
                    let close_len = tag_len(after).unwrap_or(after.len());
                    let mut one_line = String::from(tag);
                    collapse_whitespace(rest[..text_len].trim(), &mut one_line);
                    one_line.push_str(&after[..close_len]);
                    p.push_line(&one_line);
                    rest = &after[close_len..];
                } else {
                    p.push_line(tag);
                    p.depth += 1;
                }
            }
            Tag::Close(_) => {
                p.flush();
                p.depth = p.depth.saturating_sub(1);
                p.push_line(tag);
            }
            Tag::Standalone(_) => {
                p.flush();
                p.push_line(tag);
            }
        }
    }

    p.flush();
    p.out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_blocks_are_indented() {
        let html = "<!DOCTYPE html><html><head><title>Hi</title><meta charset=\"utf-8\"></head>\
                    <body><h1>Hello <em>you</em></h1><p>a</p><br></body></html>";

        let expected = "\
<!DOCTYPE html>
<html>
  <head>
    <title>Hi</title>
    <meta charset=\"utf-8\">
  </head>
  <body>
    <h1>
      Hello <em>you</em>
    </h1>
    <p>a</p>
    <br>
  </body>
</html>
";
        assert_eq!(format_html(html), expected);
    }

    #[test]
    fn test_raw_bodies_are_verbatim() {
        let html = "<div><pre>  x\n    y</pre><script>if (a < b) { go(); }</script></div>";
        let expected = "<div>\n  <pre>  x\n    y</pre>\n  <script>if (a < b) { go(); }</script>\n</div>\n";
        assert_eq!(format_html(html), expected);
    }

    #[test]
    fn test_quoted_gt_in_attribute() {
        let html = r#"<div data-x="a>b"><span>t</span></div>"#;
        assert_eq!(
            format_html(html),
            "<div data-x=\"a>b\">\n  <span>t</span>\n</div>\n"
        );
    }

    #[test]
    fn test_whitespace_between_tags_collapses() {
        let html = "<ul>\n\n   <li>one</li>\n     <li>two   words</li>\n</ul>";
        assert_eq!(
            format_html(html),
            "<ul>\n  <li>one</li>\n  <li>two words</li>\n</ul>\n"
        );
    }

    #[test]
    fn test_comment_on_its_own_line() {
        let html = "<div><!-- note --><p>x</p></div>";
        assert_eq!(
            format_html(html),
            "<div>\n  <!-- note -->\n  <p>x</p>\n</div>\n"
        );
    }
}

//! Text helpers shared by models and services
//!
//! - URL codes from names and titles
//! - Title casing for post titles
//! - HTML escaping and paragraph wrapping for public comments
//! - Light HTML scanning: first paragraph text and image sources

use once_cell::sync::Lazy;
use regex::Regex;

static NON_CODE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid code regex"));

static CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").expect("valid code regex"));

static LINE_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\n\r]+").expect("valid newline regex"));

static PARAGRAPH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p\s*>").expect("valid paragraph regex"));

static IMG_SRC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .expect("valid img regex")
});

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(/?)([A-Za-z][A-Za-z0-9]*)[^>]*?(/?)>").expect("valid tag regex"));

const SMALL_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "en", "for", "if", "in", "nor", "of", "on", "or",
    "per", "the", "to", "v", "v.", "via", "vs", "vs.",
];

const VOID_ELEMENTS: &[&str] = &["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "wbr"];

/// Lower-case `s` and replace every run of characters outside `[a-z0-9]` with
/// a hyphen. `strip_hyphens` trims hyphens from both ends.
pub fn make_code(s: &str, strip_hyphens: bool) -> String {
    let lower = s.to_lowercase();
    let code = NON_CODE_CHARS.replace_all(&lower, "-");
    if strip_hyphens {
        code.trim_matches('-').to_string()
    } else {
        code.into_owned()
    }
}

/// Whether `code` is already URL safe.
pub fn is_valid_code(code: &str) -> bool {
    CODE_RE.is_match(code)
}

/// Title-case a headline. Small words stay lower case unless they open or
/// close the title or follow a colon; words with capitals after the first
/// letter, and dotted words such as domains, keep their casing. An all-caps
/// title is lowered first.
pub fn titlecase(text: &str) -> String {
    let shouting = text.chars().any(char::is_alphabetic) && !text.chars().any(char::is_lowercase);
    let source = if shouting { text.to_lowercase() } else { text.to_string() };

    let words: Vec<&str> = source.split(' ').collect();
    let first = words.iter().position(|w| !w.is_empty());
    let last = words.iter().rposition(|w| !w.is_empty());

    let mut out = Vec::with_capacity(words.len());
    let mut after_colon = false;
    for (i, word) in words.iter().enumerate() {
        if word.is_empty() {
            out.push(String::new());
            continue;
        }
        let force = Some(i) == first || Some(i) == last || after_colon;
        out.push(titlecase_word(word, force));
        after_colon = word.ends_with(':');
    }
    out.join(" ")
}

fn titlecase_word(word: &str, force: bool) -> String {
    let inner = word.trim_matches(|c: char| !c.is_alphanumeric());
    if inner.contains('.') || inner.contains('@') || inner.contains('/') {
        return word.to_string();
    }
    if has_inner_capitals(word) {
        return word.to_string();
    }
    let lower = word.to_lowercase();
    let core = lower.trim_matches(|c: char| !c.is_alphanumeric() && c != '.');
    if !force && SMALL_WORDS.contains(&core) {
        return lower;
    }
    word.split('-').map(capitalise).collect::<Vec<_>>().join("-")
}

fn has_inner_capitals(word: &str) -> bool {
    word.chars()
        .skip_while(|c| !c.is_alphabetic())
        .skip(1)
        .any(char::is_uppercase)
}

fn capitalise(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    let mut done = false;
    for c in part.chars() {
        if !done && c.is_alphabetic() {
            out.extend(c.to_uppercase());
            done = true;
        } else {
            out.push(c);
        }
    }
    out
}

/// Escape text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape plain text and wrap each line run in `<p>` elements.
pub fn paragraphize(text: &str) -> String {
    let escaped = escape_html(text);
    let parts: Vec<&str> = LINE_BREAKS.split(&escaped).collect();
    format!("<p>{}</p>", parts.join("</p><p>"))
}

/// Decode HTML entities; non-breaking spaces become plain spaces
pub fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).replace('\u{a0}', " ")
}

/// Text of the first `<p>` that holds text directly.
///
/// Direct text pieces are joined with spaces, and text one element deep is
/// included (so `<p>Read <b>this</b></p>` gives `Read  this`). Paragraphs whose
/// text is all nested, like `<p><img></p>`, are skipped. The result is
/// transliterated to ASCII.
pub fn first_paragraph_text(html: &str) -> String {
    for caps in PARAGRAPH_RE.captures_iter(html) {
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let mut desc = String::new();
        let mut found = false;
        let mut depth: usize = 0;
        let mut cursor = 0;

        let take_text = |text: &str, depth: usize, desc: &mut String, found: &mut bool| {
            if text.is_empty() {
                return;
            }
            if depth == 0 {
                *found = true;
                desc.push_str(&decode_entities(text));
                desc.push(' ');
            } else if depth == 1 {
                desc.push_str(&decode_entities(text));
                desc.push(' ');
            }
        };

        for tag in TAG_RE.captures_iter(inner) {
            let whole = tag.get(0).map(|m| m.range()).unwrap_or(0..0);
            take_text(&inner[cursor..whole.start], depth, &mut desc, &mut found);
            cursor = whole.end;

            let closing = tag.get(1).map_or(false, |m| !m.as_str().is_empty());
            let self_closing = tag.get(3).map_or(false, |m| !m.as_str().is_empty());
            let name = tag.get(2).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
            if closing {
                depth = depth.saturating_sub(1);
            } else if !self_closing && !VOID_ELEMENTS.contains(&name.as_str()) {
                depth += 1;
            }
        }
        take_text(&inner[cursor..], depth, &mut desc, &mut found);

        if found {
            return deunicode::deunicode(desc.trim());
        }
    }
    String::new()
}

/// `src` of every `<img>` in document order.
pub fn image_sources(html: &str) -> Vec<String> {
    IMG_SRC_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Cut `text` to at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_code() {
        assert_eq!(make_code("Hello, World!", true), "hello-world");
        assert_eq!(make_code("  Rust & SQL  ", true), "rust-sql");
        assert_eq!(make_code("  Rust & SQL  ", false), "-rust-sql-");
        assert_eq!(make_code("Café Society", true), "caf-society");
        assert_eq!(make_code("2024 Review", true), "2024-review");
    }

    #[test]
    fn test_is_valid_code() {
        assert!(is_valid_code("my-post-1"));
        assert!(!is_valid_code("My Post"));
        assert!(!is_valid_code(""));
    }

    #[test]
    fn test_titlecase_small_words() {
        assert_eq!(titlecase("the lord of the rings"), "The Lord of the Rings");
        assert_eq!(titlecase("what it is for"), "What It Is For");
        assert_eq!(titlecase("notes: a new start"), "Notes: A New Start");
    }

    #[test]
    fn test_titlecase_keeps_special_words() {
        assert_eq!(titlecase("my new iPhone"), "My New iPhone");
        assert_eq!(titlecase("visit example.com today"), "Visit example.com Today");
        assert_eq!(titlecase("the NHS and me"), "The NHS and Me");
    }

    #[test]
    fn test_titlecase_shouting_and_hyphens() {
        assert_eq!(titlecase("A TALE OF TWO CITIES"), "A Tale of Two Cities");
        assert_eq!(titlecase("long-term plans"), "Long-Term Plans");
        assert_eq!(titlecase("don't panic"), "Don't Panic");
    }

    #[test]
    fn test_paragraphize_escapes_and_splits() {
        assert_eq!(
            paragraphize("Hello <b>there</b>\r\n\r\nSecond line\nThird"),
            "<p>Hello &lt;b&gt;there&lt;/b&gt;</p><p>Second line</p><p>Third</p>"
        );
        assert_eq!(paragraphize("it's \"quoted\" & more"), "<p>it&#39;s &#34;quoted&#34; &amp; more</p>");
    }

    #[test]
    fn test_first_paragraph_text() {
        let html = "<h1>Title</h1><p><img src=\"a.png\"></p><p>Read <b>this</b> now</p><p>Later</p>";
        assert_eq!(first_paragraph_text(html), "Read  this  now");
    }

    #[test]
    fn test_first_paragraph_text_ignores_deep_text() {
        let html = "<p>Top <span><em>deep</em> shallow</span></p>";
        assert_eq!(first_paragraph_text(html), "Top   shallow");
    }

    #[test]
    fn test_first_paragraph_text_none() {
        assert_eq!(first_paragraph_text("<div>No paragraphs</div>"), "");
        assert_eq!(first_paragraph_text("<p><strong>only nested</strong></p>"), "");
    }

    #[test]
    fn test_first_paragraph_text_decodes_entities() {
        assert_eq!(first_paragraph_text("<p class=\"lead\">Fish &amp; chips</p>"), "Fish & chips");
        assert_eq!(
            first_paragraph_text("<p>Caf&eacute; &amp; cr&egrave;me at Z&uuml;rich&nbsp;hall</p>"),
            "Cafe & creme at Zurich hall"
        );
        assert_eq!(first_paragraph_text("<p>It&#8217;s &lt;free&gt;</p>"), "It's <free>");
    }

    #[test]
    fn test_first_paragraph_text_is_ascii() {
        assert_eq!(first_paragraph_text("<p>Crème brûlée night</p>"), "Creme brulee night");
    }

    #[test]
    fn test_image_sources() {
        let html = r#"<p><img src="/a.png" alt="x"></p><IMG class='wide' SRC='b.jpg'/><img src=c.gif>"#;
        assert_eq!(image_sources(html), vec!["/a.png", "b.jpg", "c.gif"]);
        assert!(image_sources("<p>none</p>").is_empty());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn stripped_codes_are_url_safe(s in "\\PC{0,40}") {
                let code = make_code(&s, true);
                prop_assert!(code.is_empty() || is_valid_code(&code));
                prop_assert!(!code.starts_with('-') && !code.ends_with('-'));
                prop_assert!(!code.contains("--"));
            }

            #[test]
            fn make_code_is_idempotent(s in "[A-Za-z0-9 ,.!-]{0,40}") {
                let once = make_code(&s, true);
                prop_assert_eq!(make_code(&once, true), once.clone());
            }

            #[test]
            fn escaped_text_has_no_markup(s in "\\PC{0,60}") {
                let escaped = escape_html(&s);
                prop_assert!(!escaped.contains('<') && !escaped.contains('>') && !escaped.contains('"'));
            }
        }
    }
}

//! Article body detection and text cleanup.
//!
//! Works on a parsed `scraper::Html` tree and never mutates it: noise
//! elements are skipped while rendering instead of being removed.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;
use tracing::debug;

/// Upper bound on extracted text, in characters (~2k tokens)
pub const MAX_TEXT_CHARS: usize = 8000;

/// Below this many characters a page is not worth summarising
pub const MIN_TEXT_CHARS: usize = 100;

/// A CMS content container must beat this length to be picked
pub const CANDIDATE_MIN_CHARS: usize = 300;

/// Comments, sidebars, promos, page chrome, bios, share widgets and tags.
const NOISE_SELECTORS: &str = concat!(
    r#"[id*="comment"], [class*="comment"], "#,
    r#"[id*="discuss"], [class*="discuss"], "#,
    r#"[id*="replies"], [class*="replies"], "#,
    r#"aside, [role="complementary"], "#,
    r#"[class*="sidebar"], [class*="related"], "#,
    r#"[class*="recommend"], [class*="suggestion"], "#,
    r#"[class*="promo"], [class*="banner"], [class*="advert"], "#,
    r#"nav, header, footer, "#,
    r#"[role="navigation"], [role="banner"], [role="contentinfo"], "#,
    r#"[class*="author-bio"], [class*="share"], "#,
    r#"[class*="tags"], [class*="subscribe"]"#,
);

const CANDIDATE_SELECTORS: &str = concat!(
    r#"[class*="article-body"], [class*="post-content"], [class*="entry-content"], "#,
    r#"[class*="article__body"], [class*="story-body"], [class*="article-text"], "#,
    r#"[id*="article-body"], [id*="post-body"], #content, .content"#,
);

lazy_static! {
    static ref NOISE: Selector = Selector::parse(NOISE_SELECTORS).expect("noise selector");
    static ref CANDIDATES: Selector =
        Selector::parse(CANDIDATE_SELECTORS).expect("candidate selector");
    static ref ARTICLE: Selector = Selector::parse("article").expect("article selector");
    static ref MAIN: Selector = Selector::parse("main").expect("main selector");
    static ref ROLE_MAIN: Selector = Selector::parse(r#"[role="main"]"#).expect("role selector");
    static ref BODY: Selector = Selector::parse("body").expect("body selector");
    static ref TABS: Regex = Regex::new(r"\t").expect("tab regex");
    static ref SPACES: Regex = Regex::new(r" {2,}").expect("space regex");
    static ref NEWLINES: Regex = Regex::new(r"\n{3,}").expect("newline regex");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("whitespace regex");
}

/// Which rule of the cascade produced the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Article,
    Main,
    AriaMain,
    Container,
    Body,
}

/// Extract the cleaned main text of a page, or an empty string.
pub fn extract_article_text(document: &Html) -> String {
    let (source, text) = locate_content(document);
    debug!(?source, chars = text.chars().count(), "located page content");
    clean(&text)
}

/// Run the cascade and return the raw (uncleaned) noise-stripped text.
///
/// 1. first `<article>`
/// 2. first `<main>`
/// 3. first `[role="main"]`
/// 4. the longest CMS content container over [`CANDIDATE_MIN_CHARS`]
/// 5. the whole body
pub fn locate_content(document: &Html) -> (ContentSource, String) {
    let semantic = [
        (ContentSource::Article, &*ARTICLE),
        (ContentSource::Main, &*MAIN),
        (ContentSource::AriaMain, &*ROLE_MAIN),
    ];
    for (source, selector) in semantic {
        if let Some(element) = document.select(selector).next() {
            return (source, stripped_text(element));
        }
    }

    let mut best: Option<String> = None;
    let mut best_len = 0;
    for element in document.select(&CANDIDATES) {
        let text = stripped_text(element);
        let len = text.chars().count();
        if len > best_len && len > CANDIDATE_MIN_CHARS {
            best_len = len;
            best = Some(text);
        }
    }
    if let Some(text) = best {
        return (ContentSource::Container, text);
    }

    let body = document
        .select(&BODY)
        .next()
        .unwrap_or_else(|| document.root_element());
    (ContentSource::Body, stripped_text(body))
}

/// Rendered text of `element`, leaving out every noise descendant.
fn stripped_text(element: ElementRef<'_>) -> String {
    let noise: HashSet<_> = element.select(&NOISE).map(|el| el.id()).collect();
    let mut renderer = TextRenderer::default();
    renderer.element(element, &|el| noise.contains(&el.id()));
    renderer.finish()
}

/// Collapse whitespace, squeeze blank lines, trim and truncate.
pub fn clean(text: &str) -> String {
    let text = TABS.replace_all(text, " ");
    let text = SPACES.replace_all(&text, " ");
    let text = NEWLINES.replace_all(&text, "\n\n");
    truncate_chars(text.trim(), MAX_TEXT_CHARS).to_string()
}

/// Whether extracted text is long enough to be sent for summarisation
pub fn has_enough_text(text: &str) -> bool {
    text.trim().chars().count() >= MIN_TEXT_CHARS
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Never rendered.
fn is_hidden(name: &str) -> bool {
    matches!(
        name,
        "script" | "style" | "noscript" | "template" | "head" | "svg" | "iframe"
    )
}

/// Separated from their siblings by a blank line.
fn is_paragraph(name: &str) -> bool {
    matches!(name, "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

/// Start and end on their own line.
fn is_block(name: &str) -> bool {
    matches!(
        name,
        "address"
            | "article"
            | "aside"
            | "blockquote"
            | "body"
            | "caption"
            | "dd"
            | "details"
            | "dialog"
            | "div"
            | "dl"
            | "dt"
            | "fieldset"
            | "figcaption"
            | "figure"
            | "footer"
            | "form"
            | "header"
            | "hr"
            | "li"
            | "main"
            | "nav"
            | "ol"
            | "pre"
            | "section"
            | "summary"
            | "table"
            | "tr"
            | "ul"
    )
}

/// Approximates the browser's `innerText` for a subtree.
#[derive(Default)]
struct TextRenderer {
    out: String,
    /// Line breaks owed before the next piece of text
    pending_breaks: usize,
    in_pre: usize,
}

impl TextRenderer {
    fn element(&mut self, element: ElementRef<'_>, skip: &dyn Fn(&ElementRef<'_>) -> bool) {
        let name = element.value().name();
        if is_hidden(name) {
            return;
        }

        let breaks = if is_paragraph(name) {
            2
        } else if is_block(name) {
            1
        } else {
            0
        };
        self.require_breaks(breaks);
        if name == "pre" {
            self.in_pre += 1;
        }

        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.text(text),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        if skip(&child_el) {
                            continue;
                        }
                        match child_el.value().name() {
                            "br" => self.line_break(),
                            "td" | "th" => {
                                self.text("\t");
                                self.element(child_el, skip);
                            }
                            _ => self.element(child_el, skip),
                        }
                    }
                }
                _ => {}
            }
        }

        if name == "pre" {
            self.in_pre -= 1;
        }
        self.require_breaks(breaks);
    }

    fn require_breaks(&mut self, count: usize) {
        self.pending_breaks = self.pending_breaks.max(count);
    }

    fn line_break(&mut self) {
        self.flush_breaks();
        self.trim_trailing_spaces();
        self.out.push('\n');
    }

    fn text(&mut self, raw: &str) {
        if self.in_pre > 0 {
            if !raw.is_empty() {
                self.flush_breaks();
                self.out.push_str(raw);
            }
            return;
        }

        let collapsed = WHITESPACE.replace_all(raw, " ");
        if collapsed.trim().is_empty() {
            if !self.at_line_start() && !self.out.ends_with(' ') && self.pending_breaks == 0 {
                self.out.push(' ');
            }
            return;
        }

        self.flush_breaks();
        let piece = if self.at_line_start() || self.out.ends_with(' ') {
            collapsed.trim_start()
        } else {
            &collapsed
        };
        self.out.push_str(piece);
    }

    fn flush_breaks(&mut self) {
        if self.pending_breaks == 0 {
            return;
        }
        if !self.out.is_empty() {
            self.trim_trailing_spaces();
            let owed = self.pending_breaks.saturating_sub(self.trailing_newlines());
            for _ in 0..owed {
                self.out.push('\n');
            }
        }
        self.pending_breaks = 0;
    }

    fn trim_trailing_spaces(&mut self) {
        let len = self.out.trim_end_matches(' ').len();
        self.out.truncate(len);
    }

    fn trailing_newlines(&self) -> usize {
        self.out.chars().rev().take_while(|c| *c == '\n').count()
    }

    fn at_line_start(&self) -> bool {
        self.out.is_empty() || self.out.ends_with('\n')
    }

    fn finish(mut self) -> String {
        self.trim_trailing_spaces();
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> String {
        extract_article_text(&Html::parse_document(html))
    }

    fn filler(words: usize) -> String {
        vec!["lorem"; words].join(" ")
    }

    #[test]
    fn article_wins_and_drops_nested_related_aside() {
        let html = r#"<html><body>
            <main><p>Main text that should not be used.</p></main>
            <article>
              <h1>Title</h1>
              <p>First paragraph of the story.</p>
              <aside class="related"><p>Read this other thing</p></aside>
              <p>Second paragraph.</p>
            </article>
        </body></html>"#;

        let text = extract(html);
        assert_eq!(
            text,
            "Title\n\nFirst paragraph of the story.\n\nSecond paragraph."
        );
        assert!(!text.contains("other thing"));
        assert!(!text.contains("Main text"));
    }

    #[test]
    fn main_then_role_main() {
        let html = r#"<body><nav>Menu</nav><main><p>From main.</p></main></body>"#;
        assert_eq!(extract(html), "From main.");

        let html = r#"<body><div role="main"><p>From landmark.</p></div><p>Outside</p></body>"#;
        assert_eq!(extract(html), "From landmark.");
    }

    #[test]
    fn longest_cms_container_over_floor_is_picked() {
        let short = filler(10);
        let long = filler(80);
        let html = format!(
            r#"<body>
              <div class="post-content"><p>{short}</p></div>
              <div class="entry-content"><p>{long}</p></div>
              <p>page footer text</p>
            </body>"#
        );
        let (source, _) = locate_content(&Html::parse_document(&html));
        assert_eq!(source, ContentSource::Container);
        assert_eq!(extract(&html), long);
    }

    #[test]
    fn container_must_exceed_the_floor() {
        let exact = "a".repeat(CANDIDATE_MIN_CHARS);
        let html = format!(r#"<body><div class="post-content">{exact}</div></body>"#);
        let (source, text) = locate_content(&Html::parse_document(&html));
        assert_eq!(source, ContentSource::Body);
        assert_eq!(text, exact);
    }

    #[test]
    fn equal_containers_keep_the_first() {
        let first = "a".repeat(CANDIDATE_MIN_CHARS + 1);
        let second = "b".repeat(CANDIDATE_MIN_CHARS + 1);
        let html = format!(
            r#"<body><div class="post-content">{first}</div><div class="entry-content">{second}</div></body>"#
        );
        let (source, text) = locate_content(&Html::parse_document(&html));
        assert_eq!(source, ContentSource::Container);
        assert_eq!(text, first);
    }

    #[test]
    fn short_containers_fall_back_to_body() {
        let html = r#"<body>
            <header>Site header</header>
            <div class="content"><p>Tiny content block.</p></div>
            <p>Loose paragraph in the body.</p>
            <footer>Copyright</footer>
        </body>"#;

        let (source, _) = locate_content(&Html::parse_document(html));
        assert_eq!(source, ContentSource::Body);
        assert_eq!(
            extract(html),
            "Tiny content block.\n\nLoose paragraph in the body."
        );
    }

    #[test]
    fn noise_inside_body_fallback_is_removed() {
        let html = r#"<body>
            <p>Keep me.</p>
            <div id="comments"><p>Great post!</p></div>
            <div class="share-buttons">Share on X</div>
            <ul class="tags"><li>rust</li></ul>
            <div class="newsletter-subscribe">Join us</div>
        </body>"#;
        assert_eq!(extract(html), "Keep me.");
    }

    #[test]
    fn container_matching_noise_keeps_its_own_text() {
        // only descendants are purged, never the container itself
        let html = r#"<body><article class="comment-free-zone"><p>Body text.</p></article></body>"#;
        assert_eq!(extract(html), "Body text.");
    }

    #[test]
    fn scripts_and_styles_are_ignored() {
        let html = r#"<body><article><script>var x = 1;</script><style>p{}</style><p>Visible</p></article></body>"#;
        assert_eq!(extract(html), "Visible");
    }

    #[test]
    fn inline_elements_do_not_break_lines() {
        let html = r#"<article><p>Hello <b>bold</b>   and <a href="/">linked</a>
            words.</p><ul><li>one</li><li>two</li></ul></article>"#;
        assert_eq!(extract(html), "Hello bold and linked words.\n\none\ntwo");
    }

    #[test]
    fn empty_page_yields_empty_string() {
        assert_eq!(extract("<html><body></body></html>"), "");
        assert_eq!(extract(""), "");
    }

    #[test]
    fn document_is_not_mutated() {
        let html = r#"<article><p>Text</p><aside>Side</aside></article>"#;
        let document = Html::parse_document(html);
        let _ = extract_article_text(&document);
        assert_eq!(document.select(&Selector::parse("aside").unwrap()).count(), 1);
    }

    #[test]
    fn clean_collapses_whitespace_and_blank_lines() {
        let raw = "  a\t\tb   c\n\n\n\n\nd  ";
        assert_eq!(clean(raw), "a b c\n\nd");
    }

    #[test]
    fn clean_truncates_to_exact_bound() {
        let raw = "x".repeat(MAX_TEXT_CHARS + 500);
        assert_eq!(clean(&raw).chars().count(), MAX_TEXT_CHARS);

        let raw = "é".repeat(MAX_TEXT_CHARS * 2);
        let cleaned = clean(&raw);
        assert_eq!(cleaned.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn long_article_is_truncated() {
        let body = (0..2000).map(|i| format!("<p>Sentence number {i}.</p>")).collect::<String>();
        let text = extract(&format!("<article>{body}</article>"));
        assert_eq!(text.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn enough_text_threshold() {
        assert!(!has_enough_text(&"a".repeat(MIN_TEXT_CHARS - 1)));
        assert!(has_enough_text(&"a".repeat(MIN_TEXT_CHARS)));
        assert!(!has_enough_text(&format!("   {}   ", "a".repeat(50))));
    }
}

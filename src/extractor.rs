use crate::outcome::Location;
use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag, TagEnd};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// How long an `"interrupt": true` example is allowed to run before it is stopped.
pub const DEFAULT_INTERRUPT_AFTER: Duration = Duration::from_millis(500);

/// A fenced code example extracted from a document, with enough position
/// information to point back at it.
///
/// Units are identified by fenced code syntax in markdown, optionally preceded
/// by a directive comment holding a JSON object:
///
/// ````markdown
/// <!-- { "output": "^hello$", "args": ["--loud"] } -->
/// ```bash
/// echo hello
/// ```
/// ````
///
/// # Flags
///
/// The fence info string may carry comma- or space-separated flags after the
/// language tag:
///
/// - `ignore` / `skip` - Never run this example
#[derive(Debug, Clone)]
pub struct ExtractedUnit {
    /// Path of the document the unit was found in
    pub source: Arc<PathBuf>,
    /// 1-based line of the opening fence
    pub line_offset: usize,
    /// Language tag as written in the fence, rewritten to the canonical name once resolved
    pub lang: String,
    /// The code between the fences
    pub code: String,
    /// Flags that followed the language tag in the fence info string
    pub flags: Vec<String>,
    /// Directive tags from the preceding comment, if any
    pub tags: UnitTags,
    /// Index among the fenced blocks of the same document
    pub ordinal: usize,
}

impl ExtractedUnit {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    pub fn location(&self) -> Location {
        Location::unit(self.source.clone(), self.line_offset, &self.lang)
    }
}

/// Per-example directives, read from a `<!-- { ... } -->` comment placed
/// directly above the fence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UnitTags {
    /// Regex that captured stdout must match
    pub output: Option<String>,
    /// Regex that captured stderr must match
    pub error: Option<String>,
    /// Extra arguments handed to the example
    pub args: Vec<String>,
    /// Stop the example after a while and count that as success
    pub interrupt: Option<Interrupt>,
    /// Operating systems the example may run on (`linux`, `macos`, `windows`, ...)
    pub os: Vec<String>,
    /// Explicitly skip this example
    pub skip: Option<SkipTag>,
    /// Expected exit status (default 0)
    pub exit: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Interrupt {
    Flag(bool),
    Seconds(f64),
}

impl Interrupt {
    /// Returns how long to let the example run, or `None` if it should run to completion.
    pub fn after(&self) -> Option<Duration> {
        match *self {
            Interrupt::Flag(true) => Some(DEFAULT_INTERRUPT_AFTER),
            Interrupt::Flag(false) => None,
            Interrupt::Seconds(secs) if secs > 0.0 => match Duration::try_from_secs_f64(secs) {
                Ok(after) => Some(after),
                Err(_) => {
                    log::warn!(
                        "interrupt of {}s is out of range, using {:?}",
                        secs,
                        DEFAULT_INTERRUPT_AFTER
                    );
                    Some(DEFAULT_INTERRUPT_AFTER)
                }
            },
            Interrupt::Seconds(_) => Some(DEFAULT_INTERRUPT_AFTER),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SkipTag {
    Flag(bool),
    Reason(String),
}

impl SkipTag {
    /// Returns the skip reason, or `None` if the tag does not ask for a skip.
    pub fn reason(&self) -> Option<String> {
        match self {
            SkipTag::Flag(true) => Some("skip directive".to_string()),
            SkipTag::Flag(false) => None,
            SkipTag::Reason(reason) => Some(reason.clone()),
        }
    }
}

/// Discovers the units of one document.
///
/// Implementations must return every unit, fully materialized, in the order the
/// fences occur in the text.
pub trait Finder: Send + Sync {
    fn find(&self, source: &Path, text: &str) -> Vec<ExtractedUnit>;
}

/// [`Finder`] for CommonMark/GFM documents, built on pulldown-cmark.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownFinder;

impl Finder for MarkdownFinder {
    fn find(&self, source: &Path, text: &str) -> Vec<ExtractedUnit> {
        extract_units(source, text)
    }
}

/// Extracts fenced code blocks from markdown content.
///
/// Indented code blocks are not examples and are skipped.
///
/// # Example
///
/// ```ignore
/// let markdown = r#"
/// ```c
/// int main() { return 0; }
/// ```
/// "#;
///
/// let units = extract_units(Path::new("README.md"), markdown);
/// assert_eq!(units.len(), 1);
/// assert_eq!(units[0].lang, "c");
/// assert_eq!(units[0].line_offset, 2);
/// ```
pub fn extract_units(source: &Path, content: &str) -> Vec<ExtractedUnit> {
    let source = Arc::new(source.to_path_buf());
    let lines = LineIndex::new(content);
    let mut units = Vec::new();

    let mut current: Option<ExtractedUnit> = None;
    let mut html = String::new();
    let mut in_html = false;
    let mut pending_tags: Option<UnitTags> = None;

    for (event, range) in Parser::new(content).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                let (lang, flags) = parse_fence_info(&info);

                current = Some(ExtractedUnit {
                    source: source.clone(),
                    line_offset: lines.line_of(range.start),
                    lang,
                    code: String::new(),
                    flags,
                    tags: pending_tags.take().unwrap_or_default(),
                    ordinal: units.len(),
                });
            }

            Event::End(TagEnd::CodeBlock) => {
                if let Some(unit) = current.take() {
                    units.push(unit);
                }
            }

            Event::Text(text) => {
                if let Some(unit) = current.as_mut() {
                    unit.code.push_str(&text);
                }
            }

            Event::Start(Tag::HtmlBlock) => {
                in_html = true;
                html.clear();
            }

            Event::Html(text) if in_html => html.push_str(&text),

            Event::End(TagEnd::HtmlBlock) => {
                in_html = false;
                pending_tags = parse_directive(&html, &source, lines.line_of(range.start));
            }

            // Anything between a directive and its fence detaches the directive
            Event::Start(_) => pending_tags = None,

            _ => {}
        }
    }

    units
}

/// Parse fence info string into language and flags
/// Examples:
/// - "bash" -> ("bash", [])
/// - "python,ignore" -> ("python", ["ignore"])
/// - "go skip" -> ("go", ["skip"])
fn parse_fence_info(info: &str) -> (String, Vec<String>) {
    let mut parts = info
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let language = parts.next().unwrap_or_default().to_string();
    let flags = parts.map(str::to_string).collect();

    (language, flags)
}

/// Reads a `<!-- { ... } -->` directive comment. Other HTML yields `None`.
fn parse_directive(html: &str, source: &Path, line: usize) -> Option<UnitTags> {
    let body = html
        .trim()
        .strip_prefix("<!--")?
        .strip_suffix("-->")?
        .trim();

    if !body.starts_with('{') {
        return None;
    }

    match serde_json::from_str(body) {
        Ok(tags) => Some(tags),
        Err(e) => {
            log::warn!(
                "ignoring malformed directive source={} line={} error={}",
                source.display(),
                line,
                e
            );
            None
        }
    }
}

/// Maps byte offsets to 1-based line numbers.
struct LineIndex {
    newlines: Vec<usize>,
}

impl LineIndex {
    fn new(content: &str) -> Self {
        Self {
            newlines: content.match_indices('\n').map(|(i, _)| i).collect(),
        }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.newlines.partition_point(|&nl| nl < offset) + 1
    }
}

use std::collections::HashMap;
use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser as CmarkParser, Tag, TagEnd};

use crate::block::{Block, BlockType, NameForm, Stream};
use crate::parser::error::ParseError;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Scan Markdown source text into block records, one per fenced code block.
pub fn parse_blocks(
    source: &str,
    file_id: usize,
    hide_literal_blocks: bool,
) -> Result<Vec<Block>, Vec<ParseError>> {
    let options = Options::ENABLE_YAML_STYLE_METADATA_BLOCKS;
    let parser = CmarkParser::new_ext(source, options);
    let events: Vec<(Event<'_>, Range<usize>)> = parser.into_offset_iter().collect();

    let mut state = ScanState::new(file_id, hide_literal_blocks);
    state.process_events(&events);
    state.finalize()
}

// ---------------------------------------------------------------------------
// Scan state
// ---------------------------------------------------------------------------

struct ScanState {
    file_id: usize,
    hide_literal_blocks: bool,
    /// Open headings at levels 1-3.
    headings: [Option<String>; 3],
    blocks: Vec<Block>,
    /// Block name → span of its first definition.
    seen: HashMap<String, Range<usize>>,
    fence_count: usize,
    errors: Vec<ParseError>,
}

/// Attributes read from a fence info string.
#[derive(Debug, Default, PartialEq)]
struct FenceInfo {
    language: Option<String>,
    name: Option<String>,
    title: Option<String>,
    reqs: Vec<String>,
    call: Option<String>,
    stdout: Option<Stream>,
    hidden: bool,
    disabled: bool,
}

impl ScanState {
    fn new(file_id: usize, hide_literal_blocks: bool) -> Self {
        ScanState {
            file_id,
            hide_literal_blocks,
            headings: [None, None, None],
            blocks: Vec::new(),
            seen: HashMap::new(),
            fence_count: 0,
            errors: Vec::new(),
        }
    }

    fn process_events(&mut self, events: &[(Event<'_>, Range<usize>)]) {
        let mut i = 0;

        while i < events.len() {
            let (ref ev, ref range) = events[i];

            match ev {
                Event::Start(Tag::Heading { level, .. }) => {
                    i += 1;
                    let title = collect_text_until(events, &mut i, |e| {
                        matches!(e, TagEnd::Heading(_))
                    });
                    self.open_heading(level, normalize_heading(&title));
                }

                // Front matter is not part of any block.
                Event::Start(Tag::MetadataBlock(_)) => {
                    i += 1;
                    collect_text_until(events, &mut i, |e| matches!(e, TagEnd::MetadataBlock(_)));
                }

                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                    let info = info.to_string();
                    let span = range.clone();
                    i += 1;
                    let content = collect_text_until(events, &mut i, |e| {
                        matches!(e, TagEnd::CodeBlock)
                    });
                    self.fence_count += 1;
                    self.add_block(&info, &content, span);
                }

                _ => {
                    i += 1;
                }
            }
        }
    }

    fn open_heading(&mut self, level: &HeadingLevel, title: String) {
        let slot = match level {
            HeadingLevel::H1 => 0,
            HeadingLevel::H2 => 1,
            HeadingLevel::H3 => 2,
            _ => return,
        };
        self.headings[slot] = Some(title);
        for deeper in &mut self.headings[slot + 1..] {
            *deeper = None;
        }
    }

    fn add_block(&mut self, info: &str, content: &str, span: Range<usize>) {
        let info = match parse_fence_info(info) {
            Ok(info) => info,
            Err(message) => {
                self.errors
                    .push(ParseError::bad_fence(&message, span, self.file_id));
                return;
            }
        };

        let name = info
            .name
            .unwrap_or_else(|| format!("block-{}", self.fence_count));

        if let Some(first) = self.seen.get(&name) {
            self.errors.push(ParseError::duplicate_block(
                &name,
                span,
                first.clone(),
                self.file_id,
            ));
            return;
        }
        self.seen.insert(name.clone(), span.clone());

        let form = NameForm::of(&name);
        let block_type = match form {
            NameForm::Bracketed => BlockType::Vars,
            _ => info
                .language
                .as_deref()
                .map(BlockType::from_language)
                .unwrap_or(BlockType::Bash),
        };
        let hidden = info.hidden || (self.hide_literal_blocks && form == NameForm::Parenthesized);

        self.blocks.push(Block {
            title: info.title.unwrap_or_else(|| name.clone()),
            name,
            block_type,
            body: content.lines().map(str::to_string).collect(),
            reqs: info.reqs,
            call: info.call,
            stdout: info.stdout,
            headings: self.headings.iter().flatten().cloned().collect(),
            hidden,
            disabled: info.disabled,
            span,
        });
    }

    fn finalize(self) -> Result<Vec<Block>, Vec<ParseError>> {
        if self.errors.is_empty() {
            Ok(self.blocks)
        } else {
            Err(self.errors)
        }
    }
}

// ---------------------------------------------------------------------------
// Fence info strings
// ---------------------------------------------------------------------------

/// Parse `bash :name +req %(target <in >$out) >$var title="..." hidden`.
fn parse_fence_info(info: &str) -> Result<FenceInfo, String> {
    let mut parsed = FenceInfo::default();

    for (idx, token) in split_info(info)?.into_iter().enumerate() {
        if let Some(name) = token.strip_prefix(':') {
            if name.is_empty() {
                return Err("':' without a block name".into());
            }
            parsed.name = Some(name.to_string());
        } else if let Some(req) = token.strip_prefix('+') {
            if req.is_empty() {
                return Err("'+' without a block name".into());
            }
            if !parsed.reqs.iter().any(|r| r == req) {
                parsed.reqs.push(req.to_string());
            }
        } else if let Some(call) = token.strip_prefix('%') {
            parsed.call = Some(call.to_string());
        } else if let Some(target) = token.strip_prefix('>') {
            parsed.stdout = Some(Stream::parse(target).ok_or("'>' without a target")?);
        } else if let Some(title) = token.strip_prefix("title=") {
            parsed.title = Some(title.to_string());
        } else if token == "hidden" {
            parsed.hidden = true;
        } else if token == "disabled" {
            parsed.disabled = true;
        } else if idx == 0 {
            parsed.language = Some(token);
        }
    }

    Ok(parsed)
}

/// Split an info string on whitespace. Double quotes group words and are
/// dropped, except inside a parenthesized group where they are kept for the
/// call parser.
fn split_info(info: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut depth = 0usize;

    for ch in info.chars() {
        match ch {
            '"' => {
                in_quote = !in_quote;
                if depth > 0 {
                    current.push(ch);
                }
            }
            '(' if !in_quote => {
                depth += 1;
                current.push(ch);
            }
            ')' if !in_quote => {
                if depth == 0 {
                    return Err("unbalanced ')'".into());
                }
                depth -= 1;
                current.push(ch);
            }
            c if c.is_whitespace() && !in_quote && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if in_quote {
        return Err("unterminated quote".into());
    }
    if depth > 0 {
        return Err("unbalanced '('".into());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Strip leading/trailing whitespace and collapse interior whitespace.
fn normalize_heading(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collect all text content until a matching End tag.
fn collect_text_until(
    events: &[(Event<'_>, Range<usize>)],
    i: &mut usize,
    is_end: impl Fn(&TagEnd) -> bool,
) -> String {
    let mut text = String::new();
    while *i < events.len() {
        let (ref ev, _) = events[*i];
        match ev {
            Event::End(tag_end) if is_end(tag_end) => {
                *i += 1;
                break;
            }
            Event::Text(s) | Event::Code(s) => {
                text.push_str(s);
                *i += 1;
            }
            _ => {
                *i += 1;
            }
        }
    }
    text
}

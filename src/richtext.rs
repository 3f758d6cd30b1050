//! Markdown to portable rich-text blocks.
//!
//! Output follows the block/span layout the CMS stores:
//! `{_type: "block", _key, style, markDefs, children: [{_type: "span", _key, text, marks}]}`.

use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Paragraph style of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BlockStyle {
    Normal,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
}

impl From<HeadingLevel> for BlockStyle {
    fn from(level: HeadingLevel) -> Self {
        match level {
            HeadingLevel::H1 => BlockStyle::H1,
            HeadingLevel::H2 => BlockStyle::H2,
            HeadingLevel::H3 => BlockStyle::H3,
            HeadingLevel::H4 => BlockStyle::H4,
            HeadingLevel::H5 => BlockStyle::H5,
            HeadingLevel::H6 => BlockStyle::H6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Span {
    #[serde(rename = "_type")]
    pub kind: String,
    #[serde(rename = "_key")]
    pub key: String,
    pub text: String,
    pub marks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    #[serde(rename = "_type")]
    pub kind: String,
    #[serde(rename = "_key")]
    pub key: String,
    pub style: BlockStyle,
    #[serde(rename = "markDefs")]
    pub mark_defs: Vec<serde_json::Value>,
    pub children: Vec<Span>,
}

impl Block {
    fn new(index: usize, style: BlockStyle) -> Self {
        Self {
            kind: "block".to_string(),
            key: format!("b{}", index),
            style,
            mark_defs: Vec::new(),
            children: Vec::new(),
        }
    }

    fn push_text(&mut self, text: &str, marks: &[&'static str]) {
        if text.is_empty() {
            return;
        }
        // Merge with the previous span when the marks match
        if let Some(last) = self.children.last_mut() {
            if last.marks.iter().map(String::as_str).eq(marks.iter().copied()) {
                last.text.push_str(text);
                return;
            }
        }
        let key = format!("{}s{}", self.key, self.children.len());
        self.children.push(Span {
            kind: "span".to_string(),
            key,
            text: text.to_string(),
            marks: marks.iter().map(|m| (*m).to_string()).collect(),
        });
    }

    /// Concatenated span text
    pub fn plain_text(&self) -> String {
        self.children.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Convert markdown into blocks. Any prefix of a markdown document converts
/// to a valid (shorter) block list, which is what streaming relies on.
pub fn markdown_to_blocks(markdown: &str) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut current: Option<Block> = None;
    let mut marks: Vec<&'static str> = Vec::new();

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                flush(&mut blocks, &mut current);
                current = Some(Block::new(blocks.len(), level.into()));
            }
            Event::Start(Tag::Paragraph) => {
                // List items wrap paragraphs; keep one block per item
                if current.is_none() {
                    current = Some(Block::new(blocks.len(), BlockStyle::Normal));
                }
            }
            Event::Start(Tag::Item) => {
                flush(&mut blocks, &mut current);
                current = Some(Block::new(blocks.len(), BlockStyle::Normal));
            }
            Event::End(TagEnd::Heading(_) | TagEnd::Paragraph | TagEnd::Item) => {
                flush(&mut blocks, &mut current);
            }
            Event::Start(Tag::Strong) => marks.push("strong"),
            Event::Start(Tag::Emphasis) => marks.push("em"),
            Event::End(TagEnd::Strong | TagEnd::Emphasis) => {
                marks.pop();
            }
            Event::Text(text) => {
                let block =
                    current.get_or_insert_with(|| Block::new(blocks.len(), BlockStyle::Normal));
                block.push_text(&text, &marks);
            }
            Event::Code(code) => {
                let block =
                    current.get_or_insert_with(|| Block::new(blocks.len(), BlockStyle::Normal));
                let mut code_marks = marks.clone();
                code_marks.push("code");
                block.push_text(&code, &code_marks);
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some(block) = current.as_mut() {
                    block.push_text(" ", &marks);
                }
            }
            _ => {}
        }
    }
    flush(&mut blocks, &mut current);
    blocks
}

fn flush(blocks: &mut Vec<Block>, current: &mut Option<Block>) {
    if let Some(block) = current.take() {
        if block.children.iter().any(|s| !s.text.trim().is_empty()) {
            blocks.push(block);
        }
    }
}

/// Plain text of a block list, one block per line
pub fn blocks_to_plain_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(Block::plain_text)
        .collect::<Vec<_>>()
        .join("\n")
}

//! CSV import and export of topic lists

use anyhow::{Context, Result};
use std::collections::HashSet;

use super::Topic;

/// Column order written by [`serialize_topics`]
pub const TOPIC_HEADER: [&str; 4] = ["id", "title", "contentBrief", "visualBrief"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Id,
    Title,
    ContentBrief,
    VisualBrief,
}

/// Match a header cell against the accepted aliases, ignoring case,
/// spaces, dashes and underscores
fn classify_header(cell: &str) -> Option<Column> {
    let normalized: String = cell
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    match normalized.as_str() {
        "id" => Some(Column::Id),
        "title" => Some(Column::Title),
        "contentbrief" | "brief" => Some(Column::ContentBrief),
        "visualbrief" | "visualdescription" | "visual" => Some(Column::VisualBrief),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct ColumnMap {
    id: Option<usize>,
    title: Option<usize>,
    content_brief: Option<usize>,
    visual_brief: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &::csv::StringRecord) -> Self {
        let mut map = ColumnMap::default();
        for (idx, cell) in headers.iter().enumerate() {
            let slot = match classify_header(cell) {
                Some(Column::Id) => &mut map.id,
                Some(Column::Title) => &mut map.title,
                Some(Column::ContentBrief) => &mut map.content_brief,
                Some(Column::VisualBrief) => &mut map.visual_brief,
                None => continue,
            };
            // First matching column wins
            if slot.is_none() {
                *slot = Some(idx);
            }
        }
        map
    }
}

fn field(record: &::csv::StringRecord, idx: Option<usize>) -> String {
    idx.and_then(|i| record.get(i))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Parse a topic list from CSV text.
///
/// Never fails: unreadable input produces an empty list and a warning.
pub fn parse_topics(raw: &str) -> Vec<Topic> {
    match try_parse_topics(raw) {
        Ok(topics) => topics,
        Err(e) => {
            tracing::warn!(error = %e, "could not parse topic CSV; no topics loaded");
            Vec::new()
        }
    }
}

/// Parse a topic list, reporting why unreadable input was rejected
pub fn try_parse_topics(raw: &str) -> Result<Vec<Topic>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .trim(::csv::Trim::All)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let columns = ColumnMap::from_headers(reader.headers().context("missing header row")?);
    if columns.title.is_none() {
        anyhow::bail!("no title column in header");
    }

    let mut seen = HashSet::new();
    let mut topics = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("bad CSV record at row {}", row + 1))?;

        let title = field(&record, columns.title);
        if title.is_empty() {
            tracing::debug!(row = row + 1, "skipping topic row without title");
            continue;
        }

        let mut id = field(&record, columns.id);
        if id.is_empty() {
            id = format!("topic-{}", row + 1);
        }
        if !seen.insert(id.clone()) {
            tracing::warn!(%id, row = row + 1, "duplicate topic id; row skipped");
            continue;
        }

        topics.push(Topic {
            id,
            title,
            content_brief: field(&record, columns.content_brief),
            visual_brief: field(&record, columns.visual_brief),
        });
    }

    Ok(topics)
}

/// Write topics as CSV with the canonical header
pub fn serialize_topics(topics: &[Topic]) -> Result<String> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer.write_record(TOPIC_HEADER)?;
    for topic in topics {
        writer.write_record(topic.to_row())?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush CSV writer: {}", e))?;
    String::from_utf8(bytes).context("CSV output was not UTF-8")
}

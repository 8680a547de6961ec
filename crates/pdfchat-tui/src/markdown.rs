//! Terminal rendering for the markdown subset the backend uses in answers.
//!
//! Supported: paragraphs and line breaks, `#` headings, `**bold**`, `***both***`,
//! `*italic*`/`_italic_`, `` `code` ``, bullet and numbered lists, `>` quotes,
//! pipe tables and `[text](url)` links. Anything else is shown as-is.

use std::sync::LazyLock;

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use regex::Regex;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.*)$").expect("valid heading regex"));
static BULLET_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)[-*+]\s+(.*)$").expect("valid bullet regex"));
static ORDERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)(\d+)[.)]\s+(.*)$").expect("valid ordered item regex"));
static QUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^>\s?(.*)$").expect("valid quote regex"));
static TABLE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\|?\s*:?-+:?\s*(\|\s*:?-+:?\s*)*\|?$").expect("valid table separator regex")
});
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([^\]]+)\]\(([^)\s]+)\)").expect("valid link regex"));

/// Render a bot answer into styled terminal lines.
pub fn render(text: &str) -> Vec<Line<'static>> {
    let source: Vec<&str> = text.lines().collect();
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut i = 0;

    while i < source.len() {
        let line = source[i];

        // A table starts with a piped header row followed by a separator row
        if is_table_row(line)
            && source
                .get(i + 1)
                .is_some_and(|next| is_table_separator(next))
        {
            let mut rows = vec![split_row(line)];
            i += 2;
            while i < source.len() && is_table_row(source[i]) {
                rows.push(split_row(source[i]));
                i += 1;
            }
            lines.extend(render_table(&rows));
            continue;
        }

        if line.trim().is_empty() {
            // Collapse runs of blank lines into one paragraph break
            if lines.last().is_some_and(|l| l.width() > 0) {
                lines.push(Line::default());
            }
        } else {
            lines.push(render_line(line));
        }
        i += 1;
    }

    // Drop a trailing paragraph break
    if lines.last().is_some_and(|l| l.width() == 0) {
        lines.pop();
    }
    lines
}

fn render_line(line: &str) -> Line<'static> {
    if let Some(caps) = HEADING.captures(line) {
        let style = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
        return Line::from(parse_inline(&caps[2], style));
    }

    if let Some(caps) = BULLET_ITEM.captures(line) {
        let mut spans = vec![Span::raw(format!("{}• ", &caps[1]))];
        spans.extend(parse_inline(&caps[2], Style::default()));
        return Line::from(spans);
    }

    if let Some(caps) = ORDERED_ITEM.captures(line) {
        let mut spans = vec![Span::raw(format!("{}{}. ", &caps[1], &caps[2]))];
        spans.extend(parse_inline(&caps[3], Style::default()));
        return Line::from(spans);
    }

    if let Some(caps) = QUOTE.captures(line) {
        let mut spans = vec![Span::styled("│ ", Style::default().fg(Color::DarkGray))];
        spans.extend(parse_inline(
            &caps[1],
            Style::default().add_modifier(Modifier::ITALIC),
        ));
        return Line::from(spans);
    }

    Line::from(parse_inline(line, Style::default()))
}

fn is_table_row(line: &str) -> bool {
    line.contains('|')
}

/// A `|---|---|` row. A bare `---` is a rule, not a table.
fn is_table_separator(line: &str) -> bool {
    line.contains('|') && TABLE_SEPARATOR.is_match(line.trim())
}

fn split_row(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('|').unwrap_or(trimmed);
    trimmed.split('|').map(|cell| cell.trim().to_string()).collect()
}

fn render_table(rows: &[Vec<String>]) -> Vec<Line<'static>> {
    let header_style = Style::default().add_modifier(Modifier::BOLD);
    let border_style = Style::default().fg(Color::DarkGray);

    let cells: Vec<Vec<Vec<Span<'static>>>> = rows
        .iter()
        .enumerate()
        .map(|(r, row)| {
            let base = if r == 0 { header_style } else { Style::default() };
            row.iter().map(|cell| parse_inline(cell, base)).collect()
        })
        .collect();

    let columns = cells.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in &cells {
        for (c, cell) in row.iter().enumerate() {
            widths[c] = widths[c].max(spans_width(cell));
        }
    }

    let mut lines = Vec::with_capacity(cells.len() + 1);
    for (r, row) in cells.into_iter().enumerate() {
        let mut spans: Vec<Span<'static>> = Vec::new();
        let mut row = row.into_iter();
        for (c, width) in widths.iter().enumerate() {
            if c > 0 {
                spans.push(Span::styled(" │ ", border_style));
            }
            let cell = row.next().unwrap_or_default();
            let pad = width - spans_width(&cell);
            spans.extend(cell);
            if pad > 0 {
                spans.push(Span::raw(" ".repeat(pad)));
            }
        }
        lines.push(Line::from(spans));

        if r == 0 {
            let rule: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            lines.push(Line::from(Span::styled(rule.join("─┼─"), border_style)));
        }
    }
    lines
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(Span::width).sum()
}

/// Parse inline emphasis, code and links on one line of text
fn parse_inline(text: &str, base: Style) -> Vec<Span<'static>> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut plain = String::new();
    let mut rest = text;

    while let Some(pos) = rest.find(|c: char| matches!(c, '*' | '_' | '`' | '[')) {
        plain.push_str(&rest[..pos]);
        let offset = text.len() - rest.len() + pos;
        let prev = text[..offset].chars().next_back();
        let tail = &rest[pos..];

        match inline_token(tail, prev, base) {
            Some((token, consumed)) => {
                if !plain.is_empty() {
                    spans.push(Span::styled(std::mem::take(&mut plain), base));
                }
                spans.extend(token);
                rest = &tail[consumed..];
            }
            None => {
                // Marker chars are ASCII, so one byte
                plain.push_str(&tail[..1]);
                rest = &tail[1..];
            }
        }
    }

    plain.push_str(rest);
    if !plain.is_empty() {
        spans.push(Span::styled(plain, base));
    }
    spans
}

/// Try to read one inline token at the start of `tail`.
///
/// Returns the spans and the number of bytes consumed, or `None` when the
/// marker has no matching close and should be shown literally.
fn inline_token(
    tail: &str,
    prev: Option<char>,
    base: Style,
) -> Option<(Vec<Span<'static>>, usize)> {
    if let Some(inner) = tail.strip_prefix("***") {
        if let Some(end) = inner.find("***").filter(|&end| end > 0) {
            let spans = parse_inline(
                &inner[..end],
                base.add_modifier(Modifier::BOLD | Modifier::ITALIC),
            );
            return Some((spans, end + 6));
        }
    }

    if let Some(inner) = tail.strip_prefix("**") {
        let end = inner.find("**").filter(|&end| end > 0)?;
        let spans = parse_inline(&inner[..end], base.add_modifier(Modifier::BOLD));
        return Some((spans, end + 4));
    }

    if let Some(inner) = tail.strip_prefix('`') {
        let end = inner.find('`').filter(|&end| end > 0)?;
        let span = Span::styled(inner[..end].to_string(), base.fg(Color::Green));
        return Some((vec![span], end + 2));
    }

    if tail.starts_with('[') {
        let caps = LINK.captures(tail)?;
        let whole = caps.get(0)?;
        let spans = vec![
            Span::styled(
                caps[1].to_string(),
                base.fg(Color::Cyan).add_modifier(Modifier::UNDERLINED),
            ),
            Span::styled(format!(" ({})", &caps[2]), base.fg(Color::DarkGray)),
        ];
        return Some((spans, whole.end()));
    }

    let marker = tail.chars().next()?;
    // `_` inside a word (snake_case) is not emphasis
    if marker == '_' && prev.is_some_and(char::is_alphanumeric) {
        return None;
    }
    let inner = &tail[1..];
    if inner.starts_with(char::is_whitespace) {
        return None;
    }
    let end = inner.find(marker).filter(|&end| end > 0)?;
    let spans = parse_inline(&inner[..end], base.add_modifier(Modifier::ITALIC));
    Some((spans, end + 2))
}

use std::io::Write;

use anyhow::Result;
use prs::{ClassificationFailure, ClassifiedPullRequest, DisplayMode, QueryResult};

const COLUMN_SEPARATOR: &str = " ";
const TITLE_TRUNCATION_SUFFIX: char = '…';
const TABLE_HEADERS: &[&str] = &["OWNER", "TITLE", "URL", "REVIEWERS"];
const MIN_COLUMN_WIDTHS: &[usize] = &[20, 50, 10, 30];
const TITLE_COLUMN_INDEX: usize = 1;

fn pr_to_table_row(classified: &ClassifiedPullRequest) -> Vec<String> {
    vec![
        classified.pr.author.clone(),
        classified.pr.title.clone(),
        classified.pr.url.clone(),
        classified.approvers().join(", "),
    ]
}

/// Column widths start at their minimum and grow to fit the widest cell,
/// except the title column which stays fixed.
fn calculate_column_widths(rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths = MIN_COLUMN_WIDTHS.to_vec();

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i != TITLE_COLUMN_INDEX && i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    widths
}

fn truncate_title(title: &str, width: usize) -> String {
    if title.chars().count() <= width {
        return title.to_string();
    }
    let mut truncated: String = title.chars().take(width.saturating_sub(1)).collect();
    truncated.push(TITLE_TRUNCATION_SUFFIX);
    truncated
}

fn render_row<W: Write, S: AsRef<str>>(
    cells: &[S],
    widths: &[usize],
    writer: &mut W,
) -> Result<()> {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            write!(writer, "{COLUMN_SEPARATOR}")?;
        }
        write!(writer, "{:<width$}", cell.as_ref(), width = widths[i])?;
    }
    writeln!(writer)?;
    Ok(())
}

fn display_prs_table<W: Write>(result: &QueryResult, writer: &mut W) -> Result<()> {
    let mut rows: Vec<Vec<String>> = result
        .mine
        .iter()
        .chain(&result.needs_review)
        .map(pr_to_table_row)
        .collect();
    let widths = calculate_column_widths(&rows);

    for row in &mut rows {
        let title = &row[TITLE_COLUMN_INDEX];
        row[TITLE_COLUMN_INDEX] = truncate_title(title, widths[TITLE_COLUMN_INDEX]);
    }

    render_row(TABLE_HEADERS, &widths, writer)?;
    for row in &rows {
        render_row(row, &widths, writer)?;
    }
    Ok(())
}

fn display_prs_quiet<W: Write>(result: &QueryResult, writer: &mut W) -> Result<()> {
    for classified in result.mine.iter().chain(&result.needs_review) {
        writeln!(writer, "{}", classified.pr.url)?;
    }
    Ok(())
}

/// Prints the report: the user's PRs first, then those waiting on them.
pub fn display_report<W: Write>(
    result: &QueryResult,
    mode: DisplayMode,
    writer: &mut W,
) -> Result<()> {
    match mode {
        DisplayMode::Table => display_prs_table(result, writer),
        DisplayMode::Quiet => display_prs_quiet(result, writer),
    }
}

pub fn output_failures<W: Write>(
    failures: &[ClassificationFailure],
    writer: &mut W,
) -> Result<()> {
    for failure in failures {
        writeln!(writer, "Warning: Failed to classify {failure}")?;
    }
    Ok(())
}

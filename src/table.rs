//! Plain-text tables for terminal output.

use std::{borrow::Cow, fmt::Write as _};

const GAP: &str = "  ";
const ELLIPSIS: char = '…';

#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    max_width: Option<usize>,
}

impl TextTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            max_width: None,
        }
    }

    /// Cells wider than `width` characters are cut and end in an ellipsis.
    pub fn max_column_width(mut self, width: usize) -> Self {
        self.max_width = Some(width.max(2));
        self
    }

    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    pub fn render(&self) -> String {
        let header_cells = self.fit_row(&self.headers);
        let body: Vec<Vec<Cow<'_, str>>> = self.rows.iter().map(|row| self.fit_row(row)).collect();

        let mut widths: Vec<usize> = header_cells.iter().map(|cell| display_width(cell)).collect();
        for row in &body {
            for (idx, cell) in row.iter().enumerate().take(widths.len()) {
                widths[idx] = widths[idx].max(display_width(cell));
            }
        }

        let mut output = String::new();
        let _ = writeln!(output, "{}", join_padded(&header_cells, &widths));
        let rule: Vec<Cow<'_, str>> = widths
            .iter()
            .map(|width| Cow::Owned("-".repeat((*width).max(1))))
            .collect();
        let _ = writeln!(output, "{}", join_padded(&rule, &widths));
        for row in &body {
            let _ = writeln!(output, "{}", join_padded(row, &widths));
        }
        output
    }

    pub fn print(&self) {
        print!("{}", self.render());
    }

    fn fit_row<'s>(&self, cells: &'s [String]) -> Vec<Cow<'s, str>> {
        cells
            .iter()
            .map(|cell| {
                let flat = flatten(cell);
                match self.max_width {
                    Some(limit) if display_width(&flat) > limit => {
                        let mut cut: String = flat.chars().take(limit - 1).collect();
                        cut.push(ELLIPSIS);
                        Cow::Owned(cut)
                    }
                    _ => flat,
                }
            })
            .collect()
    }
}

fn join_padded(cells: &[Cow<'_, str>], widths: &[usize]) -> String {
    let mut line = String::new();
    for (idx, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if idx > 0 {
            line.push_str(GAP);
        }
        line.push_str(cell);
        let padding = width.saturating_sub(display_width(cell));
        line.extend(std::iter::repeat_n(' ', padding));
    }
    line.truncate(line.trim_end().len());
    line
}

// ANSI colour sequences take no room on screen.
fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn flatten(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

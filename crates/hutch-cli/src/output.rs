//! Plain-text table rendering for CLI listings.

/// Renders rows under `headers` as left-aligned columns.
///
/// Each column is as wide as its longest cell; columns are separated by
/// two spaces and trailing whitespace is trimmed from every line.
#[must_use]
pub fn render_table<S: AsRef<str>>(headers: &[&str], rows: &[Vec<S>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.as_ref().chars().count());
        }
    }

    let mut out = line(headers.iter().copied(), &widths);
    for row in rows {
        out.push_str(&line(row.iter().map(|cell| cell.as_ref()), &widths));
    }
    out
}

fn line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded = cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    format!("{}\n", padded.trim_end())
}

//! Target patterns for the shape and herd strategies.
//!
//! Pattern files use the lab's 1-based `row,col` notation, one cell per
//! line; `#` starts a comment. Coordinates are converted to 0-based here.

use std::path::Path;

use anyhow::Context;

/// The default shape: the lab's 11-cell "M" on the 4×8 bed (0-based).
pub const DEFAULT_PATTERN: &[(usize, usize)] = &[
    (0, 2),
    (0, 4),
    (1, 2),
    (1, 3),
    (1, 4),
    (1, 5),
    (2, 1),
    (2, 3),
    (2, 5),
    (3, 1),
    (3, 6),
];

pub fn load(path: &Path) -> anyhow::Result<Vec<(usize, usize)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("could not read pattern file {}", path.display()))?;
    parse(&text).with_context(|| format!("bad pattern file {}", path.display()))
}

pub fn parse(text: &str) -> anyhow::Result<Vec<(usize, usize)>> {
    let mut cells = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.split_once('#').map_or(line, |(head, _)| head).trim();
        if line.is_empty() {
            continue;
        }
        let (row, col) = line
            .split_once(',')
            .with_context(|| format!("line {}: expected \"row,col\"", lineno + 1))?;
        let row: usize = row.trim().parse().with_context(|| format!("line {}", lineno + 1))?;
        let col: usize = col.trim().parse().with_context(|| format!("line {}", lineno + 1))?;
        if row == 0 || col == 0 {
            anyhow::bail!("line {}: coordinates are 1-based", lineno + 1);
        }
        cells.push((row - 1, col - 1));
    }
    Ok(cells)
}

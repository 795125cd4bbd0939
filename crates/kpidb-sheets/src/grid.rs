//! Raw cell grid parsing.

/// One non-empty line of a sheet export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRow {
    /// 1-based physical line in the source text where the record starts.
    pub line: usize,
    pub cells: Vec<String>,
}

impl GridRow {
    #[must_use]
    pub fn has_values(&self) -> bool {
        self.cells.iter().any(|c| !c.trim().is_empty())
    }
}

/// Parse CSV bytes into rows of trimmed cells.
///
/// Rows may have different lengths; no row is treated as a header here. The
/// reader drops empty lines, so each row keeps the physical line it starts on.
///
/// # Errors
///
/// Returns [`csv::Error`] on malformed quoting or invalid UTF-8.
pub fn read_grid(data: &[u8]) -> Result<Vec<GridRow>, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let mut grid = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record
            .position()
            .map_or(grid.len() + 1, |pos| physical_line(data, pos));
        grid.push(GridRow {
            line,
            cells: record.iter().map(str::to_string).collect(),
        });
    }
    Ok(grid)
}

/// A record's position points at the blank lines the reader skipped before
/// it; step over them to the line the record's text is on.
fn physical_line(data: &[u8], pos: &csv::Position) -> usize {
    let start = usize::try_from(pos.byte()).map_or(data.len(), |b| b.min(data.len()));
    let skipped = data[start..]
        .iter()
        .take_while(|&&b| matches!(b, b'\r' | b'\n'))
        .filter(|&&b| b == b'\n')
        .count();
    usize::try_from(pos.line())
        .unwrap_or(usize::MAX)
        .saturating_add(skipped)
}

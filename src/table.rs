use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::domain::PbError;

pub type Record = HashMap<String, String>;

/// A loaded contact file: display-ordered unique column names plus one
/// trimmed string value per column per record.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Table {
    pub fn empty() -> Self {
        Table {
            columns: Vec::new(),
            records: Vec::new(),
        }
    }
}

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";
const SNIFF_SAMPLE_BYTES: usize = 4096;
const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

const PHONE_NAME_KEYWORDS: [&str; 13] = [
    "phone",
    "mobile",
    "tel",
    "telephone",
    "contact",
    "cell",
    "number",
    "no.",
    "ফোন",
    "মোবাইল",
    "যোগাযোগ",
    "নম্বর",
    "নং",
];
const PHONE_SAMPLE_ROWS: usize = 250;
const PHONE_SCORE_THRESHOLD: f64 = 0.35;

// ------------------------------ Reader --------------------------------- //

/// Load a contact file, dispatching on the extension. Anything that does not
/// look like a spreadsheet goes through the delimited text reader.
pub fn read_table(path: &Path, sheet: Option<&str>) -> Result<Table, PbError> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => PbError::FileNotFound(path.to_path_buf()),
        ErrorKind::PermissionDenied => PbError::PermissionDenied(path.to_path_buf()),
        _ => PbError::IoError(e),
    })?;
    if !metadata.is_file() {
        return Err(PbError::FileNotFound(path.to_path_buf()));
    }

    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());
    match ext.as_deref() {
        Some("xlsx") | Some("xlsm") | Some("xltx") | Some("xltm") => read_xlsx(path, sheet),
        _ => read_csv(path),
    }
}

pub fn read_csv(path: &Path) -> Result<Table, PbError> {
    let data = fs::read(path)?;
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(&data);
    let sample = &data[..data.len().min(SNIFF_SAMPLE_BYTES)];
    let delimiter = sniff_delimiter(sample);
    debug!(
        "Loading {} with delimiter {:?}",
        path.display(),
        delimiter as char
    );
    parse_delimited(data, delimiter)
}

/// Pick the most frequent candidate delimiter in the sample, comma on a tie
/// or when none occurs. Quoted fields are not excluded from the count, which
/// is good enough for contact lists.
pub fn sniff_delimiter(sample: &[u8]) -> u8 {
    let mut best = b',';
    let mut best_count = 0;
    for cand in DELIMITER_CANDIDATES {
        let count = sample.iter().filter(|&&b| b == cand).count();
        if count > best_count {
            best = cand;
            best_count = count;
        }
    }
    best
}

fn parse_delimited(data: &[u8], delimiter: u8) -> Result<Table, PbError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(data);

    let raw_headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if raw_headers.is_empty() {
        return Err(PbError::NoHeader);
    }
    let columns = dedup_headers(&raw_headers);

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = Record::new();
        for (idx, name) in columns.iter().enumerate() {
            let value = row.get(idx).unwrap_or("").trim().to_string();
            record.insert(name.clone(), value);
        }
        if is_row_empty(&record) {
            continue;
        }
        records.push(record);
    }

    info!("Parsed {} records, {} columns", records.len(), columns.len());
    Ok(Table { columns, records })
}

#[cfg(feature = "xlsx")]
pub fn read_xlsx(path: &Path, sheet: Option<&str>) -> Result<Table, PbError> {
    use calamine::{Data, Reader, Xlsx, open_workbook};

    let mut workbook: Xlsx<_> = open_workbook(path)?;
    // Cell values come back with formulas resolved to their cached results.
    let range = match sheet {
        Some(name) => workbook.worksheet_range(name)?,
        None => workbook
            .worksheet_range_at(0)
            .ok_or(PbError::EmptySheet)??,
    };

    fn cell_text(cell: &Data) -> String {
        match cell {
            Data::Empty => String::new(),
            Data::String(s) => s.trim().to_string(),
            other => other.to_string().trim().to_string(),
        }
    }

    let cells: Vec<Vec<String>> = (0..range.height())
        .map(|r| {
            (0..range.width())
                .map(|c| range.get((r, c)).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();
    parse_sheet(cells)
}

/// Parse a sheet already flattened to trimmed cell text, row by row.
#[cfg(feature = "xlsx")]
fn parse_sheet(cells: Vec<Vec<String>>) -> Result<Table, PbError> {
    let width = cells.iter().map(Vec::len).max().unwrap_or(0);

    // Some exports wrap a whole CSV file into the first column of a sheet,
    // one line per cell. Detect that and hand the lines to the CSV parser.
    let embedded_csv = width == 1
        && cells
            .first()
            .and_then(|row| row.first())
            .is_some_and(|text| text.contains([',', ';', '\t', '|']));
    if embedded_csv {
        debug!("Sheet holds embedded CSV text, re-parsing as delimited");
        let lines: Vec<&str> = cells
            .iter()
            .filter_map(|row| row.first())
            .map(String::as_str)
            .filter(|text| !text.is_empty())
            .collect();
        if lines.is_empty() {
            return Err(PbError::EmptySheet);
        }
        let sample = lines.iter().take(30).copied().collect::<Vec<_>>().join("\n");
        let delimiter = sniff_delimiter(sample.as_bytes());
        return parse_delimited(lines.join("\n").as_bytes(), delimiter);
    }

    // The header is the first row within the first 20 that has any content.
    let header_row = cells
        .iter()
        .take(20)
        .position(|row| row.iter().any(|text| !text.is_empty()))
        .ok_or(PbError::EmptySheet)?;

    let raw_headers: Vec<String> = (0..width)
        .map(|c| cells[header_row].get(c).cloned().unwrap_or_default())
        .collect();
    if raw_headers.iter().all(|h| h.is_empty()) {
        return Err(PbError::EmptyHeader);
    }
    let columns = dedup_headers(&raw_headers);

    let mut records = Vec::new();
    for row in cells.iter().skip(header_row + 1) {
        let mut record = Record::new();
        for (c, name) in columns.iter().enumerate() {
            let value = row.get(c).cloned().unwrap_or_default();
            record.insert(name.clone(), value);
        }
        if is_row_empty(&record) {
            continue;
        }
        records.push(record);
    }

    info!("Parsed {} records, {} columns", records.len(), columns.len());
    Ok(Table { columns, records })
}

#[cfg(not(feature = "xlsx"))]
pub fn read_xlsx(_path: &Path, _sheet: Option<&str>) -> Result<Table, PbError> {
    Err(PbError::MissingCapability("spreadsheet"))
}

// ---------------------------- Normalizer ------------------------------- //

/// First occurrence keeps its (trimmed) name, repeats get " (n)" appended
/// with n starting at 2. Empty headers become "Column".
pub fn dedup_headers(raw: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(raw.len());
    for header in raw {
        let base = match header.trim() {
            "" => "Column",
            trimmed => trimmed,
        };
        let count = seen.entry(base.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            out.push(base.to_string());
        } else {
            out.push(format!("{} ({})", base, count));
        }
    }
    out
}

fn is_row_empty(record: &Record) -> bool {
    record.values().all(|value| value.trim().is_empty())
}

// ---------------------------- Heuristics ------------------------------- //

/// A value looks like a phone number if it carries no "@" and between 7 and
/// 15 digits (local numbers up to full E.164).
pub fn is_phone_like(value: &str) -> bool {
    let text = value.trim();
    if text.is_empty() || text.contains('@') {
        return false;
    }
    let digits = text.chars().filter(|c| c.is_numeric()).count();
    (7..=15).contains(&digits)
}

/// Guess which column holds phone numbers. Column names win over content:
/// the first name containing a known keyword is taken as-is. Only when no
/// name matches are record values sampled and scored.
pub fn guess_phone_column(columns: &[String], records: Option<&[Record]>) -> Option<String> {
    for col in columns {
        let key = col.trim().to_lowercase();
        if PHONE_NAME_KEYWORDS.iter().any(|kw| key.contains(kw)) {
            return Some(col.clone());
        }
    }

    let records = records?;
    let mut best: Option<(&String, f64)> = None;
    for col in columns {
        let mut checked = 0usize;
        let mut phone_like = 0usize;
        for record in records.iter().take(PHONE_SAMPLE_ROWS) {
            let value = record.get(col).map(|v| v.trim()).unwrap_or("");
            if value.is_empty() {
                continue;
            }
            checked += 1;
            if is_phone_like(value) {
                phone_like += 1;
            }
        }
        if checked == 0 {
            continue;
        }
        let score = phone_like as f64 / checked as f64;
        // Strictly greater, so the first column keeps ties.
        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((col, score));
        }
    }

    best.and_then(|(col, score)| (score >= PHONE_SCORE_THRESHOLD).then(|| col.clone()))
}

// ------------------------------ Filter --------------------------------- //

#[derive(Debug, Clone, PartialEq, Default)]
pub enum FilterScope {
    #[default]
    AllColumns,
    Column(String),
}

/// Case-insensitive substring filter, returning matching row indices in
/// their original order. A blank query matches everything.
pub fn filter_rows(table: &Table, query: &str, scope: &FilterScope) -> Vec<usize> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return (0..table.records.len()).collect();
    }

    // A column scope that no longer matches the loaded columns (stale UI
    // selection) falls back to matching across all columns.
    let column = match scope {
        FilterScope::Column(name) if table.columns.contains(name) => Some(name),
        _ => None,
    };

    let mut rows = Vec::new();
    for (idx, record) in table.records.iter().enumerate() {
        let matched = match column {
            Some(name) => record
                .get(name)
                .is_some_and(|value| value.to_lowercase().contains(&query)),
            None => {
                let haystack = table
                    .columns
                    .iter()
                    .map(|c| record.get(c).map(String::as_str).unwrap_or(""))
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase();
                haystack.contains(&query)
            }
        };
        if matched {
            rows.push(idx);
        }
    }
    rows
}

// ------------------------------ Sorter --------------------------------- //

/// Values with 6 or more digits sort first, ordered by their digit string
/// compared as text (phone numbers keep leading zeros meaningful that way).
/// Everything else sorts after, case-folded.
fn sort_key(value: &str) -> (u8, String) {
    let trimmed = value.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_numeric()).collect();
    if digits.chars().count() >= 6 {
        (0, digits)
    } else {
        (1, trimmed.to_lowercase())
    }
}

/// Stable sort of the given row indices by one column. Descending reverses
/// the comparison, not the result, so equal keys keep their input order.
pub fn sort_rows(table: &Table, rows: &[usize], column: &str, descending: bool) -> Vec<usize> {
    let mut keyed: Vec<((u8, String), usize)> = rows
        .iter()
        .map(|&idx| {
            let value = table.records[idx]
                .get(column)
                .map(String::as_str)
                .unwrap_or("");
            (sort_key(value), idx)
        })
        .collect();

    if descending {
        keyed.sort_by(|(a, _), (b, _)| b.cmp(a));
    } else {
        keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
    }

    keyed.into_iter().map(|(_, idx)| idx).collect()
}

// ----------------------------- Exporter -------------------------------- //

/// Write the given rows as comma-separated CSV with a UTF-8 BOM, which keeps
/// common spreadsheet tools from mangling non-ASCII names. Returns the
/// number of exported records.
pub fn export_csv(path: &Path, table: &Table, rows: &[usize]) -> Result<usize, PbError> {
    let mut file = File::create(path)?;
    file.write_all(UTF8_BOM)?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(&table.columns)?;
    for &idx in rows {
        let record = &table.records[idx];
        writer.write_record(
            table
                .columns
                .iter()
                .map(|c| record.get(c).map(String::as_str).unwrap_or("")),
        )?;
    }
    writer.flush()?;

    info!("Exported {} records to {}", rows.len(), path.display());
    Ok(rows.len())
}

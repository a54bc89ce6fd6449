use std::fmt;
use std::io::Error;
use std::path::PathBuf;

use ratatui::crossterm::event::KeyEvent;

#[derive(Debug)]
pub enum PbError {
    IoError(Error),
    CsvError(csv::Error),
    #[cfg(feature = "xlsx")]
    XlsxError(calamine::XlsxError),
    FileNotFound(PathBuf),
    PermissionDenied(PathBuf),
    NoHeader,
    #[cfg(feature = "xlsx")]
    EmptySheet,
    #[cfg(feature = "xlsx")]
    EmptyHeader,
    #[cfg(not(feature = "xlsx"))]
    MissingCapability(&'static str),
}

impl fmt::Display for PbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PbError::IoError(e) => write!(f, "{e}"),
            PbError::CsvError(e) => write!(f, "{e}"),
            #[cfg(feature = "xlsx")]
            PbError::XlsxError(e) => write!(f, "{e}"),
            PbError::FileNotFound(path) => write!(f, "file not found: {}", path.display()),
            PbError::PermissionDenied(path) => write!(f, "permission denied: {}", path.display()),
            PbError::NoHeader => write!(f, "the file has no header row"),
            #[cfg(feature = "xlsx")]
            PbError::EmptySheet => write!(f, "the spreadsheet is empty"),
            #[cfg(feature = "xlsx")]
            PbError::EmptyHeader => write!(f, "the spreadsheet header row is empty"),
            #[cfg(not(feature = "xlsx"))]
            PbError::MissingCapability(cap) => {
                write!(f, "this build has no {cap} support (enable the 'xlsx' feature)")
            }
        }
    }
}

impl std::error::Error for PbError {}

impl From<Error> for PbError {
    fn from(err: Error) -> Self {
        PbError::IoError(err)
    }
}

impl From<csv::Error> for PbError {
    fn from(err: csv::Error) -> Self {
        PbError::CsvError(err)
    }
}

#[cfg(feature = "xlsx")]
impl From<calamine::XlsxError> for PbError {
    fn from(err: calamine::XlsxError) -> Self {
        PbError::XlsxError(err)
    }
}

#[derive(Debug, Clone)]
pub struct PbConfig {
    /// Crossterm event poll timeout in ms. Also bounds how late a pending
    /// filter recomputation can fire.
    pub event_poll_time: u64,
    /// Idle gap after the last keystroke before the filter is recomputed.
    pub filter_debounce_ms: u64,
    pub max_column_width: usize,
}

impl Default for PbConfig {
    fn default() -> Self {
        PbConfig {
            event_poll_time: 50,
            filter_debounce_ms: 160,
            max_column_width: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterMode {
    AllColumns,
    CurrentColumn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    MoveToFirstColumn,
    MoveToLastColumn,
    FilterAllColumns,
    FilterCurrentColumn,
    ClearFilters,
    ToggleSort,
    CopyPhone,
    CopyRow,
    CopyCell,
    Export,
    Reload,
    Help,
    Exit,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

pub const HELP_TEXT: &str = "\
 pbook - staff phone book viewer

 arrows / hjkl   move the selection
 PgUp / PgDn     move one page up / down
 g / G           jump to the first / last record
 Home / End      jump to the first / last column
 /               filter across all columns
 f               filter in the current column
 c               clear filters
 s               sort by the current column (press again to flip direction)
 p               copy the phone number of the selected record
 y / Y           copy the current cell / the whole row (tab separated)
 e               export the filtered view as CSV
 R               reload the current file
 ?               toggle this help
 q               quit
";

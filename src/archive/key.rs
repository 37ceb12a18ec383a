use crate::types::indicativo::Indicativo;
use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::path::{Path, PathBuf};

pub const STATIONS_DIR: &str = "estaciones";
pub const RECORDS_DIR: &str = "valores-climatologicos";
pub const ENTRY_EXTENSION: &str = "json";

/// Identifies one archive entry: a station, or a station's values on one day.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArchiveKey {
    Station(Indicativo),
    Record { date: NaiveDate, station: Indicativo },
}

impl ArchiveKey {
    /// Path of the entry relative to the archive root:
    /// `estaciones/<code>.json` or `valores-climatologicos/YYYY/MM/DD/<code>.json`.
    pub fn relative_path(&self) -> PathBuf {
        match self {
            ArchiveKey::Station(code) => Path::new(STATIONS_DIR).join(entry_file_name(code)),
            ArchiveKey::Record { date, station } => {
                day_dir(date).join(entry_file_name(station))
            }
        }
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveKey::Station(code) => write!(f, "station {code}"),
            ArchiveKey::Record { date, station } => write!(f, "station {station} on {date}"),
        }
    }
}

/// `valores-climatologicos/YYYY/MM/DD`, relative to the archive root.
pub(crate) fn day_dir(date: &NaiveDate) -> PathBuf {
    Path::new(RECORDS_DIR)
        .join(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
        .join(format!("{:02}", date.day()))
}

pub(crate) fn entry_file_name(code: &Indicativo) -> String {
    format!("{code}.{ENTRY_EXTENSION}")
}

//! CSV Import
//!
//! Imports listening history exported from other scrobbling services.
//! Columns are detected from the header row (`artist`, `album`,
//! `title`/`track`/`name`, `date`/`time`/`timestamp`/`uts`), and timestamps
//! may be Unix seconds, last.fm export dates (`14 May 2020 18:03`) or
//! RFC 3339.

use crate::store::{Album, Scrobble, Track};
use chrono::{DateTime, NaiveDateTime};
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Origin recorded on imported scrobbles
pub const IMPORT_ORIGIN: &str = "import:csv";

const MAX_REPORTED_ERRORS: usize = 100;

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%d %b %Y %H:%M",
    "%d %b %Y, %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Errors that abort an import as a whole
///
/// Bad rows do not; they are counted in [`CsvImportResult`].
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),
}

pub type ImportResult<T> = Result<T, ImportError>;

/// Column positions, 0-indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub artist: usize,
    pub title: usize,
    pub album: Option<usize>,
    pub time: usize,
}

impl Default for ColumnMap {
    /// `artist,album,title,date`, the layout of common last.fm exporters
    fn default() -> Self {
        Self {
            artist: 0,
            album: Some(1),
            title: 2,
            time: 3,
        }
    }
}

impl ColumnMap {
    /// Detect the columns from a header row
    pub fn detect(headers: &csv::StringRecord) -> ImportResult<Self> {
        let mut artist = None;
        let mut title = None;
        let mut album = None;
        let mut time = None;

        for (idx, header) in headers.iter().enumerate() {
            let header = header.trim().to_lowercase();
            // First match wins, so `artist_mbid` after `artist` is ignored
            match header.as_str() {
                "artist" | "artist_name" | "artists" if artist.is_none() => artist = Some(idx),
                "title" | "track" | "track_name" | "name" if title.is_none() => title = Some(idx),
                "album" | "album_name" if album.is_none() => album = Some(idx),
                "uts" | "timestamp" | "date" | "time" | "utc_time" | "played_at"
                    if time.is_none() =>
                {
                    time = Some(idx)
                }
                _ => {}
            }
        }

        Ok(Self {
            artist: artist.ok_or_else(|| ImportError::MissingColumn("artist".to_string()))?,
            title: title.ok_or_else(|| ImportError::MissingColumn("title".to_string()))?,
            album,
            time: time.ok_or_else(|| ImportError::MissingColumn("timestamp".to_string()))?,
        })
    }
}

/// CSV scrobble importer
pub struct CsvImporter {
    columns: Option<ColumnMap>,
    has_header: bool,
    /// Splits one artist field into several artists
    artist_separator: Option<String>,
}

/// Result of a CSV import
#[derive(Debug, Default)]
pub struct CsvImportResult {
    /// Parsed scrobbles, in file order
    pub scrobbles: Vec<Scrobble>,
    pub rows_processed: usize,
    pub rows_failed: usize,
    pub errors: Vec<String>,
}

impl Default for CsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvImporter {
    /// Importer that detects columns from the header row
    pub fn new() -> Self {
        Self {
            columns: None,
            has_header: true,
            artist_separator: None,
        }
    }

    /// Use fixed columns instead of detecting them
    pub fn with_columns(mut self, columns: ColumnMap) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Set whether the CSV has a header row
    ///
    /// Without one, columns default to [`ColumnMap::default`] unless set.
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_artist_separator(mut self, separator: &str) -> Self {
        self.artist_separator = Some(separator.to_string());
        self
    }

    /// Import scrobbles from a CSV file
    pub fn import(&self, path: &Path) -> ImportResult<CsvImportResult> {
        let reader = self.reader_builder().from_path(path)?;
        let result = self.read_records(reader)?;
        info!(
            path = %path.display(),
            rows = result.rows_processed,
            failed = result.rows_failed,
            "CSV import parsed"
        );
        Ok(result)
    }

    /// Import from a CSV string
    pub fn import_str(&self, csv_data: &str) -> ImportResult<CsvImportResult> {
        let reader = self.reader_builder().from_reader(csv_data.as_bytes());
        self.read_records(reader)
    }

    fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder.has_headers(self.has_header).flexible(true);
        builder
    }

    fn read_records<R: io::Read>(&self, mut reader: csv::Reader<R>) -> ImportResult<CsvImportResult> {
        let columns = match (&self.columns, self.has_header) {
            (Some(columns), _) => columns.clone(),
            (None, true) => ColumnMap::detect(reader.headers()?)?,
            (None, false) => ColumnMap::default(),
        };
        debug!(?columns, "CSV columns");

        let mut result = CsvImportResult::default();
        let first_line = if self.has_header { 2 } else { 1 };

        for (offset, record) in reader.records().enumerate() {
            let line = first_line + offset;
            let parsed = record
                .map_err(|e| e.to_string())
                .and_then(|record| self.parse_record(&record, &columns));

            match parsed {
                Ok(scrobble) => {
                    result.scrobbles.push(scrobble);
                    result.rows_processed += 1;
                }
                Err(e) => {
                    result.errors.push(format!("Line {}: {}", line, e));
                    result.rows_failed += 1;
                }
            }
        }

        if result.errors.len() > MAX_REPORTED_ERRORS {
            let total = result.errors.len();
            result.errors.truncate(MAX_REPORTED_ERRORS);
            result
                .errors
                .push(format!("... and {} more errors", total - MAX_REPORTED_ERRORS));
        }

        Ok(result)
    }

    fn parse_record(&self, record: &csv::StringRecord, columns: &ColumnMap) -> Result<Scrobble, String> {
        let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");

        let artists = self.split_artists(field(columns.artist));
        if artists.is_empty() {
            return Err("missing artist".to_string());
        }
        let title = field(columns.title);
        if title.is_empty() {
            return Err("missing title".to_string());
        }
        let time = parse_timestamp(field(columns.time)).map_err(|e| e.to_string())?;

        let mut track = Track::new(title, artists.iter().cloned());
        if let Some(album) = columns.album.map(field).filter(|a| !a.is_empty()) {
            track = track.album(Album::new(album, artists));
        }

        Ok(Scrobble::at(time, track).origin(IMPORT_ORIGIN))
    }

    fn split_artists(&self, field: &str) -> Vec<String> {
        let parts: Vec<&str> = match &self.artist_separator {
            Some(separator) => field.split(separator.as_str()).collect(),
            None => vec![field],
        };
        parts
            .into_iter()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Parse a timestamp field into Unix seconds
pub fn parse_timestamp(value: &str) -> ImportResult<i64> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<i64>() {
        return Ok(seconds);
    }

    for format in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt.and_utc().timestamp());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp());
    }

    Err(ImportError::Parse(format!("Could not parse timestamp: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_lastfm_export_import() {
        let csv_data = "uts,utc_time,artist,artist_mbid,album,album_mbid,track,track_mbid
1589479380,\"14 May 2020, 18:03\",Queen,,Innuendo,,The Show Must Go On,
1589479680,\"14 May 2020, 18:08\",David Bowie,,,,Heroes,";

        let result = CsvImporter::new().import_str(csv_data).unwrap();

        assert_eq!(result.rows_processed, 2);
        assert_eq!(result.rows_failed, 0);

        let first = &result.scrobbles[0];
        assert_eq!(first.time, 1_589_479_380);
        assert_eq!(first.track.title, "The Show Must Go On");
        assert_eq!(first.track.artists, vec!["Queen"]);
        assert_eq!(first.track.album.as_ref().unwrap().name, "Innuendo");
        assert_eq!(first.origin, IMPORT_ORIGIN);

        assert!(result.scrobbles[1].track.album.is_none());
    }

    #[test]
    fn test_headerless_import_uses_default_layout() {
        let csv_data = "Queen,Innuendo,Innuendo,14 May 2020 18:03";

        let result = CsvImporter::new().with_header(false).import_str(csv_data).unwrap();

        assert_eq!(result.rows_processed, 1);
        assert_eq!(result.scrobbles[0].time, 1_589_479_380);
    }

    #[test]
    fn test_bad_rows_are_counted() {
        let csv_data = "artist,title,date
Queen,Innuendo,2020-05-14T18:03:00Z
,No Artist,2020-05-14T18:03:00Z
Queen,,2020-05-14T18:03:00Z
Queen,Innuendo,sometime";

        let result = CsvImporter::new().import_str(csv_data).unwrap();

        assert_eq!(result.rows_processed, 1);
        assert_eq!(result.rows_failed, 3);
        assert!(result.errors[0].starts_with("Line 3:"));
        assert!(result.errors[2].contains("sometime"));
    }

    #[test]
    fn test_missing_column() {
        let err = CsvImporter::new().import_str("artist,album\nQueen,Innuendo").unwrap_err();
        assert!(matches!(err, ImportError::MissingColumn(ref c) if c == "title"));
    }

    #[test]
    fn test_artist_separator() {
        let csv_data = "artist,title,timestamp\nQueen; David Bowie,Under Pressure,0";

        let result = CsvImporter::new()
            .with_artist_separator(";")
            .import_str(csv_data)
            .unwrap();

        assert_eq!(result.scrobbles[0].track.artists, vec!["Queen", "David Bowie"]);
    }

    #[test]
    fn test_import_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "artist,track,uts").unwrap();
        writeln!(file, "Queen,Innuendo,100").unwrap();

        let result = CsvImporter::new().import(file.path()).unwrap();
        assert_eq!(result.scrobbles.len(), 1);
        assert_eq!(result.scrobbles[0].time, 100);
    }

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(parse_timestamp("86400").unwrap(), 86_400);
        assert_eq!(parse_timestamp("02 Jan 1970 00:00").unwrap(), 86_400);
        assert_eq!(parse_timestamp("1970-01-02 00:00:00").unwrap(), 86_400);
        assert_eq!(parse_timestamp("1970-01-02T01:00:00+01:00").unwrap(), 86_400);
        assert!(parse_timestamp("yesterday").is_err());
    }
}

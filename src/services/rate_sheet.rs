//! Courier rate sheet parser.
//!
//! Sheets have a fixed layout: four title/header rows, then one row per
//! destination. Columns A-C hold province, city and district; from column D
//! every service type takes two columns (rate, SLA) in [`ServiceType::ALL`]
//! order.

use std::fmt::Display;
use std::io::Cursor;

use calamine::{Reader, Xls, Xlsx};
use csv::{ByteRecord, ReaderBuilder};

use crate::models::job::SheetFormat;
use crate::models::rate::{Destination, RateUpsert, ServiceType};
use crate::services::validation::{validate_destination, validate_rate, validate_sla};

/// Title and header rows preceding the data.
pub const HEADER_ROWS: usize = 4;
pub const DESTINATION_COLUMNS: usize = 3;
/// Destination columns plus a (rate, SLA) pair per service type.
pub const REQUIRED_COLUMNS: usize = DESTINATION_COLUMNS + ServiceType::ALL.len() * 2;

/// Structural failures. Any of these fails the whole import.
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("Excel parse failed: {0}")]
    Excel(String),

    #[error("CSV parse failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Workbook has no worksheets")]
    NoWorksheet,

    #[error(
        "Rate sheet has {found} columns, expected {expected} \
         (province, city, district, then rate and SLA for each of {services})"
    )]
    InsufficientColumns {
        found: usize,
        expected: usize,
        services: String,
    },
}

/// A rate ready to be upserted for the importing courier.
#[derive(Debug, Clone, PartialEq)]
pub struct RateCandidate {
    pub destination: Destination,
    pub service_type: ServiceType,
    pub rate: Option<f64>,
    pub sla: Option<String>,
}

impl RateCandidate {
    pub fn into_upsert(self, courier_id: i64) -> RateUpsert {
        RateUpsert {
            courier_id,
            destination: self.destination,
            service_type: self.service_type,
            rate: self.rate,
            sla: self.sla,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Record(RateCandidate),
    /// Destination incomplete, typically a blank trailing row.
    SkippedRow { row: usize },
    RejectedGroup {
        row: usize,
        service_type: ServiceType,
        reason: String,
    },
}

/// Outcomes for one data row. `row` is the 1-based sheet row number.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub row: usize,
    pub outcomes: Vec<RowOutcome>,
}

/// Forward-only sequence of parsed data rows. Rows are validated as they
/// are pulled; the total is known up front for progress reporting.
#[derive(Debug)]
pub struct RateMatrix {
    rows: std::vec::IntoIter<Vec<String>>,
    next_row: usize,
    total_rows: usize,
}

impl RateMatrix {
    /// Open an uploaded sheet.
    pub fn open(format: SheetFormat, bytes: Vec<u8>) -> Result<Self, SheetError> {
        let rows = match format {
            SheetFormat::Xlsx => {
                let workbook: Xlsx<_> =
                    Xlsx::new(Cursor::new(bytes)).map_err(|e| SheetError::Excel(e.to_string()))?;
                read_first_sheet(workbook)?
            }
            SheetFormat::Xls => {
                let workbook: Xls<_> =
                    Xls::new(Cursor::new(bytes)).map_err(|e| SheetError::Excel(e.to_string()))?;
                read_first_sheet(workbook)?
            }
            SheetFormat::Csv => read_delimited(&bytes)?,
        };

        Self::from_rows(rows)
    }

    /// Build from raw cell text, header rows included.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Result<Self, SheetError> {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if width < REQUIRED_COLUMNS {
            return Err(SheetError::InsufficientColumns {
                found: width,
                expected: REQUIRED_COLUMNS,
                services: ServiceType::valid_codes(),
            });
        }

        let data = rows.split_off(HEADER_ROWS.min(rows.len()));
        Ok(Self {
            total_rows: data.len(),
            rows: data.into_iter(),
            next_row: HEADER_ROWS + 1,
        })
    }

    /// Number of data rows, excluding the header region.
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }
}

impl Iterator for RateMatrix {
    type Item = ParsedRow;

    fn next(&mut self) -> Option<ParsedRow> {
        let cells = self.rows.next()?;
        let row = self.next_row;
        self.next_row += 1;
        Some(parse_row(row, &cells))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

fn parse_row(row: usize, cells: &[String]) -> ParsedRow {
    let cell = |i: usize| cells.get(i).map(String::as_str);

    let destination = match validate_destination(cell(0), cell(1), cell(2)) {
        Ok(d) => d,
        Err(_) => {
            return ParsedRow {
                row,
                outcomes: vec![RowOutcome::SkippedRow { row }],
            }
        }
    };

    let mut outcomes = Vec::new();
    for service_type in ServiceType::ALL {
        let col = DESTINATION_COLUMNS + service_type.position() * 2;
        let raw_rate = cell(col);
        let raw_sla = cell(col + 1);

        match (validate_rate(raw_rate), validate_sla(raw_sla)) {
            // Nothing offered for this service
            (Ok(None), Ok(None)) => {}
            (Ok(rate), Ok(sla)) => outcomes.push(RowOutcome::Record(RateCandidate {
                destination: destination.clone(),
                service_type,
                rate,
                sla,
            })),
            (rate, sla) => {
                let mut problems = Vec::new();
                if let Err(e) = rate {
                    problems.push(format!("invalid rate '{}' ({})", raw_rate.unwrap_or(""), e));
                }
                if let Err(e) = sla {
                    problems.push(format!("invalid SLA '{}' ({})", raw_sla.unwrap_or(""), e));
                }
                outcomes.push(RowOutcome::RejectedGroup {
                    row,
                    service_type,
                    reason: format!("Row {} {}: {}", row, service_type, problems.join("; ")),
                });
            }
        }
    }

    ParsedRow { row, outcomes }
}

/// Read the first worksheet as text, keeping absolute row/column positions.
fn read_first_sheet<R>(mut workbook: R) -> Result<Vec<Vec<String>>, SheetError>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: Display,
{
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(SheetError::NoWorksheet)?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| SheetError::Excel(e.to_string()))?;

    // Ranges start at the first used cell, not at A1
    let (start_row, start_col) = match range.start() {
        Some((r, c)) => (r as usize, c as usize),
        None => return Ok(Vec::new()),
    };

    let mut rows = vec![Vec::new(); start_row];
    for data_row in range.rows() {
        let mut cells = vec![String::new(); start_col];
        cells.extend(data_row.iter().map(|cell| cell_text(&cell.to_string())));
        rows.push(cells);
    }

    Ok(rows)
}

/// Read CSV records, keeping absolute row positions.
fn read_delimited(bytes: &[u8]) -> Result<Vec<Vec<String>>, SheetError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // trailing empty cells are often dropped
        .from_reader(bytes);

    let mut rows = Vec::new();
    let mut record = ByteRecord::new();
    let mut consumed = 0;
    while reader.read_byte_record(&mut record)? {
        let end = reader.position().byte() as usize;
        push_blank_lines(&mut rows, bytes, consumed, end);
        rows.push(
            record
                .iter()
                .map(|field| cell_text(&String::from_utf8_lossy(field)))
                .collect(),
        );
        consumed = end;
    }
    push_blank_lines(&mut rows, bytes, consumed, bytes.len());

    Ok(rows)
}

/// The CSV reader skips empty lines. Put each one back as an empty row,
/// counting the line breaks that precede the next record in `bytes[from..to]`.
fn push_blank_lines(rows: &mut Vec<Vec<String>>, bytes: &[u8], from: usize, to: usize) {
    let mut run = bytes.get(from..to.min(bytes.len())).unwrap_or_default();
    // The reader stops a CRLF record after the '\r'
    if from > 0 && bytes[from - 1] == b'\r' && run.first() == Some(&b'\n') {
        run = &run[1..];
    }

    let mut blanks = 0;
    let mut i = 0;
    while i < run.len() {
        match run[i] {
            b'\r' => {
                if run.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            }
            b'\n' => {}
            _ => break,
        }
        blanks += 1;
        i += 1;
    }

    rows.extend(std::iter::repeat_with(Vec::new).take(blanks));
}

/// Cell text as stored. NUL is not valid in Postgres text.
fn cell_text(raw: &str) -> String {
    raw.replace('\0', "")
}

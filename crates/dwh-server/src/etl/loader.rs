//! Raw CSV loader
//!
//! Columns are located by header name, so the export may reorder or add columns.
//! Empty cells and the usual spreadsheet NA markers become `None`.

use csv::{ReaderBuilder, StringRecord, Trim};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, instrument};

use super::error::{EtlError, Result};
use super::models::{RawRecord, COLUMNS};

/// Cell values read as missing
const NA_MARKERS: [&str; 12] = [
    "NA", "N/A", "n/a", "#N/A", "NaN", "nan", "-nan", "NULL", "null", "None", "<NA>", "#NA",
];

/// Read the whole file into memory
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_csv(path: &Path) -> Result<Vec<RawRecord>> {
    let file = std::fs::File::open(path).map_err(|e| EtlError::load(path, e))?;
    let records = parse_csv(file, path)?;
    info!(rows = records.len(), "Loaded source file");
    Ok(records)
}

/// Parse CSV from any reader; `source` only labels errors
pub fn parse_csv<R: Read>(reader: R, source: &Path) -> Result<Vec<RawRecord>> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| EtlError::load(source, format!("unreadable header: {e}")))?
        .clone();
    let positions = column_positions(&headers).map_err(|missing| {
        EtlError::load(source, format!("missing column(s): {}", missing.join(", ")))
    })?;

    let mut records = Vec::new();
    for (index, result) in rdr.records().enumerate() {
        let row = result.map_err(|e| EtlError::load(source, format!("record {}: {e}", index + 1)))?;
        records.push(to_raw(&row, &positions));
    }

    debug!(rows = records.len(), "Parsed CSV records");
    Ok(records)
}

/// Index of every expected column in the header, or the names that are absent
fn column_positions(headers: &StringRecord) -> std::result::Result<[usize; 12], Vec<&'static str>> {
    let mut positions = [0usize; 12];
    let mut missing = Vec::new();

    for (slot, column) in positions.iter_mut().zip(COLUMNS) {
        match headers.iter().position(|h| h.trim().eq_ignore_ascii_case(column)) {
            Some(index) => *slot = index,
            None => missing.push(column),
        }
    }

    if missing.is_empty() {
        Ok(positions)
    } else {
        Err(missing)
    }
}

fn to_raw(row: &StringRecord, positions: &[usize; 12]) -> RawRecord {
    let mut record = RawRecord::default();
    for (column, &index) in COLUMNS.iter().zip(positions) {
        if let Some(cell) = record.get_mut(column) {
            *cell = row.get(index).and_then(normalize_cell);
        }
    }
    record
}

fn normalize_cell(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || NA_MARKERS.contains(&value) {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HEADER: &str = "order_id,purchase_date,customer_id,customer_gender,customer_age,product_category,product_name,product_price,quantity,order_total,payment_method,shipping_region";

    fn parse(body: &str) -> Result<Vec<RawRecord>> {
        parse_csv(body.as_bytes(), Path::new("test.csv"))
    }

    #[test]
    fn test_parses_rows_by_header_name() {
        let csv = format!("{HEADER}\n1,01/03/24,7,F,30,Electronics,Phone,500,1,500,Card,North\n");
        let rows = parse(&csv).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].order_id.as_deref(), Some("1"));
        assert_eq!(rows[0].purchase_date.as_deref(), Some("01/03/24"));
        assert_eq!(rows[0].shipping_region.as_deref(), Some("North"));
    }

    #[test]
    fn test_reordered_and_extra_columns() {
        let csv = "shipping_region,discount,order_id,purchase_date,customer_id,customer_gender,customer_age,product_category,product_name,product_price,quantity,order_total,payment_method\n\
                   South,0.1,9,02/03/24,3,M,41,Books,Novel,12.5,2,25,Cash\n";
        let rows = parse(csv).unwrap();

        assert_eq!(rows[0].order_id.as_deref(), Some("9"));
        assert_eq!(rows[0].shipping_region.as_deref(), Some("South"));
        assert_eq!(rows[0].payment_method.as_deref(), Some("Cash"));
    }

    #[test]
    fn test_missing_cells_and_na_markers_are_none() {
        let csv = format!("{HEADER}\n2,01/03/24,7,,NaN,Electronics,  ,500,1,500,NULL,N/A\n");
        let rows = parse(&csv).unwrap();

        assert_eq!(rows[0].customer_gender, None);
        assert_eq!(rows[0].customer_age, None);
        assert_eq!(rows[0].product_name, None);
        assert_eq!(rows[0].payment_method, None);
        assert_eq!(rows[0].shipping_region, None);
    }

    #[test]
    fn test_missing_column_is_load_error() {
        let err = parse("order_id,purchase_date\n1,01/03/24\n").unwrap_err();
        match err {
            EtlError::Load { reason, .. } => {
                assert!(reason.contains("customer_id"));
                assert!(reason.contains("shipping_region"));
            },
            other => panic!("expected load error, got {other:?}"),
        }
    }

    #[test]
    fn test_ragged_record_is_load_error() {
        let csv = format!("{HEADER}\n1,01/03/24,7\n");
        assert!(matches!(parse(&csv), Err(EtlError::Load { .. })));
    }

    #[test]
    fn test_load_csv_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        writeln!(file, "1,01/03/24,7,F,30,Electronics,Phone,500,1,500,Card,North").unwrap();
        writeln!(file, "2,05/04/24,8,M,22,Toys,Ball,10,3,30,Cash,South").unwrap();

        let rows = load_csv(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = load_csv(Path::new("/nonexistent/orders.csv")).unwrap_err();
        assert!(err.is_fatal());
    }
}

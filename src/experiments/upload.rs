use crate::error::StoreError;

/// Time and metric columns pulled out of an uploaded table.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSeries {
    pub time: Vec<f64>,
    pub metric: Vec<f64>,
}

/// Decode a CSV upload into its time and metric columns.
///
/// Column names are matched case-insensitively; any other columns are
/// ignored. A trailing `%` on metric cells is accepted.
pub fn decode_csv(
    bytes: &[u8],
    time_column: &str,
    metric_column: &str,
) -> Result<DecodedSeries, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| StoreError::validation(format!("unreadable header row: {e}")))?
        .clone();
    let position = |wanted: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').eq_ignore_ascii_case(wanted.trim()))
            .ok_or_else(|| StoreError::validation(format!("missing column '{wanted}'")))
    };
    let time_idx = position(time_column)?;
    let metric_idx = position(metric_column)?;

    let mut decoded = DecodedSeries {
        time: Vec::new(),
        metric: Vec::new(),
    };
    for (i, record) in reader.records().enumerate() {
        // Header is line 1.
        let line = i + 2;
        let record =
            record.map_err(|e| StoreError::validation(format!("line {line}: {e}")))?;
        decoded.time.push(cell(&record, time_idx, time_column, line)?);
        decoded.metric.push(cell(&record, metric_idx, metric_column, line)?);
    }

    if decoded.time.is_empty() {
        return Err(StoreError::validation("upload contains no data rows"));
    }
    Ok(decoded)
}

fn cell(record: &csv::StringRecord, idx: usize, column: &str, line: usize) -> Result<f64, StoreError> {
    let raw = record.get(idx).unwrap_or_default();
    if raw.is_empty() {
        return Err(StoreError::validation(format!(
            "line {line}: column '{column}' is blank"
        )));
    }
    raw.trim_end_matches('%')
        .trim_end()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            StoreError::validation(format!(
                "line {line}: column '{column}' has non-numeric value '{raw}'"
            ))
        })
}

//! CSV bodies to raw batches.

use ccp_common::RawBatch;

/// Parse a CSV body with a header row. Empty fields become missing values;
/// an empty body yields an empty batch.
pub fn parse_csv(body: &[u8]) -> Result<RawBatch, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(body);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| (!field.is_empty()).then(|| field.to_string()))
                .collect(),
        );
    }

    Ok(RawBatch::new(headers, rows))
}

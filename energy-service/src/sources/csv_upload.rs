use std::sync::Arc;

use csv::StringRecord;
use energy_client::domain::{EnergyRecord, OwnerId};

use super::timestamp::parse_timestamp;
use crate::pipeline::{Envelope, EnvelopeStream, IngestError, Source};

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const CONSUMPTION_COLUMN: &str = "consumption";

/// Delimited upload turned into `EnergyRecord`s for one owner.
///
/// Expected header columns (by name, case-sensitive):
/// - timestamp (any form accepted by `parse_timestamp`)
/// - consumption (decimal number)
///
/// Other columns are ignored.
pub struct CsvUploadSource {
    bytes: Arc<[u8]>,
    owner: OwnerId,
    delimiter: u8,
}

impl CsvUploadSource {
    pub fn new(bytes: impl Into<Arc<[u8]>>, owner: OwnerId) -> Self {
        Self {
            bytes: bytes.into(),
            owner,
            delimiter: b',',
        }
    }

    /// Pipe-delimited `.dat` exports use `b'|'`.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Content digest used to reference the raw payload.
    pub fn digest(&self) -> String {
        blake3::hash(&self.bytes).to_hex().to_string()
    }
}

/// `.dat` exports are pipe-delimited; everything else is read as CSV.
pub fn delimiter_for(file_name: &str) -> u8 {
    let is_dat = file_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("dat"));
    if is_dat {
        b'|'
    } else {
        b','
    }
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    timestamp: usize,
    consumption: usize,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self, IngestError> {
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
        };

        match (position(TIMESTAMP_COLUMN), position(CONSUMPTION_COLUMN)) {
            (Some(timestamp), Some(consumption)) => Ok(Self {
                timestamp,
                consumption,
            }),
            (ts, cons) => {
                let mut missing = Vec::new();
                if ts.is_none() {
                    missing.push(TIMESTAMP_COLUMN.to_string());
                }
                if cons.is_none() {
                    missing.push(CONSUMPTION_COLUMN.to_string());
                }
                Err(IngestError::Schema { missing })
            }
        }
    }
}

fn field<'r>(record: &'r StringRecord, idx: usize, column: &'static str, row: u64) -> Result<&'r str, IngestError> {
    record.get(idx).ok_or_else(|| IngestError::Parse {
        row,
        column,
        value: String::new(),
        reason: "value is missing".to_string(),
    })
}

fn record_to_energy_record(
    record: &StringRecord,
    columns: Columns,
    owner: &OwnerId,
    row: u64,
) -> Result<EnergyRecord, IngestError> {
    let ts_str = field(record, columns.timestamp, TIMESTAMP_COLUMN, row)?;
    let timestamp = parse_timestamp(ts_str).map_err(|e| IngestError::Parse {
        row,
        column: TIMESTAMP_COLUMN,
        value: ts_str.to_string(),
        reason: e.to_string(),
    })?;

    let consumption_str = field(record, columns.consumption, CONSUMPTION_COLUMN, row)?;
    let consumption: f64 = consumption_str.trim().parse().map_err(|e: std::num::ParseFloatError| {
        IngestError::Parse {
            row,
            column: CONSUMPTION_COLUMN,
            value: consumption_str.to_string(),
            reason: e.to_string(),
        }
    })?;

    Ok(EnergyRecord::new(owner.clone(), timestamp, consumption))
}

#[async_trait::async_trait]
impl Source<EnergyRecord> for CsvUploadSource {
    async fn stream(&self) -> EnvelopeStream<EnergyRecord> {
        let bytes = self.bytes.clone();
        let owner = self.owner.clone();
        let delimiter = self.delimiter;

        let s = async_stream::try_stream! {
            let mut rdr = csv::ReaderBuilder::new()
                .delimiter(delimiter)
                .from_reader(&bytes[..]);
            let headers = rdr
                .headers()
                .map_err(|e| IngestError::Malformed(format!("failed to read CSV headers: {e}")))?
                .clone();
            let columns = Columns::locate(&headers)?;

            let mut row: u64 = 0;
            for result in rdr.records() {
                row += 1;
                let record = result
                    .map_err(|e| IngestError::Malformed(format!("failed to read CSV record {row}: {e}")))?;

                let energy = match record_to_energy_record(&record, columns, &owner, row) {
                    Ok(r) => r,
                    Err(e) => {
                        metrics::counter!("ingest_rejected_rows_total").increment(1);
                        Err(e)?
                    }
                };

                yield Envelope {
                    payload: energy,
                    row,
                };
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use time::macros::datetime;

    async fn parse(input: &str) -> Result<Vec<Envelope<EnergyRecord>>, IngestError> {
        CsvUploadSource::new(input.as_bytes().to_vec(), OwnerId::new("alice"))
            .stream()
            .await
            .try_collect()
            .await
    }

    #[tokio::test]
    async fn extra_columns_are_ignored_and_order_does_not_matter() {
        let rows = parse("meter,consumption,timestamp\nm-1, 1.25 ,2024-01-01T10:00:00Z\nm-1,-0.5,2024-01-01 11:00\n")
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row, 1);
        assert_eq!(rows[0].payload.consumption, 1.25);
        assert_eq!(rows[0].payload.timestamp, datetime!(2024-01-01 10:00:00 UTC));
        assert_eq!(rows[1].payload.consumption, -0.5);
        assert_eq!(rows[1].payload.owner, OwnerId::new("alice"));
    }

    #[tokio::test]
    async fn header_with_bom_and_padding_is_accepted() {
        let rows = parse("\u{feff}timestamp , consumption\n2024-01-01,3\n").await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn both_missing_columns_are_reported() {
        let err = parse("time,kwh\n2024-01-01,3\n").await.unwrap_err();
        match err {
            IngestError::Schema { missing } => assert_eq!(missing, vec!["timestamp", "consumption"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn header_names_are_case_sensitive() {
        let err = parse("Timestamp,consumption\n2024-01-01,3\n").await.unwrap_err();
        assert!(matches!(err, IngestError::Schema { .. }));
    }

    #[tokio::test]
    async fn empty_file_fails_schema_check() {
        let err = parse("").await.unwrap_err();
        assert!(matches!(err, IngestError::Schema { ref missing } if missing.len() == 2));
    }

    #[tokio::test]
    async fn bad_consumption_names_row_and_column() {
        let err = parse("timestamp,consumption\n2024-01-01,1\n2024-01-02,lots\n").await.unwrap_err();
        match err {
            IngestError::Parse { row, column, value, .. } => {
                assert_eq!(row, 2);
                assert_eq!(column, "consumption");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn ragged_row_is_malformed() {
        let err = parse("timestamp,consumption\n2024-01-01,1,extra\n").await.unwrap_err();
        assert!(matches!(err, IngestError::Malformed(_)));
    }

    #[test]
    fn dat_files_are_pipe_delimited() {
        assert_eq!(delimiter_for("meter-export.DAT"), b'|');
        assert_eq!(delimiter_for("usage.csv"), b',');
        assert_eq!(delimiter_for("no-extension"), b',');
    }

    #[tokio::test]
    async fn pipe_delimited_input() {
        let rows = CsvUploadSource::new(b"timestamp|consumption\n2024-01-01|7\n".to_vec(), OwnerId::new("alice"))
            .with_delimiter(b'|')
            .stream()
            .await
            .try_collect::<Vec<_>>()
            .await
            .unwrap();

        assert_eq!(rows[0].payload.consumption, 7.0);
    }
}

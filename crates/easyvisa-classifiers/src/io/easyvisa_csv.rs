//! EasyVisa CSV reader.
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use csv::StringRecord;

use crate::data_handling::{ApplicationRecord, CaseStatus};
use crate::error::VisaError;

/// Columns every input file must provide. Order in the file is free.
pub const EASYVISA_COLUMNS: [&str; 12] = [
    "case_id",
    "continent",
    "education_of_employee",
    "has_job_experience",
    "requires_job_training",
    "no_of_employees",
    "yr_of_estab",
    "region_of_employment",
    "prevailing_wage",
    "unit_of_wage",
    "full_time_position",
    "case_status",
];

/// Read an EasyVisa CSV file into typed records.
///
/// Any schema violation aborts the load; no partial record list is returned.
pub fn read_easyvisa_csv<P: AsRef<Path>>(path: P) -> Result<Vec<ApplicationRecord>> {
    let file = std::fs::File::open(&path)
        .with_context(|| format!("Failed to open EasyVisa file: {}", path.as_ref().display()))?;
    let records = read_easyvisa_csv_from_reader(file)
        .with_context(|| format!("Failed to load EasyVisa file: {}", path.as_ref().display()))?;
    log::info!(
        "Loaded {} applications from {}",
        records.len(),
        path.as_ref().display()
    );
    Ok(records)
}

/// Read EasyVisa rows from any reader (file, in-memory buffer).
pub fn read_easyvisa_csv_from_reader<R: Read>(rdr: R) -> Result<Vec<ApplicationRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(rdr);

    let headers = reader
        .headers()
        .context("Failed to read EasyVisa header row")?
        .clone();
    let columns = ColumnIndex::resolve(&headers)?;

    let mut records = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let row = row_idx + 1;
        let record = result.with_context(|| format!("Failed to read row {}", row))?;
        records.push(columns.parse_record(&record, row)?);
    }

    if records.is_empty() {
        return Err(VisaError::EmptyDataset.into());
    }
    log::debug!("Parsed {} EasyVisa rows", records.len());
    Ok(records)
}

/// Header positions of the required columns, in `EASYVISA_COLUMNS` order.
struct ColumnIndex {
    positions: [usize; 12],
}

impl ColumnIndex {
    fn resolve(headers: &StringRecord) -> Result<Self, VisaError> {
        let mut positions = [0usize; 12];
        for (slot, name) in positions.iter_mut().zip(EASYVISA_COLUMNS.iter()) {
            *slot = find_column(headers, name)
                .ok_or_else(|| VisaError::MissingColumn(name.to_string()))?;
        }
        Ok(Self { positions })
    }

    fn text(&self, record: &StringRecord, column: usize, row: usize) -> Result<String, VisaError> {
        let name = EASYVISA_COLUMNS[column];
        let value = record.get(self.positions[column]).unwrap_or("");
        if value.is_empty() {
            return Err(VisaError::InvalidValue {
                row,
                column: name.to_string(),
                value: String::new(),
            });
        }
        Ok(value.to_string())
    }

    fn number(&self, record: &StringRecord, column: usize, row: usize) -> Result<f64, VisaError> {
        let raw = self.text(record, column, row)?;
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(VisaError::InvalidValue {
                row,
                column: EASYVISA_COLUMNS[column].to_string(),
                value: raw,
            }),
        }
    }

    fn parse_record(&self, record: &StringRecord, row: usize) -> Result<ApplicationRecord, VisaError> {
        let status_raw = self.text(record, 11, row)?;
        let case_status = status_raw
            .parse::<CaseStatus>()
            .map_err(|_| VisaError::InvalidValue {
                row,
                column: "case_status".to_string(),
                value: status_raw.clone(),
            })?;

        Ok(ApplicationRecord {
            case_id: self.text(record, 0, row)?,
            continent: self.text(record, 1, row)?,
            education_of_employee: self.text(record, 2, row)?,
            has_job_experience: self.text(record, 3, row)?,
            requires_job_training: self.text(record, 4, row)?,
            no_of_employees: self.number(record, 5, row)?,
            yr_of_estab: self.number(record, 6, row)?,
            region_of_employment: self.text(record, 7, row)?,
            prevailing_wage: self.number(record, 8, row)?,
            unit_of_wage: self.text(record, 9, row)?,
            full_time_position: self.text(record, 10, row)?,
            case_status,
        })
    }
}

fn find_column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "case_id,continent,education_of_employee,has_job_experience,requires_job_training,no_of_employees,yr_of_estab,region_of_employment,prevailing_wage,unit_of_wage,full_time_position,case_status";

    #[test]
    fn reads_typed_records() {
        let data = format!(
            "{}\nEZYV01,Asia,Master's,N,N,14513,2007,West,592.2029,Hour,Y,Denied\nEZYV02,Asia,Bachelor's,Y,N,2412,2002,Northeast,83425.65,Year,Y,Certified\n",
            HEADER
        );
        let records = read_easyvisa_csv_from_reader(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].case_status, CaseStatus::Denied);
        assert_eq!(records[1].education_of_employee, "Bachelor's");
        assert!((records[1].prevailing_wage - 83425.65).abs() < 1e-9);
    }

    #[test]
    fn header_order_is_free() {
        let data = "case_status,case_id,continent,education_of_employee,has_job_experience,requires_job_training,no_of_employees,yr_of_estab,region_of_employment,prevailing_wage,unit_of_wage,full_time_position,extra\n\
                    Certified,EZYV03,Europe,Doctorate,Y,N,44444,2008,West,122996.86,Year,Y,ignored\n";
        let records = read_easyvisa_csv_from_reader(data.as_bytes()).unwrap();
        assert_eq!(records[0].continent, "Europe");
        assert_eq!(records[0].case_status, CaseStatus::Certified);
    }

    #[test]
    fn missing_column_is_named() {
        let data = "case_id,continent\nEZYV01,Asia\n";
        let err = read_easyvisa_csv_from_reader(data.as_bytes()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<VisaError>(),
            Some(&VisaError::MissingColumn("education_of_employee".to_string()))
        );
    }

    #[test]
    fn non_numeric_wage_reports_row_and_column() {
        let data = format!(
            "{}\nEZYV01,Asia,Master's,N,N,14513,2007,West,lots,Hour,Y,Denied\n",
            HEADER
        );
        let err = read_easyvisa_csv_from_reader(data.as_bytes()).unwrap_err();
        match err.downcast_ref::<VisaError>() {
            Some(VisaError::InvalidValue { row, column, value }) => {
                assert_eq!(*row, 1);
                assert_eq!(column, "prevailing_wage");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let data = format!(
            "{}\nEZYV01,Asia,Master's,N,N,14513,2007,West,592.2,Hour,Y,Withdrawn\n",
            HEADER
        );
        assert!(read_easyvisa_csv_from_reader(data.as_bytes()).is_err());
    }

    #[test]
    fn empty_file_is_rejected() {
        let err = read_easyvisa_csv_from_reader(format!("{}\n", HEADER).as_bytes()).unwrap_err();
        assert_eq!(err.downcast_ref::<VisaError>(), Some(&VisaError::EmptyDataset));
    }
}

pub mod easyvisa_csv;

pub use easyvisa_csv::{read_easyvisa_csv, read_easyvisa_csv_from_reader, EASYVISA_COLUMNS};

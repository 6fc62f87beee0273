use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("{parser} CSV error: {source}")]
    Csv {
        parser: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("{parser} header is missing column '{column}'")]
    MissingColumn {
        parser: &'static str,
        column: String,
    },

    #[error("{parser} data row {line_index} invalid: {message}")]
    DataRow {
        parser: &'static str,
        line_index: usize,
        message: String,
    },

    #[error("{parser} row {line_index} has unrecognized timestamp '{value}'")]
    Timestamp {
        parser: &'static str,
        line_index: usize,
        value: String,
    },

    #[error("{parser} expected {expected} data rows, found {found}")]
    RowCount {
        parser: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{parser} polars operation failed: {source}")]
    Polars {
        parser: &'static str,
        #[source]
        source: polars::error::PolarsError,
    },

    #[error("{parser} file did not contain any data rows")]
    Empty { parser: &'static str },
}

//! Extraction of the throughput figure from netperf output.
use std::num::ParseFloatError;

// The report is a fixed table, the measurement row is the 7th line.
const RESULT_LINE: usize = 6;
// Throughput is the 5th column of the measurement row.
const THROUGHPUT_FIELD: usize = 4;

/// Errors produced while reading a benchmark report.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseError {
    /// The report is shorter than expected.
    #[error("benchmark output has {lines} lines, expected at least {}", RESULT_LINE + 1)]
    MissingLine {
        /// Number of lines found.
        lines: usize,
    },
    /// The measurement row is narrower than expected.
    #[error("benchmark result line has {fields} fields, expected at least {}", THROUGHPUT_FIELD + 1)]
    MissingField {
        /// Number of fields found.
        fields: usize,
    },
    /// The throughput column does not hold a number.
    #[error("benchmark throughput {value:?} is not a number: {source}")]
    InvalidNumber {
        /// Text found in the throughput column.
        value: String,
        /// Underlying float parse failure.
        source: ParseFloatError,
    },
}

/// Parse the throughput from the captured stdout of a netperf client.
///
/// ```text
/// MIGRATED TCP STREAM TEST from 0.0.0.0 (0.0.0.0) port 0 AF_INET to 10.1.1.5 () port 0 AF_INET
/// Recv   Send    Send
/// Socket Socket  Message  Elapsed
/// Size   Size    Size     Time     Throughput
/// bytes  bytes   bytes    secs.    10^6bits/sec
///
///  87380  16384  16384    10.02     941.23
/// ```
pub fn parse_throughput(output: &str) -> Result<f64, ParseError> {
    let line = output
        .split('\n')
        .nth(RESULT_LINE)
        .ok_or_else(|| ParseError::MissingLine {
            lines: output.split('\n').count(),
        })?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    let value = fields
        .get(THROUGHPUT_FIELD)
        .ok_or(ParseError::MissingField {
            fields: fields.len(),
        })?;
    value
        .parse::<f64>()
        .map_err(|source| ParseError::InvalidNumber {
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::stub::NETPERF_OUTPUT;
    use expect_test::expect;

    #[test]
    fn parses_netperf_report() {
        assert_eq!(parse_throughput(NETPERF_OUTPUT), Ok(941.23));
    }

    #[test]
    fn extra_columns_are_ignored() {
        let output = "\n\n\n\n\n\n87380 16384 16384 10.02 12.5 trailing\n";
        assert_eq!(parse_throughput(output), Ok(12.5));
    }

    #[test]
    fn short_output_is_an_error() {
        let err = parse_throughput("one\ntwo\nthree").unwrap_err();
        assert_eq!(err, ParseError::MissingLine { lines: 3 });
        expect!["benchmark output has 3 lines, expected at least 7"].assert_eq(&err.to_string());
    }

    #[test]
    fn empty_output_is_an_error() {
        assert_eq!(
            parse_throughput(""),
            Err(ParseError::MissingLine { lines: 1 })
        );
    }

    #[test]
    fn narrow_result_line_is_an_error() {
        let output = "\n\n\n\n\n\n87380 16384 16384 10.02\n";
        let err = parse_throughput(output).unwrap_err();
        assert_eq!(err, ParseError::MissingField { fields: 4 });
        expect!["benchmark result line has 4 fields, expected at least 5"]
            .assert_eq(&err.to_string());
    }

    #[test]
    fn non_numeric_throughput_is_an_error() {
        let output = "\n\n\n\n\n\n87380 16384 16384 10.02 fast\n";
        match parse_throughput(output) {
            Err(ParseError::InvalidNumber { value, .. }) => assert_eq!(value, "fast"),
            other => panic!("unexpected result {other:?}"),
        }
    }
}

//! Matrix file formats.
//!
//! - **Text**: one row per line, values separated by commas and/or
//!   whitespace. Blank lines are skipped. Written space-separated with the
//!   shortest representation that round-trips.
//! - **Binary**: two native-endian `u64` words (rows, cols) followed by
//!   `rows * cols` native-endian `f64` values in row-major order. No magic
//!   number, no version.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2};
use thiserror::Error;

const WORD: usize = std::mem::size_of::<u64>();
const HEADER_LEN: usize = 2 * WORD;

/// Errors while reading or writing matrix files.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("Failed to access file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Format { line: usize, message: String },

    #[error("Truncated matrix file: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Unsupported matrix format: {0}")]
    UnsupportedFormat(String),
}

/// On-disk representation of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixFormat {
    Text,
    Binary,
}

impl MatrixFormat {
    /// `.bin` files are binary, everything else is text.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("bin") => MatrixFormat::Binary,
            _ => MatrixFormat::Text,
        }
    }
}

impl FromStr for MatrixFormat {
    type Err = IoError;

    /// Accepts the single-letter flags `t`/`b` as well as `text`/`binary`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "t" | "text" | "txt" => Ok(MatrixFormat::Text),
            "b" | "bin" | "binary" => Ok(MatrixFormat::Binary),
            other => Err(IoError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for MatrixFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatrixFormat::Text => write!(f, "text"),
            MatrixFormat::Binary => write!(f, "binary"),
        }
    }
}

/// Parse a text matrix.
pub fn parse_text(content: &str) -> Result<Array2<f64>, IoError> {
    let mut cols = None;
    let mut rows = 0;
    let mut data = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let before = data.len();
        for token in line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let value: f64 = token.parse().map_err(|_| IoError::Format {
                line: line_no,
                message: format!("Invalid number: '{token}'"),
            })?;
            data.push(value);
        }

        let width = data.len() - before;
        if width == 0 {
            continue;
        }
        match cols {
            None => cols = Some(width),
            Some(expected) if expected != width => {
                return Err(IoError::Format {
                    line: line_no,
                    message: format!("Expected {expected} values, found {width}"),
                });
            }
            Some(_) => {}
        }
        rows += 1;
    }

    let cols = cols.unwrap_or(0);
    Array2::from_shape_vec((rows, cols), data).map_err(|e| IoError::Format {
        line: rows,
        message: e.to_string(),
    })
}

/// Render a matrix as text, one row per line.
pub fn format_text(matrix: ArrayView2<'_, f64>) -> String {
    let mut out = String::new();
    for row in matrix.rows() {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}

pub fn read_text(path: &Path) -> Result<Array2<f64>, IoError> {
    parse_text(&fs::read_to_string(path)?)
}

pub fn write_text(path: &Path, matrix: ArrayView2<'_, f64>) -> Result<(), IoError> {
    fs::write(path, format_text(matrix))?;
    Ok(())
}

/// Encode a matrix in the binary format.
pub fn encode_binary(matrix: ArrayView2<'_, f64>) -> Vec<u8> {
    let mut out = Vec::with_capacity(crate::matrix::byte_size(matrix));
    // Writing into a Vec cannot fail.
    let _ = write_binary_to(&mut out, matrix);
    out
}

/// Decode a matrix from the binary format.
pub fn decode_binary(bytes: &[u8]) -> Result<Array2<f64>, IoError> {
    if bytes.len() < HEADER_LEN {
        return Err(IoError::Truncated {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    }
    let word = |i: usize| -> Result<usize, IoError> {
        let raw: u64 = bytemuck::pod_read_unaligned(&bytes[i * WORD..(i + 1) * WORD]);
        usize::try_from(raw).map_err(|_| IoError::Format {
            line: 0,
            message: format!("Dimension {raw} does not fit in memory"),
        })
    };
    let (rows, cols) = (word(0)?, word(1)?);

    let expected = rows
        .checked_mul(cols)
        .and_then(|len| len.checked_mul(std::mem::size_of::<f64>()))
        .and_then(|payload| payload.checked_add(HEADER_LEN))
        .ok_or_else(|| IoError::Format {
            line: 0,
            message: format!("Dimensions {rows}x{cols} overflow"),
        })?;
    if bytes.len() < expected {
        return Err(IoError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    if bytes.len() > expected {
        return Err(IoError::Format {
            line: 0,
            message: format!("{} trailing bytes after matrix payload", bytes.len() - expected),
        });
    }

    let data: Vec<f64> = bytes[HEADER_LEN..]
        .chunks_exact(std::mem::size_of::<f64>())
        .map(bytemuck::pod_read_unaligned)
        .collect();
    Array2::from_shape_vec((rows, cols), data).map_err(|e| IoError::Format {
        line: 0,
        message: e.to_string(),
    })
}

pub fn read_binary(path: &Path) -> Result<Array2<f64>, IoError> {
    decode_binary(&fs::read(path)?)
}

pub fn write_binary(path: &Path, matrix: ArrayView2<'_, f64>) -> Result<(), IoError> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    write_binary_to(&mut writer, matrix)?;
    writer.flush()?;
    Ok(())
}

fn write_binary_to<W: Write>(writer: &mut W, matrix: ArrayView2<'_, f64>) -> std::io::Result<()> {
    let (rows, cols) = matrix.dim();
    writer.write_all(bytemuck::bytes_of(&(rows as u64)))?;
    writer.write_all(bytemuck::bytes_of(&(cols as u64)))?;
    match matrix.as_slice() {
        Some(data) => writer.write_all(bytemuck::cast_slice(data)),
        None => matrix
            .iter()
            .try_for_each(|v| writer.write_all(bytemuck::bytes_of(v))),
    }
}

/// Read a matrix, inferring the format from the extension when `format` is
/// `None`.
pub fn read_matrix(path: &Path, format: Option<MatrixFormat>) -> Result<Array2<f64>, IoError> {
    let format = format.unwrap_or_else(|| MatrixFormat::from_path(path));
    log::debug!("Reading {format} matrix from {}", path.display());
    match format {
        MatrixFormat::Text => read_text(path),
        MatrixFormat::Binary => read_binary(path),
    }
}

/// Write a matrix, inferring the format from the extension when `format` is
/// `None`.
pub fn write_matrix(
    path: &Path,
    matrix: ArrayView2<'_, f64>,
    format: Option<MatrixFormat>,
) -> Result<(), IoError> {
    let format = format.unwrap_or_else(|| MatrixFormat::from_path(path));
    log::debug!(
        "Writing {}x{} {format} matrix to {}",
        matrix.nrows(),
        matrix.ncols(),
        path.display()
    );
    match format {
        MatrixFormat::Text => write_text(path, matrix),
        MatrixFormat::Binary => write_binary(path, matrix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::random_matrix;
    use ndarray::array;

    #[test]
    fn test_parse_mixed_separators() {
        let m = parse_text("1, 2 3\n\n4,5,6\n").unwrap();
        assert_eq!(m, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        match parse_text("1 2\n3\n") {
            Err(IoError::Format { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected a format error, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_number_reports_line() {
        assert!(matches!(
            parse_text("1 2\n3 x\n"),
            Err(IoError::Format { line: 2, .. })
        ));
    }

    #[test]
    fn test_text_round_trip_is_exact() {
        let m = random_matrix(3, 4, 11);
        assert_eq!(parse_text(&format_text(m.view())).unwrap(), m);
    }

    #[test]
    fn test_binary_layout() {
        let m = array![[1.5, -2.0]];
        let bytes = encode_binary(m.view());
        assert_eq!(bytes.len(), 16 + 16);
        assert_eq!(&bytes[..8], &1u64.to_ne_bytes());
        assert_eq!(&bytes[8..16], &2u64.to_ne_bytes());
        assert_eq!(&bytes[16..24], &1.5f64.to_ne_bytes());
        assert_eq!(decode_binary(&bytes).unwrap(), m);
    }

    #[test]
    fn test_short_binary_is_truncated() {
        let bytes = encode_binary(random_matrix(2, 2, 5).view());
        assert!(matches!(
            decode_binary(&bytes[..bytes.len() - 1]),
            Err(IoError::Truncated {
                expected: 48,
                actual: 47
            })
        ));
        assert!(matches!(
            decode_binary(&bytes[..4]),
            Err(IoError::Truncated { expected: 16, .. })
        ));
    }

    #[test]
    fn test_format_selection() {
        assert_eq!(MatrixFormat::from_path(Path::new("a.bin")), MatrixFormat::Binary);
        assert_eq!(MatrixFormat::from_path(Path::new("a.txt")), MatrixFormat::Text);
        assert_eq!("b".parse::<MatrixFormat>().unwrap(), MatrixFormat::Binary);
        assert_eq!("t".parse::<MatrixFormat>().unwrap(), MatrixFormat::Text);
        assert!("x".parse::<MatrixFormat>().is_err());
    }

    #[test]
    fn test_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let m = random_matrix(4, 4, 9);
        for name in ["m.txt", "m.bin"] {
            let path = dir.path().join(name);
            write_matrix(&path, m.view(), None).unwrap();
            assert_eq!(read_matrix(&path, None).unwrap(), m);
        }
    }
}

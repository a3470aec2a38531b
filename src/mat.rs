//! Minimal reader and writer of level 5 MAT files.
//!
//! Only real double precision 2-D matrices are supported, stored uncompressed in little-endian
//! byte order. This is enough to exchange correlograms with MATLAB and scipy.
use std::io::Read;
use std::path::Path;

use crate::error::NCError;

const HEADER_TEXT_LEN: usize = 116;
const HEADER_LEN: usize = 128;
const VERSION: u16 = 0x0100;
const ENDIAN_INDICATOR: &[u8; 2] = b"IM";

const MI_INT8: u32 = 1;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;

const MX_DOUBLE_CLASS: u32 = 6;
const COMPLEX_FLAG: u32 = 0x0800;

/// A named matrix of doubles, stored column by column.
#[derive(Debug, Clone, PartialEq)]
pub struct MatVariable {
    name: String,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl MatVariable {
    pub fn build(name: impl Into<String>, rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, NCError> {
        let name = name.into();
        if name.is_empty() || !name.is_ascii() {
            return Err(NCError::FormatError(format!("invalid variable name {:?}", name)));
        }
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(NCError::FormatError(format!(
                "variable {} of shape {}x{} cannot hold {} values",
                name,
                rows,
                cols,
                data.len()
            )));
        }
        Ok(MatVariable { name, rows, cols, data })
    }

    /// A column vector.
    pub fn column(name: &str, data: Vec<f64>) -> Self {
        MatVariable {
            name: name.to_string(),
            rows: data.len(),
            cols: 1,
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns the values in column-major order.
    pub fn data(&self) -> &[f64] {
        &self.data[..]
    }
}

fn padding(len: usize) -> usize {
    (8 - len % 8) % 8
}

fn write_u16(w: &mut Vec<u8>, val: u16) {
    w.extend_from_slice(&val.to_le_bytes());
}

fn write_u32(w: &mut Vec<u8>, val: u32) {
    w.extend_from_slice(&val.to_le_bytes());
}

fn write_i32(w: &mut Vec<u8>, val: i32) {
    w.extend_from_slice(&val.to_le_bytes());
}

fn write_f64(w: &mut Vec<u8>, val: f64) {
    w.extend_from_slice(&val.to_le_bytes());
}

fn write_tag(w: &mut Vec<u8>, data_type: u32, num_bytes: usize) -> Result<(), NCError> {
    let num_bytes = u32::try_from(num_bytes)
        .map_err(|_| NCError::FormatError(format!("element of {} bytes is too large", num_bytes)))?;
    write_u32(w, data_type);
    write_u32(w, num_bytes);
    Ok(())
}

fn write_header(w: &mut Vec<u8>) {
    let mut text = format!(
        "MATLAB 5.0 MAT-file, Platform: {}, Created by: noise_corr {}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    )
    .into_bytes();
    text.resize(HEADER_TEXT_LEN, b' ');
    w.extend_from_slice(&text);
    // Subsystem data offset
    w.extend_from_slice(&[0u8; 8]);
    write_u16(w, VERSION);
    w.extend_from_slice(ENDIAN_INDICATOR);
}

fn write_variable(w: &mut Vec<u8>, var: &MatVariable) -> Result<(), NCError> {
    let dim = |d: usize| {
        i32::try_from(d).map_err(|_| NCError::FormatError(format!("dimension {} is too large", d)))
    };
    let (rows, cols) = (dim(var.rows)?, dim(var.cols)?);

    let name = var.name.as_bytes();
    let num_bytes = 16 + 16 + (8 + name.len() + padding(name.len())) + (8 + 8 * var.data.len());
    write_tag(w, MI_MATRIX, num_bytes)?;

    write_tag(w, MI_UINT32, 8)?;
    write_u32(w, MX_DOUBLE_CLASS);
    write_u32(w, 0);

    write_tag(w, MI_INT32, 8)?;
    write_i32(w, rows);
    write_i32(w, cols);

    write_tag(w, MI_INT8, name.len())?;
    w.extend_from_slice(name);
    w.resize(w.len() + padding(name.len()), 0);

    write_tag(w, MI_DOUBLE, 8 * var.data.len())?;
    for val in var.data.iter() {
        write_f64(w, *val);
    }
    Ok(())
}

/// Encode the variables as the content of a MAT file.
pub fn encode(variables: &[MatVariable]) -> Result<Vec<u8>, NCError> {
    let payload: usize = variables.iter().map(|v| 64 + v.name.len() + 8 * v.data.len()).sum();
    let mut w = Vec::with_capacity(HEADER_LEN + payload);
    write_header(&mut w);
    for var in variables.iter() {
        write_variable(&mut w, var)?;
    }
    Ok(w)
}

/// Save the variables to a MAT file.
pub fn save_to<P: AsRef<Path>>(path: P, variables: &[MatVariable]) -> Result<(), NCError> {
    let bytes = encode(variables)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn truncated(what: &str) -> NCError {
    NCError::FormatError(format!("truncated MAT file while reading {}", what))
}

fn read_u32(r: &mut &[u8]) -> Result<u32, NCError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(|_| truncated("a 32-bit integer"))?;
    Ok(u32::from_le_bytes(buf))
}

fn read_bytes<'a>(r: &mut &'a [u8], len: usize, what: &str) -> Result<&'a [u8], NCError> {
    if r.len() < len {
        return Err(truncated(what));
    }
    let (head, tail) = r.split_at(len);
    *r = tail;
    Ok(head)
}

/// Read a data element and returns its type and content. Both the regular and the small
/// element formats are supported; the padding is consumed.
fn read_element<'a>(r: &mut &'a [u8]) -> Result<(u32, &'a [u8]), NCError> {
    let first = read_u32(r)?;
    if first >> 16 != 0 {
        let (data_type, num_bytes) = (first & 0xffff, (first >> 16) as usize);
        if num_bytes > 4 {
            return Err(NCError::FormatError(format!(
                "small data element of {} bytes",
                num_bytes
            )));
        }
        let content = read_bytes(r, 4, "a small data element")?;
        return Ok((data_type, &content[..num_bytes]));
    }
    let num_bytes = read_u32(r)? as usize;
    let content = read_bytes(r, num_bytes, "a data element")?;
    // The last element of a file may lack its padding
    let pad = padding(num_bytes).min(r.len());
    read_bytes(r, pad, "padding")?;
    Ok((first, content))
}

fn expect_type(found: u32, expected: u32, what: &str) -> Result<(), NCError> {
    if found != expected {
        return Err(NCError::FormatError(format!(
            "expected {} of type {}, found type {}",
            what, expected, found
        )));
    }
    Ok(())
}

fn parse_variable(mut r: &[u8]) -> Result<MatVariable, NCError> {
    let (data_type, flags) = read_element(&mut r)?;
    expect_type(data_type, MI_UINT32, "array flags")?;
    let flags = read_u32(&mut &flags[..])?;
    if flags & 0xff != MX_DOUBLE_CLASS {
        return Err(NCError::FormatError(format!(
            "unsupported array class {}",
            flags & 0xff
        )));
    }
    if flags & COMPLEX_FLAG != 0 {
        return Err(NCError::FormatError("complex arrays are not supported".to_string()));
    }

    let (data_type, dims) = read_element(&mut r)?;
    expect_type(data_type, MI_INT32, "dimensions")?;
    if dims.len() != 8 {
        return Err(NCError::FormatError(format!(
            "only 2-D arrays are supported, found {} dimensions",
            dims.len() / 4
        )));
    }
    let mut dims = dims;
    let rows = read_u32(&mut dims)? as usize;
    let cols = read_u32(&mut dims)? as usize;

    let (data_type, name) = read_element(&mut r)?;
    expect_type(data_type, MI_INT8, "array name")?;
    let name = std::str::from_utf8(name)
        .map_err(|e| NCError::FormatError(format!("invalid array name: {}", e)))?;

    let (data_type, real) = read_element(&mut r)?;
    expect_type(data_type, MI_DOUBLE, "real part")?;
    let data = real
        .chunks_exact(8)
        .map(|c| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(c);
            f64::from_le_bytes(buf)
        })
        .collect::<Vec<f64>>();

    MatVariable::build(name, rows, cols, data)
}

/// Decode the variables of a MAT file.
pub fn decode(bytes: &[u8]) -> Result<Vec<MatVariable>, NCError> {
    if bytes.len() < HEADER_LEN {
        return Err(truncated("the header"));
    }
    if &bytes[126..128] != ENDIAN_INDICATOR {
        return Err(NCError::FormatError(
            "only little-endian MAT files are supported".to_string(),
        ));
    }
    let version = u16::from_le_bytes([bytes[124], bytes[125]]);
    if version != VERSION {
        return Err(NCError::FormatError(format!("unsupported MAT version {:#06x}", version)));
    }

    let mut r = &bytes[HEADER_LEN..];
    let mut variables = Vec::new();
    while !r.is_empty() {
        let (data_type, content) = read_element(&mut r)?;
        match data_type {
            MI_MATRIX => variables.push(parse_variable(content)?),
            MI_COMPRESSED => {
                return Err(NCError::FormatError(
                    "compressed MAT files are not supported".to_string(),
                ))
            }
            other => {
                return Err(NCError::FormatError(format!(
                    "unexpected top-level element of type {}",
                    other
                )))
            }
        }
    }
    Ok(variables)
}

/// Load the variables of a MAT file.
pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Vec<MatVariable>, NCError> {
    let bytes = std::fs::read(path)?;
    decode(&bytes)
}

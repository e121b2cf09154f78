//! Trailer checksums.
//!
//! The trailer byte is an extension point: [`Placeholder`] writes a constant
//! `0xFF` (the historical wire behavior and the default), [`Crc8`] computes a
//! table-driven CRC-8. Both cover the bytes from the length field through the
//! last payload byte.

use std::fmt::{self, Write as _};

/// The polynomial used for the reference CRC-8 (x^8 + x^2 + x + 1).
pub const CRC8_POLYNOMIAL: u8 = 0x07;

/// Trailer written by [`Placeholder`].
pub const PLACEHOLDER_TRAILER: u8 = 0xFF;

/// Computes the trailer byte of a frame.
pub trait Checksum: fmt::Debug + Send + Sync {
    /// Trailer for `data` (length field through end of payload).
    fn compute(&self, data: &[u8]) -> u8;

    /// Short name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Writes a fixed trailer and ignores the frame contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placeholder;

impl Checksum for Placeholder {
    fn compute(&self, _data: &[u8]) -> u8 {
        PLACEHOLDER_TRAILER
    }

    fn name(&self) -> &'static str {
        "placeholder"
    }
}

/// Table-driven CRC-8 with zero initial value and no final XOR.
#[derive(Clone, PartialEq, Eq)]
pub struct Crc8 {
    polynomial: u8,
    table: [u8; 256],
}

impl Crc8 {
    pub fn new(polynomial: u8) -> Self {
        Self {
            polynomial,
            table: build_table(polynomial),
        }
    }

    pub fn polynomial(&self) -> u8 {
        self.polynomial
    }

    pub fn table(&self) -> &[u8; 256] {
        &self.table
    }
}

impl Default for Crc8 {
    fn default() -> Self {
        Self::new(CRC8_POLYNOMIAL)
    }
}

impl fmt::Debug for Crc8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crc8")
            .field("polynomial", &format_args!("{:#04x}", self.polynomial))
            .finish()
    }
}

impl Checksum for Crc8 {
    fn compute(&self, data: &[u8]) -> u8 {
        compute(data, &self.table)
    }

    fn name(&self) -> &'static str {
        "crc8"
    }
}

/// Build the 256-entry lookup table for `polynomial`.
///
/// Each entry is the byte value shifted left eight times, XOR-ing in the
/// polynomial whenever a set bit falls off the top.
pub const fn build_table(polynomial: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut dividend = 0usize;
    while dividend < 256 {
        let mut current = dividend as u8;
        let mut bit = 0;
        while bit < 8 {
            if current & 0x80 != 0 {
                current = (current << 1) ^ polynomial;
            } else {
                current <<= 1;
            }
            bit += 1;
        }
        table[dividend] = current;
        dividend += 1;
    }
    table
}

/// Run `data` through the CRC register using a table from [`build_table`].
pub fn compute(data: &[u8], table: &[u8; 256]) -> u8 {
    data.iter()
        .fold(0u8, |register, byte| table[usize::from(register ^ byte)])
}

/// Source-code flavors for [`render_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStyle {
    C,
    Python,
    Rust,
}

/// Render the table for `polynomial` as source text, eight entries per line.
pub fn render_table(polynomial: u8, style: TableStyle) -> String {
    let table = build_table(polynomial);
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = match style {
        TableStyle::C => writeln!(
            out,
            "const uint8_t crc8_polynomial = 0x{polynomial:02x};\nconst uint8_t crc8_table[] = {{"
        ),
        TableStyle::Python => writeln!(
            out,
            "CRC8_POLYNOMIAL = 0x{polynomial:02x}\nCRC8_TABLE = ["
        ),
        TableStyle::Rust => writeln!(
            out,
            "pub const CRC8_POLYNOMIAL: u8 = 0x{polynomial:02x};\npub const CRC8_TABLE: [u8; 256] = ["
        ),
    };

    for row in table.chunks(8) {
        out.push_str("    ");
        let cells: Vec<String> = row.iter().map(|value| format!("0x{value:02x},")).collect();
        out.push_str(&cells.join(" "));
        out.push('\n');
    }

    out.push_str(match style {
        TableStyle::C => "};\n",
        TableStyle::Python => "]\n",
        TableStyle::Rust => "];\n",
    });
    out
}

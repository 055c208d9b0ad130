//! Utility functions
//!
//! Field readers take a byte slice and an offset and read past the end of the
//! slice as zero bytes, so a short final record still yields a header.

/// Copy `N` bytes starting at `offset`, zero filling past the end of `buf`
fn field<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    if offset < buf.len() {
        let end = (offset + N).min(buf.len());
        out[..end - offset].copy_from_slice(&buf[offset..end]);
    }
    out
}

pub fn u8_at(buf: &[u8], offset: usize) -> u8 {
    buf.get(offset).copied().unwrap_or(0)
}

pub fn u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(field(buf, offset))
}

pub fn i16_le(buf: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes(field(buf, offset))
}

pub fn u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(field(buf, offset))
}

pub fn i32_le(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(field(buf, offset))
}

/// Read a fixed width text field, trimming NUL padding and blanks
pub fn ascii_field(buf: &[u8], offset: usize, len: usize) -> String {
    let start = offset.min(buf.len());
    let end = (offset + len).min(buf.len());
    String::from_utf8_lossy(&buf[start..end])
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

/// Parse a `"deg:min:sec"` angle into decimal degrees
pub fn parse_degree(s: &str) -> Option<f64> {
    let mut parts = s.split(':').map(|p| p.trim().parse::<f64>());
    let deg = parts.next()?.ok()?;
    let min = parts.next()?.ok()?;
    let sec = parts.next()?.ok()?;
    if deg < 0.0 || s.trim_start().starts_with('-') {
        Some(deg - min / 60.0 - sec / 3600.0)
    } else {
        Some(deg + min / 60.0 + sec / 3600.0)
    }
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_fields() {
        let buf = [0x34, 0x12, 0xff, 0xff, 0x01, 0x00, 0x00, 0x00];
        assert_eq!(u16_le(&buf, 0), 0x1234);
        assert_eq!(i16_le(&buf, 2), -1);
        assert_eq!(u32_le(&buf, 4), 1);
    }

    #[test]
    fn test_reads_past_end_are_zero() {
        let buf = [0x01];
        assert_eq!(u16_le(&buf, 0), 1);
        assert_eq!(u32_le(&buf, 10), 0);
        assert_eq!(u8_at(&buf, 3), 0);
    }

    #[test]
    fn test_ascii_field() {
        let buf = b"KCCX\0\0  ZZ";
        assert_eq!(ascii_field(buf, 0, 8), "KCCX");
        assert_eq!(ascii_field(buf, 8, 10), "ZZ");
        assert_eq!(ascii_field(buf, 20, 4), "");
    }

    #[test]
    fn test_parse_degree() {
        let lat = parse_degree("23:0:14").unwrap();
        assert!((lat - 23.003_888).abs() < 1e-5);
        let west = parse_degree("-105:30:0").unwrap();
        assert!((west + 105.5).abs() < 1e-9);
        assert!(parse_degree("23:xx:1").is_none());
        assert!(parse_degree("23").is_none());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }
}

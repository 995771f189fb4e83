// 8.3 short names

use super::types::{CASE_LOWER_BASE, CASE_LOWER_EXT};
use crate::fs::FatError;

const SPECIAL_CHARS: &[u8] = b"!#$%&'()-@^_`{}~";

/// An 11-byte directory name plus the NT case bits that restore lower case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortName {
    pub bytes: [u8; 11],
    pub case: u8,
}

/// Convert `name` to its 8.3 form. Names that need a long-name entry are
/// rejected.
pub fn short_name(name: &str) -> Result<ShortName, FatError> {
    let invalid = || FatError::InvalidName(name.to_string());

    match name {
        "." => return Ok(padded(b".", b"", 0)),
        ".." => return Ok(padded(b"..", b"", 0)),
        _ => {}
    }

    let (base, ext) = match name.rfind('.') {
        Some(dot) => (&name[..dot], &name[dot + 1..]),
        None => (name, ""),
    };
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return Err(invalid());
    }
    if !base.bytes().chain(ext.bytes()).all(is_valid_char) {
        return Err(invalid());
    }

    let mut case = 0;
    if is_all_lower(base) {
        case |= CASE_LOWER_BASE;
    }
    if is_all_lower(ext) {
        case |= CASE_LOWER_EXT;
    }

    Ok(padded(
        base.to_ascii_uppercase().as_bytes(),
        ext.to_ascii_uppercase().as_bytes(),
        case,
    ))
}

fn padded(base: &[u8], ext: &[u8], case: u8) -> ShortName {
    let mut bytes = [b' '; 11];
    bytes[..base.len()].copy_from_slice(base);
    bytes[8..8 + ext.len()].copy_from_slice(ext);
    ShortName { bytes, case }
}

fn is_valid_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || SPECIAL_CHARS.contains(&c)
}

fn is_all_lower(part: &str) -> bool {
    part.bytes().any(|c| c.is_ascii_lowercase()) && !part.bytes().any(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_name_gets_case_bits() {
        let sn = short_name("ldlinux.sys").unwrap();
        assert_eq!(&sn.bytes, b"LDLINUX SYS");
        assert_eq!(sn.case, CASE_LOWER_BASE | CASE_LOWER_EXT);
    }

    #[test]
    fn test_uppercase_and_mixed_names() {
        let sn = short_name("LDLINUX.C32").unwrap();
        assert_eq!(&sn.bytes, b"LDLINUX C32");
        assert_eq!(sn.case, 0);

        let sn = short_name("Boot").unwrap();
        assert_eq!(&sn.bytes, b"BOOT       ");
        assert_eq!(sn.case, 0);
    }

    #[test]
    fn test_dot_entries() {
        assert_eq!(&short_name(".").unwrap().bytes, b".          ");
        assert_eq!(&short_name("..").unwrap().bytes, b"..         ");
    }

    #[test]
    fn test_rejects_long_and_invalid_names() {
        assert!(short_name("syslinux_cfg").is_err());
        assert!(short_name("a.conf").is_err());
        assert!(short_name(".hidden").is_err());
        assert!(short_name("two words").is_err());
        assert!(short_name("").is_err());
        assert!(short_name("don't!").is_ok());
    }
}

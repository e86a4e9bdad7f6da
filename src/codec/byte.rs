use std::fmt;

/// Renders a byte string the way keys and values are printed in diagnostics:
/// printable ASCII as is, everything else as `\xNN`.
pub struct Printable<'a>(pub &'a [u8]);

impl fmt::Display for Printable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in self.0 {
            if b == b'\\' {
                f.write_str("\\\\")?;
            } else if (0x20..0x7f).contains(&b) {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Printable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printable() {
        assert_eq!(Printable(b"Test Key1").to_string(), "Test Key1");
        assert_eq!(Printable(b"a\x00\xff").to_string(), "a\\x00\\xff");
        assert_eq!(Printable(b"back\\slash").to_string(), "back\\\\slash");
        assert_eq!(format!("{:?}", Printable(b"v")), "'v'");
    }
}

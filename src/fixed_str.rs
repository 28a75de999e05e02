//! NUL-padded fixed-capacity strings, the form names and consumer labels
//! take in the GPIO uAPI structs.

use std::ops::Deref;

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FixedStr<const N: usize> {
    s: [u8; N],
}

impl<const N: usize> FixedStr<N> {
    #[inline]
    pub const fn empty() -> Self {
        Self { s: [0; N] }
    }

    /// Copies `s` in; one byte is always kept for the kernel's terminating NUL.
    pub fn new(s: &str) -> Result<Self, FixedStrErr> {
        if s.len() >= N {
            return Err(FixedStrErr::CapacityOverflow {
                capacity: N - 1,
                required: s.len(),
            });
        }
        if s.as_bytes().contains(&0) {
            return Err(FixedStrErr::InteriorNul);
        }

        let mut f = Self::empty();
        f.s[..s.len()].copy_from_slice(s.as_bytes());
        Ok(f)
    }

    /// Takes a kernel-filled buffer, dropping anything after the first NUL.
    pub fn from_byte_array(mut bytes: [u8; N]) -> Result<Self, FixedStrErr> {
        let nul = bytes.iter().position(|c| *c == 0).unwrap_or(N);
        let _ = core::str::from_utf8(&bytes[..nul])?;
        bytes[nul..].fill(0);
        Ok(FixedStr { s: bytes })
    }

    /// Like [`FixedStr::from_byte_array`], but invalid UTF-8 is cut at the
    /// first bad byte instead of failing. Line names are informational.
    pub fn from_byte_array_lossy(bytes: [u8; N]) -> Self {
        match Self::from_byte_array(bytes) {
            Ok(s) => s,
            Err(_) => {
                let nul = bytes.iter().position(|c| *c == 0).unwrap_or(N);
                let valid = match core::str::from_utf8(&bytes[..nul]) {
                    Ok(s) => s.len(),
                    Err(e) => e.valid_up_to(),
                };
                let mut s = [0; N];
                s[..valid].copy_from_slice(&bytes[..valid]);
                FixedStr { s }
            }
        }
    }

    pub const fn into_byte_array(self) -> [u8; N] {
        self.s
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.s.iter().position(|c| *c == 0).unwrap_or(N)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.s[0] == 0
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // Construction only ever admits valid UTF-8 up to the first NUL.
        core::str::from_utf8(&self.s[..self.len()]).unwrap_or_default()
    }
}

impl<const N: usize> Default for FixedStr<N> {
    #[inline(always)]
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> std::fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FixedStr").field(&self.as_str()).finish()
    }
}

impl<const N: usize> std::fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

impl<const N: usize> Deref for FixedStr<N> {
    type Target = str;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FixedStrErr {
    #[error("Exceeded fixed string size: required {required} bytes with only {capacity} available")]
    CapacityOverflow { capacity: usize, required: usize },
    #[error("String contains an interior NUL byte")]
    InteriorNul,
    #[error("UTF8 Error")]
    Utf8(#[from] core::str::Utf8Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keeps_room_for_nul() {
        assert!(FixedStr::<8>::new("1234567").is_ok());
        assert_eq!(
            FixedStr::<8>::new("12345678"),
            Err(FixedStrErr::CapacityOverflow {
                capacity: 7,
                required: 8
            })
        );
    }

    #[test]
    fn kernel_buffer() {
        let mut raw = [0u8; 32];
        raw[..6].copy_from_slice(b"GPIO17");
        raw[7] = b'x';

        let s = FixedStr::from_byte_array(raw).unwrap();
        assert_eq!(s.as_str(), "GPIO17");
        assert!(!s.is_empty());
        assert!(FixedStr::<32>::empty().is_empty());
    }

    #[test]
    fn lossy_cuts_at_bad_byte() {
        let mut raw = [0u8; 8];
        raw[..4].copy_from_slice(&[b'a', b'b', 0xff, b'c']);
        assert_eq!(FixedStr::from_byte_array_lossy(raw).as_str(), "ab");
    }
}

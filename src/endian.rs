//! # Byte Order
//!
//! Leaf descriptors carry an [`Endianness`] id so a tree can describe data
//! produced on a foreign-endian machine. `Default` resolves to the machine
//! byte order at access time; readers and writers swap on the fly when the
//! descriptor disagrees with the machine.
//!
//! [`swap_in_place`] is the word-swap primitive used by `Node::endian_swap`:
//! it reverses each `element_bytes`-sized word of a buffer. Element widths
//! are restricted to the scalar widths canopy supports: 1, 2, 4 and 8 bytes.

use eyre::{bail, Result};

use crate::error::{ErrorKind, TreeError};

/// Byte-order id stored in leaf descriptors.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endianness {
    /// Resolves to the machine byte order at access time.
    #[default]
    Default = 0,
    Little = 1,
    Big = 2,
}

impl Endianness {
    /// The byte order of the machine this process runs on.
    pub fn machine() -> Endianness {
        #[cfg(target_endian = "little")]
        {
            Endianness::Little
        }
        #[cfg(target_endian = "big")]
        {
            Endianness::Big
        }
    }

    /// Resolves `Default` to the machine byte order; concrete ids pass through.
    pub fn resolve(self) -> Endianness {
        match self {
            Endianness::Default => Endianness::machine(),
            other => other,
        }
    }

    /// True when data tagged with this id can be read without swapping.
    pub fn matches_machine(self) -> bool {
        self.resolve() == Endianness::machine()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Endianness::Default => "default",
            Endianness::Little => "little",
            Endianness::Big => "big",
        }
    }

    pub fn from_name(name: &str) -> Result<Endianness> {
        match name {
            "default" => Ok(Endianness::Default),
            "little" => Ok(Endianness::Little),
            "big" => Ok(Endianness::Big),
            other => bail!(TreeError::new(
                ErrorKind::Schema,
                format!("unknown endianness '{other}'"),
            )),
        }
    }
}

/// Reverses each `element_bytes`-sized word of `bytes` in place.
///
/// `bytes.len()` must be a multiple of `element_bytes`, and `element_bytes`
/// must be one of 1, 2, 4 or 8.
pub fn swap_in_place(bytes: &mut [u8], element_bytes: usize) -> Result<()> {
    match element_bytes {
        1 => return Ok(()),
        2 | 4 | 8 => {}
        other => bail!(TreeError::new(
            ErrorKind::InvalidArgument,
            format!("cannot byte-swap elements of width {other}; expected 1, 2, 4 or 8"),
        )),
    }

    if bytes.len() % element_bytes != 0 {
        bail!(TreeError::new(
            ErrorKind::InvalidArgument,
            format!(
                "buffer length {} is not a multiple of element width {}",
                bytes.len(),
                element_bytes
            ),
        ));
    }

    for word in bytes.chunks_exact_mut(element_bytes) {
        word.reverse();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_resolves_to_machine_order() {
        assert_eq!(Endianness::Default.resolve(), Endianness::machine());
        assert!(Endianness::Default.matches_machine());
    }

    #[test]
    fn swap_reverses_each_word() {
        let mut buf = [0x01, 0x02, 0x03, 0x04];
        swap_in_place(&mut buf, 2).unwrap();
        assert_eq!(buf, [0x02, 0x01, 0x04, 0x03]);

        let mut buf = [0x01, 0x02, 0x03, 0x04];
        swap_in_place(&mut buf, 4).unwrap();
        assert_eq!(buf, [0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn swap_is_involutive() {
        let original = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut buf = original;
        swap_in_place(&mut buf, 8).unwrap();
        swap_in_place(&mut buf, 8).unwrap();
        assert_eq!(buf, original);
    }

    #[test]
    fn swap_rejects_unsupported_widths() {
        let mut buf = [0u8; 6];
        assert!(swap_in_place(&mut buf, 3).is_err());
        assert!(swap_in_place(&mut buf, 16).is_err());
    }

    #[test]
    fn swap_rejects_ragged_buffers() {
        let mut buf = [0u8; 5];
        assert!(swap_in_place(&mut buf, 2).is_err());
    }

    #[test]
    fn single_byte_swap_is_a_no_op() {
        let mut buf = [9u8, 8, 7];
        swap_in_place(&mut buf, 1).unwrap();
        assert_eq!(buf, [9, 8, 7]);
    }

    #[test]
    fn endianness_names_round_trip() {
        for e in [Endianness::Default, Endianness::Little, Endianness::Big] {
            assert_eq!(Endianness::from_name(e.name()).unwrap(), e);
        }
        assert!(Endianness::from_name("middle").is_err());
    }
}

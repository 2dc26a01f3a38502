//! Remote address handle

use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest plausible user-mode virtual address in the target
pub const MAX_USER_ADDRESS: u64 = 0x7FFF_FFFF_FFFF;

/// Address inside the target process. Never dereferenced locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteAddress(pub u64);

impl RemoteAddress {
    pub const NULL: RemoteAddress = RemoteAddress(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Non-null and inside the user-mode range
    pub const fn is_valid(self) -> bool {
        self.0 != 0 && self.0 <= MAX_USER_ADDRESS
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address `offset` bytes past this one
    pub const fn offset(self, offset: u64) -> Self {
        Self(self.0.wrapping_add(offset))
    }

    /// `Some(self)` when valid
    pub fn valid(self) -> Option<Self> {
        self.is_valid().then_some(self)
    }
}

impl From<u64> for RemoteAddress {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::LowerHex for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_bounds() {
        assert!(!RemoteAddress::NULL.is_valid());
        assert!(RemoteAddress(0x1000).is_valid());
        assert!(RemoteAddress(MAX_USER_ADDRESS).is_valid());
        assert!(!RemoteAddress(MAX_USER_ADDRESS + 1).is_valid());
        assert!(!RemoteAddress(u64::MAX).is_valid());
    }

    #[test]
    fn test_offset_and_display() {
        let addr = RemoteAddress(0x2000).offset(0x40);
        assert_eq!(addr.get(), 0x2040);
        assert_eq!(format!("{}", addr), "0x2040");
        assert_eq!(format!("{:x}", addr), "2040");
    }

    #[test]
    fn test_valid_option() {
        assert_eq!(RemoteAddress(0).valid(), None);
        assert_eq!(RemoteAddress(0x10).valid(), Some(RemoteAddress(0x10)));
    }
}

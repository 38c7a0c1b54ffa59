// src/identifier.rs
use std::fmt;

use ethers::types::{Address, Bytes, U256};
use ethers::utils::{keccak256, to_checksum};

pub const DEFAULT_LABEL: &str = "OnchainIdentifier";

/// A 20-byte marker taken from the last 20 bytes of `keccak256(label)`.
///
/// The marker carries no behavior. It is byte-identical wherever it is
/// embedded, so it can later be located in raw call data, event fields or
/// nonce keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OnchainIdentifier(Address);

impl OnchainIdentifier {
    pub fn from_label(label: &str) -> Self {
        let hash = keccak256(label.as_bytes());
        Self(Address::from_slice(&hash[12..32]))
    }

    pub fn address(&self) -> Address {
        self.0
    }

    /// The identifier read as a big-endian integer, for use as a salt
    /// nonce or a 4337 nonce key.
    pub fn as_uint(&self) -> U256 {
        U256::from_big_endian(self.0.as_bytes())
    }

    /// Appends the identifier after an already complete payload.
    pub fn append_to(&self, data: impl AsRef<[u8]>) -> Bytes {
        let data = data.as_ref();
        let mut out = Vec::with_capacity(data.len() + 20);
        out.extend_from_slice(data);
        out.extend_from_slice(self.0.as_bytes());
        Bytes::from(out)
    }

    /// Offset of the first occurrence of the identifier in `data`.
    pub fn find_in(&self, data: &[u8]) -> Option<usize> {
        data.windows(20).position(|window| window == self.0.as_bytes())
    }

    /// Splits a trailing identifier off `data`, returning the original payload.
    pub fn strip_suffix<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        data.strip_suffix(self.0.as_bytes())
    }
}

impl Default for OnchainIdentifier {
    fn default() -> Self {
        Self::from_label(DEFAULT_LABEL)
    }
}

impl From<OnchainIdentifier> for Address {
    fn from(id: OnchainIdentifier) -> Self {
        id.0
    }
}

impl fmt::Display for OnchainIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", to_checksum(&self.0, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_label_derivation() {
        let id = OnchainIdentifier::default();
        assert_eq!(
            hex::encode(id.address().as_bytes()),
            "7f17a8276389e19b375d35b4fa00991f641f0f3e"
        );
    }

    #[test]
    fn different_labels_differ() {
        assert_ne!(
            OnchainIdentifier::from_label("OnchainIdentifier"),
            OnchainIdentifier::from_label("onchainidentifier")
        );
    }

    #[test]
    fn as_uint_fits_in_160_bits() {
        let id = OnchainIdentifier::default();
        let value = id.as_uint();

        assert!(value.bits() <= 160);
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        assert_eq!(&bytes[12..], id.address().as_bytes());
    }

    #[test]
    fn appended_identifier_is_found_and_stripped() {
        let id = OnchainIdentifier::default();
        let payload = vec![0xab; 68];
        let tagged = id.append_to(&payload);

        assert_eq!(tagged.len(), 88);
        assert_eq!(id.find_in(&tagged), Some(68));
        assert_eq!(id.strip_suffix(&tagged), Some(payload.as_slice()));
    }

    #[test]
    fn missing_identifier_is_not_found() {
        let id = OnchainIdentifier::default();
        let payload = vec![0u8; 64];

        assert_eq!(id.find_in(&payload), None);
        assert_eq!(id.strip_suffix(&payload), None);
    }

    #[test]
    fn display_is_checksummed() {
        let id = OnchainIdentifier::default();
        let shown = id.to_string();

        assert!(shown.starts_with("0x"));
        assert_eq!(shown.to_lowercase(), format!("{:?}", id.address()));
    }
}

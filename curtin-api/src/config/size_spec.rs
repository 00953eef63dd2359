use serde::{Deserialize, Serialize};

use crate::constants::PARTITION_SIZE_GROW;
use crate::primitives::ByteCount;

/// A `partition`/`lvm_partition` size: either an explicit byte count or the
/// literal `"grow"`, meaning "fill all remaining space".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SizeSpec {
    Bytes(ByteCount),
    Grow,
}

impl<'de> Deserialize<'de> for SizeSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        if let serde_yaml::Value::String(ref s) = value {
            if s == PARTITION_SIZE_GROW {
                return Ok(SizeSpec::Grow);
            }
        }
        ByteCount::deserialize(value)
            .map(SizeSpec::Bytes)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grow() {
        let s: SizeSpec = serde_yaml::from_str("grow").unwrap();
        assert_eq!(s, SizeSpec::Grow);
    }

    #[test]
    fn test_bytes() {
        let s: SizeSpec = serde_yaml::from_str("3G").unwrap();
        assert_eq!(s, SizeSpec::Bytes(ByteCount(3 * 1024 * 1024 * 1024)));
    }
}

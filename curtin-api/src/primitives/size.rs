use std::{fmt::Display, num::ParseIntError, str::FromStr};

/// A byte count parsed from a power-of-two-suffixed size string (§4.2):
/// `B`, `k`/`K`/`kB` (1024), `M`, `G`, `T`. Bare digits are bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteCount(pub u64);

impl From<u64> for ByteCount {
    fn from(x: u64) -> Self {
        ByteCount(x)
    }
}

impl ByteCount {
    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn to_human_readable(&self) -> String {
        match self.0.trailing_zeros() {
            _ if self.0 == 0 => "0".to_owned(),
            0..=9 => format!("{}", self.0),
            10..=19 => format!("{}K", self.0 >> 10),
            20..=29 => format!("{}M", self.0 >> 20),
            30..=39 => format!("{}G", self.0 >> 30),
            _ => format!("{}T", self.0 >> 40),
        }
    }

    pub fn from_human_readable(s: &str) -> Result<Self, ParseIntError> {
        let s = s.trim();
        let try_parse = |val: &str, shift: u8| Ok(Self(val.trim().parse::<u64>()? << shift));
        // `kB` and `k` are both 1024 per the spec's normalization rule
        // (`kB == k == 1024`), not the SI 1000.
        if let Some(p) = s.strip_suffix("kB").or_else(|| s.strip_suffix("KB")) {
            try_parse(p, 10)
        } else if let Some(p) = s.strip_suffix('B') {
            try_parse(p, 0)
        } else if let Some(p) = s.strip_suffix('K').or_else(|| s.strip_suffix('k')) {
            try_parse(p, 10)
        } else if let Some(p) = s.strip_suffix('M').or_else(|| s.strip_suffix('m')) {
            try_parse(p, 20)
        } else if let Some(p) = s.strip_suffix('G').or_else(|| s.strip_suffix('g')) {
            try_parse(p, 30)
        } else if let Some(p) = s.strip_suffix('T').or_else(|| s.strip_suffix('t')) {
            try_parse(p, 40)
        } else {
            try_parse(s, 0)
        }
    }
}

impl Display for ByteCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}

impl FromStr for ByteCount {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_human_readable(s.trim())
    }
}

impl<'de> serde::Deserialize<'de> for ByteCount {
    fn deserialize<D>(deserializer: D) -> Result<ByteCount, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Sizes may be given as a string ("1K") or a bare number (1024);
        // serde only sees digits for the latter, so deserialize loosely
        // and branch on the resulting value kind.
        let value = serde_yaml::Value::deserialize(deserializer)?;
        match value {
            serde_yaml::Value::String(s) => ByteCount::from_str(s.as_str())
                .map_err(|e| serde::de::Error::custom(format!("invalid size '{s}': {e}"))),
            serde_yaml::Value::Number(n) => {
                let n = n.as_u64().ok_or_else(|| {
                    serde::de::Error::custom("invalid size, expected unsigned integer")
                })?;
                Ok(ByteCount(n))
            }
            _ => Err(serde::de::Error::custom("invalid size")),
        }
    }
}

impl serde::Serialize for ByteCount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if self.0 & 0x3FF != 0 {
            serializer.serialize_u64(self.0)
        } else {
            serializer.serialize_str(self.to_human_readable().as_str())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string_suffixes() {
        assert_eq!(ByteCount::from_str("1").unwrap(), ByteCount(1));
        assert_eq!(ByteCount::from_str("512B").unwrap(), ByteCount(512));
        assert_eq!(ByteCount::from_str("20K").unwrap(), ByteCount(20 * 1024));
        assert_eq!(ByteCount::from_str("20k").unwrap(), ByteCount(20 * 1024));
        assert_eq!(ByteCount::from_str("20kB").unwrap(), ByteCount(20 * 1024));
        assert_eq!(
            ByteCount::from_str("3M").unwrap(),
            ByteCount(3 * 1024 * 1024)
        );
        assert_eq!(
            ByteCount::from_str("3G").unwrap(),
            ByteCount(3 * 1024 * 1024 * 1024)
        );
        assert_eq!(
            ByteCount::from_str("1T").unwrap(),
            ByteCount(1024 * 1024 * 1024 * 1024)
        );
    }

    #[test]
    fn test_invalid() {
        assert!(ByteCount::from_str("1.0").is_err());
        assert!(ByteCount::from_str("X").is_err());
        assert!(ByteCount::from_str("1.0K").is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        #[derive(Debug, serde::Deserialize, serde::Serialize, PartialEq, Eq)]
        struct S {
            size: ByteCount,
        }
        let s: S = serde_yaml::from_str("size: 3G").unwrap();
        assert_eq!(s.size, ByteCount(3 * 1024 * 1024 * 1024));
        let s: S = serde_yaml::from_str("size: 3145728").unwrap();
        assert_eq!(s.size, ByteCount(3 * 1024 * 1024));
    }
}

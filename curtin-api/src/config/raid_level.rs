use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::Display;

/// `raidlevel` values the schema loader accepts (§4.2); the config field is
/// a bare integer (`raidlevel: 1`), not the `mdadm`/teacher `raidN` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RaidLevel {
    #[strum(serialize = "raid0")]
    Raid0,
    #[strum(serialize = "raid1")]
    Raid1,
    #[strum(serialize = "raid5")]
    Raid5,
    #[strum(serialize = "raid6")]
    Raid6,
    #[strum(serialize = "raid10")]
    Raid10,
}

impl RaidLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            RaidLevel::Raid0 => 0,
            RaidLevel::Raid1 => 1,
            RaidLevel::Raid5 => 5,
            RaidLevel::Raid6 => 6,
            RaidLevel::Raid10 => 10,
        }
    }

    pub fn from_u8(level: u8) -> Option<Self> {
        Some(match level {
            0 => RaidLevel::Raid0,
            1 => RaidLevel::Raid1,
            5 => RaidLevel::Raid5,
            6 => RaidLevel::Raid6,
            10 => RaidLevel::Raid10,
            _ => return None,
        })
    }

    /// The `mdadm --create --level=<L>` argument.
    pub fn mdadm_level_arg(self) -> &'static str {
        match self {
            RaidLevel::Raid0 => "0",
            RaidLevel::Raid1 => "1",
            RaidLevel::Raid5 => "5",
            RaidLevel::Raid6 => "6",
            RaidLevel::Raid10 => "10",
        }
    }
}

impl Serialize for RaidLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for RaidLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level = u8::deserialize(deserializer)?;
        RaidLevel::from_u8(level)
            .ok_or_else(|| D::Error::custom(format!("invalid raidlevel {level}, expected one of 0, 1, 5, 6, 10")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        for raw in [0u8, 1, 5, 6, 10] {
            let level = RaidLevel::from_u8(raw).unwrap();
            assert_eq!(level.as_u8(), raw);
        }
    }

    #[test]
    fn test_invalid() {
        assert!(RaidLevel::from_u8(2).is_none());
    }

    #[test]
    fn test_deserialize() {
        let level: RaidLevel = serde_yaml::from_str("1").unwrap();
        assert_eq!(level, RaidLevel::Raid1);
    }
}

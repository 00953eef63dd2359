use std::fmt;

use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use strum_macros::{EnumIter, IntoStaticStr};
use uuid::Uuid;

/// `flag` values a partition action may request (§4.5). `partition_type`
/// overrides `flag` when both are set, including the `boot`-implies-`0xEF`
/// MBR case (§9 open question, normative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, EnumIter)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PartitionFlag {
    Logical,
    Extended,
    Boot,
    BiosGrub,
    Swap,
    Lvm,
    Raid,
    Home,
    Prep,
    Msftres,
}

impl fmt::Display for PartitionFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", <&str>::from(*self))
    }
}

/// The ESP type GUID that `flag: boot` resolves to on GPT tables, and the
/// MBR partition type byte it resolves to on msdos tables.
pub const BOOT_FLAG_GPT_GUID: Uuid = Uuid::from_u128(0xc12a7328_f81f_11d2_ba4b_00a0c93ec93b);
pub const BOOT_FLAG_MBR_TYPE: u8 = 0xEF;

/// A raw `partition_type`: an MBR type byte or a GPT type GUID. Exactly one
/// representation is meaningful per table type; the loader resolves which
/// one applies once the owning disk's `ptable` is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionType {
    Mbr(u8),
    Gpt(Uuid),
}

impl PartitionType {
    pub fn to_str(self) -> String {
        match self {
            PartitionType::Mbr(byte) => format!("{byte:#04x}"),
            PartitionType::Gpt(uuid) => uuid.to_string(),
        }
    }

    pub fn try_from_str(s: &str) -> Result<Self, String> {
        let trimmed = s.trim();
        if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
            return u8::from_str_radix(hex, 16)
                .map(PartitionType::Mbr)
                .map_err(|e| format!("invalid MBR partition type '{s}': {e}"));
        }
        // Bare two-hex-digit form, as reported by `sfdisk -J` for `dos` tables
        // (e.g. "83", "ef"), with no "0x" prefix.
        if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            if let Ok(byte) = u8::from_str_radix(trimmed, 16) {
                return Ok(PartitionType::Mbr(byte));
            }
        }
        Uuid::parse_str(trimmed)
            .map(PartitionType::Gpt)
            .map_err(|e| format!("invalid partition type '{s}': not an MBR byte or a GUID ({e})"))
    }
}

impl Serialize for PartitionType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_str())
    }
}

impl<'de> Deserialize<'de> for PartitionType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PartitionType::try_from_str(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mbr_roundtrip() {
        let t = PartitionType::try_from_str("0x83").unwrap();
        assert_eq!(t, PartitionType::Mbr(0x83));
        assert_eq!(t.to_str(), "0x83");
    }

    #[test]
    fn test_bare_hex_mbr_type() {
        let t = PartitionType::try_from_str("83").unwrap();
        assert_eq!(t, PartitionType::Mbr(0x83));
    }

    #[test]
    fn test_gpt_roundtrip() {
        let t = PartitionType::try_from_str(&BOOT_FLAG_GPT_GUID.to_string()).unwrap();
        assert_eq!(t, PartitionType::Gpt(BOOT_FLAG_GPT_GUID));
    }

    #[test]
    fn test_bad_type() {
        assert!(PartitionType::try_from_str("not-a-type").is_err());
    }

    #[test]
    fn test_flag_display() {
        assert_eq!(PartitionFlag::BiosGrub.to_string(), "bios-grub");
    }
}

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Six-octet link address of an access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Bssid(pub [u8; 6]);

impl Bssid {
    /// All-zero address, used when the access point is not pinned.
    pub fn is_unset(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl FromStr for Bssid {
    type Err = anyhow::Error;

    /// Accepts `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: Vec<u8> = s
            .trim()
            .split(|c| c == ':' || c == '-')
            .map(|part| {
                if part.len() != 2 {
                    anyhow::bail!("invalid octet `{part}` in BSSID `{s}`");
                }
                u8::from_str_radix(part, 16)
                    .map_err(|_| anyhow::anyhow!("invalid octet `{part}` in BSSID `{s}`"))
            })
            .collect::<anyhow::Result<_>>()?;
        let octets: [u8; 6] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("BSSID `{s}` must have 6 octets"))?;
        Ok(Bssid(octets))
    }
}

impl fmt::Display for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl Serialize for Bssid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Bssid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Snapshot of the network under attack, as picked from a scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TargetNetwork {
    pub ssid: String,
    pub bssid: Bssid,
    #[serde(default = "default_channel")]
    pub channel: u32,
    /// Management-frame protection is enforced by the access point.
    #[serde(default)]
    pub pmf_required: bool,
}

fn default_channel() -> u32 {
    1
}

impl TargetNetwork {
    pub fn new(ssid: impl Into<String>, bssid: Bssid, channel: u32) -> Self {
        Self {
            ssid: ssid.into(),
            bssid,
            channel,
            pmf_required: false,
        }
    }
}

/// How a run ended when it did not fail.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", content = "passphrase", rename_all = "snake_case")]
pub enum SearchOutcome {
    Found(String),
    Exhausted,
    Cancelled,
}

impl SearchOutcome {
    pub fn passphrase(&self) -> Option<&str> {
        match self {
            SearchOutcome::Found(p) => Some(p),
            _ => None,
        }
    }
}

/// Result of one run, handed back to whoever started it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchReport {
    pub target: TargetNetwork,
    pub outcome: SearchOutcome,
    /// Candidates actually sent to the radio.
    pub tested: u64,
    /// Byte offset persisted at the end of the run.
    pub checkpoint: u64,
    pub started_at: String,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bssid_colon_and_dash() {
        let a: Bssid = "AA:bb:0C:dd:ee:01".parse().unwrap();
        let b: Bssid = "aa-BB-0c-DD-EE-01".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "aa:bb:0c:dd:ee:01");
    }

    #[test]
    fn reject_short_or_garbled_bssid() {
        assert!("aa:bb:cc:dd:ee".parse::<Bssid>().is_err());
        assert!("aa:bb:cc:dd:ee:zz".parse::<Bssid>().is_err());
        assert!("aabbccddeeff".parse::<Bssid>().is_err());
    }

    #[test]
    fn target_json_defaults() {
        let t: TargetNetwork =
            serde_json::from_str(r#"{"ssid":"HomeNet","bssid":"00:11:22:33:44:55"}"#).unwrap();
        assert_eq!(t.channel, 1);
        assert!(!t.pmf_required);
        assert_eq!(t.bssid.0, [0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let found = serde_json::to_value(SearchOutcome::Found("hunter22".into())).unwrap();
        assert_eq!(found["status"], "found");
        assert_eq!(found["passphrase"], "hunter22");
        let done = serde_json::to_value(SearchOutcome::Exhausted).unwrap();
        assert_eq!(done["status"], "exhausted");
    }
}

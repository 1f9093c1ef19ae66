// Signed port convention: magnitude is the physical port, sign marks reversed wiring

use serde::{Deserialize, Serialize};

/// A physical port plus whether the device on it is mechanically reversed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortSpec {
    pub index: u8,
    pub reversed: bool,
}

impl PortSpec {
    pub fn new(index: u8, reversed: bool) -> Self {
        Self { index, reversed }
    }

    /// Decode a signed port number. `-3` is port 3 reversed.
    ///
    /// Port 0 can't carry a sign, so a reversed port 0 has to be built with
    /// [`PortSpec::new`] (or the explicit form in the config file).
    pub fn decode(signed: i8) -> Self {
        Self {
            index: signed.unsigned_abs(),
            reversed: signed < 0,
        }
    }
}

/// Port as written in a config file: either `-3` or `{ "port": 3, "reversed": true }`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortConfig {
    Signed(i8),
    Explicit {
        port: u8,
        #[serde(default)]
        reversed: bool,
    },
}

impl From<PortConfig> for PortSpec {
    fn from(config: PortConfig) -> Self {
        match config {
            PortConfig::Signed(signed) => PortSpec::decode(signed),
            PortConfig::Explicit { port, reversed } => PortSpec::new(port, reversed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_sign_flips_reversal_only() {
        for p in [1i8, 7, 21, 127] {
            let forward = PortSpec::decode(p);
            let reversed = PortSpec::decode(-p);
            assert_eq!(forward.index, reversed.index);
            assert!(!forward.reversed);
            assert!(reversed.reversed);
        }
    }

    #[test]
    fn test_decode_min_value() {
        // -128 has no positive i8 counterpart but still decodes cleanly
        let spec = PortSpec::decode(i8::MIN);
        assert_eq!(spec.index, 128);
        assert!(spec.reversed);
    }

    #[test]
    fn test_port_config_forms() {
        let signed: PortConfig = serde_json::from_str("-4").unwrap();
        assert_eq!(PortSpec::from(signed), PortSpec::new(4, true));

        // Port 0 can only be reversed through the explicit form
        let explicit: PortConfig = serde_json::from_str(r#"{"port": 0, "reversed": true}"#).unwrap();
        assert_eq!(PortSpec::from(explicit), PortSpec::new(0, true));

        let defaulted: PortConfig = serde_json::from_str(r#"{"port": 9}"#).unwrap();
        assert_eq!(PortSpec::from(defaulted), PortSpec::new(9, false));
    }
}

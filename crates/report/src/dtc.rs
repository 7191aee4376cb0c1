//! Trouble-code descriptions

/// Looks up a human-readable description for a trouble code
pub trait DtcDescriber: Send + Sync {
    fn describe(&self, code: &str) -> String;
}

/// Describes a code by the vehicle system its first letter names
///
/// Only the system is identified; this is not a fault-code dictionary.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPrefixDescriber;

impl SystemPrefixDescriber {
    fn system(prefix: char) -> &'static str {
        match prefix {
            'P' => "Powertrain",
            'C' => "Chassis",
            'B' => "Body",
            'U' => "Network",
            _ => "Unknown",
        }
    }
}

impl DtcDescriber for SystemPrefixDescriber {
    fn describe(&self, code: &str) -> String {
        match code.chars().next() {
            Some(prefix) => format!("{} related issue (Code: {})", Self::system(prefix), code),
            None => "Unknown issue".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prefixes() {
        let d = SystemPrefixDescriber;
        assert_eq!(d.describe("P0301"), "Powertrain related issue (Code: P0301)");
        assert_eq!(d.describe("C1234"), "Chassis related issue (Code: C1234)");
        assert_eq!(d.describe("B0001"), "Body related issue (Code: B0001)");
        assert_eq!(d.describe("U0100"), "Network related issue (Code: U0100)");
        assert_eq!(d.describe("X9999"), "Unknown related issue (Code: X9999)");
        assert_eq!(d.describe(""), "Unknown issue");
    }
}

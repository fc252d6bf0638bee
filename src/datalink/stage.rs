//! Pipeline stages of a collect configuration's data link

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::DataLinkError;

/// Pipeline stage a collect configuration's data passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataLinkStage {
    Collecting,
    Transfer,
    Storage,
}

impl DataLinkStage {
    pub const ALL: [DataLinkStage; 3] = [
        DataLinkStage::Collecting,
        DataLinkStage::Transfer,
        DataLinkStage::Storage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataLinkStage::Collecting => "collecting",
            DataLinkStage::Transfer => "transfer",
            DataLinkStage::Storage => "storage",
        }
    }
}

impl FromStr for DataLinkStage {
    type Err = DataLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataLinkStage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| DataLinkError::UnknownStage(s.to_string()))
    }
}

impl std::fmt::Display for DataLinkStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stage() {
        assert_eq!("collecting".parse::<DataLinkStage>().unwrap(), DataLinkStage::Collecting);
        assert_eq!("storage".parse::<DataLinkStage>().unwrap(), DataLinkStage::Storage);
        assert!(matches!(
            "Collecting".parse::<DataLinkStage>(),
            Err(DataLinkError::UnknownStage(_))
        ));
    }

    #[test]
    fn test_stage_serde() {
        assert_eq!(serde_json::to_string(&DataLinkStage::Transfer).unwrap(), "\"transfer\"");
    }
}

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use chatbox_crypto::{Blake3Hash, HashFunction, Sha256Hash, SignaturePrefix};
use chatbox_proto::BoxedVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn function(self) -> Arc<dyn HashFunction> {
        match self {
            Self::Sha256 => Arc::new(Sha256Hash),
            Self::Blake3 => Arc::new(Blake3Hash),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxerConfig {
    /// Version used when boxing through `box_message`.
    pub boxed_version: BoxedVersion,
    pub hash: HashAlgorithm,
    pub signature_prefix: String,
}

impl Default for BoxerConfig {
    fn default() -> Self {
        Self {
            boxed_version: BoxedVersion::V1,
            hash: HashAlgorithm::Sha256,
            signature_prefix: SignaturePrefix::CHAT_HEADER.to_string(),
        }
    }
}

impl BoxerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.boxed_version == BoxedVersion::V2 {
            return Err(ConfigError::UnsupportedVersion(self.boxed_version));
        }
        self.prefix().map(|_| ())
    }

    pub fn prefix(&self) -> Result<SignaturePrefix, ConfigError> {
        SignaturePrefix::new(self.signature_prefix.clone())
            .map_err(|e| ConfigError::InvalidPrefix(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Boxing with {0} is not supported")]
    UnsupportedVersion(BoxedVersion),
    #[error("Invalid signature prefix: {0}")]
    InvalidPrefix(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_object_gives_defaults() {
        let config = BoxerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, BoxerConfig::default());
        assert_eq!(config.boxed_version, BoxedVersion::V1);
        assert_eq!(config.prefix().unwrap(), SignaturePrefix::chat_header());
    }

    #[test]
    fn partial_override() {
        let config =
            BoxerConfig::from_json_str(r#"{"hash":"blake3","boxed_version":0}"#).unwrap();
        assert_eq!(config.hash, HashAlgorithm::Blake3);
        assert_eq!(config.boxed_version, BoxedVersion::VNone);
        assert_eq!(config.hash.function().name(), "blake3");
    }

    #[test]
    fn rejects_reserved_version_and_bad_prefix() {
        assert!(matches!(
            BoxerConfig::from_json_str(r#"{"boxed_version":2}"#),
            Err(ConfigError::UnsupportedVersion(BoxedVersion::V2))
        ));
        assert!(matches!(
            BoxerConfig::from_json_str(r#"{"signature_prefix":""}"#),
            Err(ConfigError::InvalidPrefix(_))
        ));
        assert!(matches!(
            BoxerConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"signature_prefix":"chatbox-test-prefix"}}"#).unwrap();
        let config = BoxerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.prefix().unwrap().as_str(), "chatbox-test-prefix");
        assert!(matches!(
            BoxerConfig::from_json_file(file.path().with_extension("missing")),
            Err(ConfigError::Io(_))
        ));
    }
}

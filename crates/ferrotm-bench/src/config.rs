//! Runtime configuration loading

use crate::BenchError;
use ferrotm_core::StmConfig;
use std::path::Path;

/// Load a runtime configuration from a TOML file, or use defaults
pub fn load(path: Option<&Path>) -> Result<StmConfig, BenchError> {
    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => StmConfig::default(),
    };
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrotm_core::{Algorithm, ContentionPolicy};
    use std::io::Write;

    #[test]
    fn test_load_default() {
        let config = load(None).unwrap();
        assert_eq!(config, StmConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "algorithm = \"single-lock\"").unwrap();
        writeln!(file, "contention = \"hyper-aggressive\"").unwrap();
        writeln!(file, "max_threads = 8").unwrap();

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.algorithm, Algorithm::SingleLock);
        assert_eq!(config.contention, ContentionPolicy::HyperAggressive);
        assert_eq!(config.max_threads, 8);
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "algorithm = \"tl2\"").unwrap();
        assert!(matches!(load(Some(file.path())), Err(BenchError::ConfigParse(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load(Some(Path::new("/nonexistent/ftm.toml")));
        assert!(matches!(result, Err(BenchError::Io(_))));
    }
}

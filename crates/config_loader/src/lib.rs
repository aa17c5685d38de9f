//! 分流配置加载
//!
//! 读取 TOML/JSON 文件, 反序列化为 `FanoutConfig` 并在返回前完成校验。
//! 调用方拿到的配置总是通过了 [`ConfigLoader::validate`]。
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("fanout.toml")).unwrap();
//! println!("sinks: {}", config.sinks.len());
//! ```

mod parser;
mod validator;

pub use contracts::FanoutConfig;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// 按后缀识别格式后读取并校验
    ///
    /// # Errors
    /// 后缀不支持、读取失败、解析失败或校验失败
    pub fn load_from_path(path: &Path) -> Result<FanoutConfig, ContractError> {
        let format = ConfigFormat::detect(path)?;
        let content = std::fs::read_to_string(path)?;
        let config = Self::load_from_str(&content, format)?;
        debug!(
            path = %path.display(),
            format = format.label(),
            sinks = config.sinks.len(),
            "fanout config loaded"
        );
        Ok(config)
    }

    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<FanoutConfig, ContractError> {
        let config = format.parse(content)?;
        validator::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &FanoutConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    pub fn to_toml(config: &FanoutConfig) -> Result<String, ContractError> {
        ConfigFormat::Toml.render(config)
    }

    pub fn to_json(config: &FanoutConfig) -> Result<String, ContractError> {
        ConfigFormat::Json.render(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SinkKind;

    const MINIMAL_TOML: &str = r#"
queue_capacity = 8

[[sinks]]
name = "original"
kind = "accumulate"

[[sinks]]
name = "frame"
kind = "process"
[sinks.process]
program = "ffmpeg"
args = ["-i", "pipe:0", "pipe:1"]
timeout_ms = 5000
[sinks.process.env]
AV_LOG_FORCE_NOCOLOR = "1"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.sinks.len(), 2);
        assert_eq!(config.sinks[1].kind, SinkKind::Process);
        assert_eq!(config.sinks[1].process.as_ref().unwrap().timeout_ms, 5000);
    }

    #[test]
    fn test_round_trip_toml() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&config).unwrap();
        let config2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(config.sinks.len(), config2.sinks.len());
        assert_eq!(config.sinks[1].process, config2.sinks[1].process);
    }

    #[test]
    fn test_round_trip_json() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&config).unwrap();
        let config2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(config.sinks[0].name, config2.sinks[0].name);
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fanout.toml");
        std::fs::write(&path, MINIMAL_TOML).unwrap();
        let config = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(config.sinks[0].name, "original");

        let bad = dir.path().join("fanout.yaml");
        std::fs::write(&bad, "sinks: []").unwrap();
        let err = ConfigLoader::load_from_path(&bad).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[[sinks]]
name = "copy"
kind = "accumulate"

[[sinks]]
name = "copy"
kind = "accumulate"
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }
}

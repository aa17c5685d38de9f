//! 配置校验模块
//!
//! 校验规则：
//! - 至少一个 sink
//! - sink name 非空且唯一
//! - process sink 必须带 program，timeout_ms > 0
//! - accumulate sink 不允许带 process 段
//! - queue_capacity / chunk_size > 0

use std::collections::HashSet;

use contracts::{ContractError, FanoutConfig, SinkConfig, SinkKind};

/// 校验 FanoutConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &FanoutConfig) -> Result<(), ContractError> {
    validate_limits(config)?;
    validate_sink_names(config)?;
    for (idx, sink) in config.sinks.iter().enumerate() {
        validate_sink_kind(idx, sink)?;
    }
    Ok(())
}

/// 校验队列与分块参数
fn validate_limits(config: &FanoutConfig) -> Result<(), ContractError> {
    if config.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "queue_capacity",
            "queue_capacity must be > 0",
        ));
    }
    if config.chunk_size == 0 {
        return Err(ContractError::config_validation(
            "chunk_size",
            "chunk_size must be > 0",
        ));
    }
    Ok(())
}

/// 校验 sink name 非空且唯一
fn validate_sink_names(config: &FanoutConfig) -> Result<(), ContractError> {
    if config.sinks.is_empty() {
        return Err(ContractError::configuration("at least one sink is required"));
    }

    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if sink.name == "." || sink.name == ".." || sink.name.contains(['/', '\\']) {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name must be usable as a file name",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
    }
    Ok(())
}

/// 校验 sink 类型与 process 段是否匹配
fn validate_sink_kind(idx: usize, sink: &SinkConfig) -> Result<(), ContractError> {
    match (sink.kind, &sink.process) {
        (SinkKind::Accumulate, None) => Ok(()),
        (SinkKind::Accumulate, Some(_)) => Err(ContractError::config_validation(
            format!("sinks[{}].process", idx),
            "accumulate sink does not take a process section",
        )),
        (SinkKind::Process, None) => Err(ContractError::config_validation(
            format!("sinks[{}].process", idx),
            "process sink requires a process section",
        )),
        (SinkKind::Process, Some(spec)) => {
            if spec.program.trim().is_empty() {
                return Err(ContractError::config_validation(
                    format!("sinks[{}].process.program", idx),
                    "program cannot be empty",
                ));
            }
            if spec.timeout_ms == 0 {
                return Err(ContractError::config_validation(
                    format!("sinks[{}].process.timeout_ms", idx),
                    "timeout_ms must be > 0",
                ));
            }
            Ok(())
        }
    }
}

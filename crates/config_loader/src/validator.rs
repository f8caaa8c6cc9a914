//! 配置校验模块
//!
//! 校验规则：
//! - (source_id, sub_stream_id) 唯一
//! - expected_rate / simulated_rate 有限且 > 0
//! - rate_tolerance 在 (0, 1) 区间
//! - window_length_ms > 0
//! - primary 已注册且配置了同步通道
//! - display_buffer_capacity > 0

use std::collections::HashSet;

use contracts::{ContractError, SyncBlueprint};

/// 校验 SyncBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &SyncBlueprint) -> Result<(), ContractError> {
    validate_stream_keys(blueprint)?;
    validate_stream_rates(blueprint)?;
    validate_sync_settings(blueprint)?;
    validate_primary(blueprint)?;
    Ok(())
}

/// 校验数据流标识唯一性
fn validate_stream_keys(blueprint: &SyncBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for stream in &blueprint.streams {
        if !seen.insert(stream.key()) {
            return Err(ContractError::config_validation(
                format!("streams[{}]", stream.key()),
                "duplicate stream key",
            ));
        }
    }
    Ok(())
}

/// 校验采样率
fn validate_stream_rates(blueprint: &SyncBlueprint) -> Result<(), ContractError> {
    for stream in &blueprint.streams {
        let rate = stream.expected_rate;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ContractError::config_validation(
                format!("streams[{}].expected_rate", stream.key()),
                format!("expected_rate must be > 0, got {rate}"),
            ));
        }
        if let Some(simulated) = stream.simulated_rate {
            if !simulated.is_finite() || simulated <= 0.0 {
                return Err(ContractError::config_validation(
                    format!("streams[{}].simulated_rate", stream.key()),
                    format!("simulated_rate must be > 0, got {simulated}"),
                ));
            }
        }
    }
    Ok(())
}

/// 校验同步窗口与容差
fn validate_sync_settings(blueprint: &SyncBlueprint) -> Result<(), ContractError> {
    let sync = &blueprint.sync;

    if !sync.window_length_ms.is_finite() || sync.window_length_ms <= 0.0 {
        return Err(ContractError::config_validation(
            "sync.window_length_ms",
            format!(
                "window_length_ms must be > 0, got {}",
                sync.window_length_ms
            ),
        ));
    }

    if !(sync.rate_tolerance > 0.0 && sync.rate_tolerance < 1.0) {
        return Err(ContractError::config_validation(
            "sync.rate_tolerance",
            format!(
                "rate_tolerance must be in (0, 1), got {}",
                sync.rate_tolerance
            ),
        ));
    }

    if sync.display_buffer_capacity == 0 {
        return Err(ContractError::config_validation(
            "sync.display_buffer_capacity",
            "display_buffer_capacity must be > 0",
        ));
    }

    Ok(())
}

/// 校验主时钟存在且可接收同步脉冲
fn validate_primary(blueprint: &SyncBlueprint) -> Result<(), ContractError> {
    let Some(primary) = blueprint.sync.primary else {
        return Ok(());
    };

    let Some(stream) = blueprint.stream(primary) else {
        return Err(ContractError::config_validation(
            "sync.primary",
            format!("primary stream '{primary}' not found in streams"),
        ));
    };

    if stream.sync_channel.is_none() {
        return Err(ContractError::config_validation(
            "sync.primary",
            format!("primary stream '{primary}' has no sync_channel"),
        ));
    }

    Ok(())
}

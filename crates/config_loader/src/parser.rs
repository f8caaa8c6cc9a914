//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::{ContractError, StreamKey, SyncBlueprint};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 数据流条目必填字段
const REQUIRED_STREAM_FIELDS: [&str; 3] = ["source_id", "sub_stream_id", "expected_rate"];

/// 解析 TOML 格式配置
///
/// 类型化解析失败时，再按无类型文档定位出错的数据流条目。
pub fn parse_toml(content: &str) -> Result<SyncBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| {
        let location = toml::from_str::<toml::Table>(content)
            .ok()
            .and_then(|table| serde_json::to_value(table).ok())
            .and_then(|doc| locate_stream_error(&doc));
        parse_error("TOML", location, e)
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<SyncBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| {
        let location = serde_json::from_str::<serde_json::Value>(content)
            .ok()
            .and_then(|doc| locate_stream_error(&doc));
        parse_error("JSON", location, e)
    })
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<SyncBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

fn parse_error<E>(format: &str, location: Option<String>, e: E) -> ContractError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = match location {
        Some(location) => format!("{format} parse error at {location}: {e}"),
        None => format!("{format} parse error: {e}"),
    };
    ContractError::ConfigParse {
        message,
        source: Some(Box::new(e)),
    }
}

/// 找出第一个缺字段或字段类型错误的数据流条目
///
/// 能读出 (source_id, sub_stream_id) 时以流键命名，否则用数组下标。
fn locate_stream_error(doc: &serde_json::Value) -> Option<String> {
    let streams = doc.get("streams")?.as_array()?;
    streams.iter().enumerate().find_map(|(i, entry)| {
        let id = |field: &str| {
            entry
                .get(field)
                .and_then(serde_json::Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
        };
        let label = match (id("source_id"), id("sub_stream_id")) {
            (Some(source), Some(sub)) => format!("stream {}", StreamKey::new(source, sub)),
            _ => format!("streams[{i}]"),
        };

        if let Some(field) = REQUIRED_STREAM_FIELDS
            .iter()
            .find(|field| entry.get(**field).is_none())
        {
            return Some(format!("{label} (missing `{field}`)"));
        }
        if !entry["expected_rate"].is_number() {
            return Some(format!("{label} (`expected_rate` is not a number)"));
        }
        match entry.get("sync_channel") {
            Some(channel) if channel.as_u64().and_then(|c| u32::try_from(c).ok()).is_none() => {
                Some(format!("{label} (`sync_channel` is not a channel index)"))
            }
            _ => None,
        }
    })
}

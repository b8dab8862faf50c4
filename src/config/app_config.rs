// ==========================================
// 食品询价管理 - 应用配置文件
// ==========================================
// 格式: JSON
// - 文件不存在: 写入默认配置
// - 文件存在: 按字段覆盖默认值（缺失/非法字段保持默认）
// - 文件无法解析: 使用默认值，不覆盖原文件
// ==========================================

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    /// 为空时使用 app::get_default_db_path()
    pub path: String,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// 单次导入超时（秒）
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub log: LogConfig,
    pub db: DbConfig,
    pub import: ImportConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log: LogConfig {
                level: "info".to_string(),
            },
            db: DbConfig {
                path: String::new(),
                busy_timeout_ms: crate::db::DEFAULT_BUSY_TIMEOUT_MS,
            },
            import: ImportConfig { timeout_secs: 120 },
        }
    }
}

// ===== 文件中的原始结构（全部可选） =====
#[derive(Debug, Default, Deserialize)]
struct RawLog {
    level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDb {
    path: Option<String>,
    busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawImport {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAppConfig {
    #[serde(default)]
    log: RawLog,
    #[serde(default)]
    db: RawDb,
    #[serde(default)]
    import: RawImport,
}

/// 加载结果
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    /// 本次是否新写入了默认配置文件
    pub created: bool,
}

impl AppConfig {
    /// 从 JSON 文件加载配置
    ///
    /// # 参数
    /// - path: 配置文件路径
    ///
    /// # 返回
    /// - Ok(LoadedConfig): 合并后的配置
    /// - Err: 写入默认配置失败
    pub fn load(path: &Path) -> anyhow::Result<LoadedConfig> {
        if !path.exists() {
            let config = AppConfig::default();
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(path, serde_json::to_string_pretty(&config)?)?;
            info!(path = %path.display(), "已写入默认配置");
            return Ok(LoadedConfig {
                config,
                created: true,
            });
        }

        let contents = fs::read_to_string(path)?;
        let config = match serde_json::from_str::<RawAppConfig>(&contents) {
            Ok(raw) => AppConfig::default().merged(raw),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "配置文件无法解析，使用默认配置");
                AppConfig::default()
            }
        };
        Ok(LoadedConfig {
            config,
            created: false,
        })
    }

    fn merged(mut self, raw: RawAppConfig) -> Self {
        if let Some(level) = raw.log.level.filter(|v| !v.trim().is_empty()) {
            self.log.level = level.trim().to_string();
        }
        if let Some(path) = raw.db.path.filter(|v| !v.trim().is_empty()) {
            self.db.path = path.trim().to_string();
        }
        if let Some(ms) = raw.db.busy_timeout_ms.filter(|v| *v > 0) {
            self.db.busy_timeout_ms = ms;
        }
        if let Some(secs) = raw.import.timeout_secs.filter(|v| *v > 0) {
            self.import.timeout_secs = secs;
        }
        self
    }
}

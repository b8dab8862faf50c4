// ==========================================
// 食品询价管理 - 配置层
// ==========================================
// 职责:
// - 应用配置文件（日志级别、数据库、导入超时）
// - 导入规则（表头约定），可由 config_kv 覆写
// ==========================================

pub mod app_config;
pub mod config_manager;
pub mod import_rules;

pub use app_config::{AppConfig, DbConfig, ImportConfig, LoadedConfig, LogConfig};
pub use config_manager::{config_keys, ConfigManager};
pub use import_rules::{ImportRules, ImportRulesReader, StaticImportRules};

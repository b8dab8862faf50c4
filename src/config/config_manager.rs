// ==========================================
// 食品询价管理 - 配置管理器
// ==========================================
// 职责: 读取/写入 config_kv（scope_id='global'），覆写导入规则
// ==========================================

use crate::config::import_rules::{ImportRules, ImportRulesReader};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// config_kv 中的导入规则键
pub mod config_keys {
    pub const ANCHOR_HEADER: &str = "import/anchor_header";
    pub const REQUIRED_HEADERS: &str = "import/required_headers";
    pub const MARKET_HEADERS: &str = "import/market_headers";
    pub const GUIDE_PRICE_HEADER: &str = "import/guide_price_header";
    pub const HEADER_SCAN_ROWS: &str = "import/header_scan_rows";
}

type BoxError = Box<dyn Error + Send + Sync>;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, BoxError> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, BoxError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), BoxError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 所有 global 配置
    pub fn list_global(&self) -> Result<HashMap<String, String>, BoxError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(rows)
    }

    /// 在默认规则上应用 config_kv 覆写
    ///
    /// 格式错误的值记录告警并忽略，不中断导入。
    pub fn load_import_rules(&self) -> Result<ImportRules, BoxError> {
        let mut rules = ImportRules::default();

        if let Some(v) = self.non_blank(config_keys::ANCHOR_HEADER)? {
            rules.anchor_header = v;
        }
        if let Some(v) = self.non_blank(config_keys::GUIDE_PRICE_HEADER)? {
            rules.guide_price_header = v;
        }
        if let Some(list) = self.string_list(config_keys::REQUIRED_HEADERS)? {
            rules.required_headers = list;
        }
        if let Some(list) = self.string_list(config_keys::MARKET_HEADERS)? {
            if list.len() == 3 {
                rules.market_headers = list;
            } else {
                warn!(key = config_keys::MARKET_HEADERS, len = list.len(), "询价市场列必须为 3 个，忽略覆写");
            }
        }
        if let Some(v) = self.non_blank(config_keys::HEADER_SCAN_ROWS)? {
            match v.parse::<usize>() {
                Ok(n) if n > 0 => rules.header_scan_rows = n,
                _ => warn!(key = config_keys::HEADER_SCAN_ROWS, value = %v, "配置值无效，忽略"),
            }
        }

        Ok(rules)
    }

    fn non_blank(&self, key: &str) -> Result<Option<String>, BoxError> {
        Ok(self
            .get_global_config_value(key)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }

    fn string_list(&self, key: &str) -> Result<Option<Vec<String>>, BoxError> {
        let Some(raw) = self.non_blank(key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(list) => {
                let list: Vec<String> = list
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                Ok(if list.is_empty() { None } else { Some(list) })
            }
            Err(e) => {
                warn!(key = %key, error = %e, "配置值不是 JSON 字符串数组，忽略");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl ImportRulesReader for ConfigManager {
    async fn get_import_rules(&self) -> Result<ImportRules, BoxError> {
        self.load_import_rules()
    }
}

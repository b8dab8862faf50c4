// ==========================================
// 食品询价管理 - 应用状态
// ==========================================
// 职责: 建库、种子数据、组装仓储与 API 实例
// ==========================================

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::{ImportApi, OrgApi};
use crate::config::{AppConfig, ConfigManager};
use crate::db::{init_schema, open_sqlite_connection_with_timeout};
use crate::repository::{
    ensure_defaults, EntityResolver, InquiryRepository, OrganizationRepository, SeedReport,
};

/// 应用状态
///
/// 共享连接用于查询类仓储；导入每次请求单独开连接。
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 本次启动的种子数据结果
    pub seed_report: SeedReport,

    /// 配置管理器（导入规则覆写）
    pub config_manager: Arc<ConfigManager>,

    /// 实体解析（供单条维护使用）
    pub entity_resolver: Arc<EntityResolver>,

    /// 询价导入API
    pub import_api: Arc<ImportApi>,

    /// 机构/询价查询API
    pub org_api: Arc<OrgApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - config: 应用配置（超时、busy_timeout）
    pub fn new(db_path: String, config: &AppConfig) -> anyhow::Result<Self> {
        tracing::info!(db_path = %db_path, "初始化AppState");

        let mut conn = open_sqlite_connection_with_timeout(&db_path, config.db.busy_timeout_ms)?;
        init_schema(&conn)?;
        let seed_report = ensure_defaults(&mut conn)?;
        let conn = Arc::new(Mutex::new(conn));

        let config_manager = Arc::new(ConfigManager::from_connection(conn.clone()));
        let org_repo = Arc::new(OrganizationRepository::from_connection(conn.clone()));
        let inquiry_repo = Arc::new(InquiryRepository::from_connection(conn.clone()));
        let entity_resolver = Arc::new(EntityResolver::from_connection(conn));

        let import_api = Arc::new(
            ImportApi::new(db_path.clone(), config_manager.clone())
                .with_timeout(Duration::from_secs(config.import.timeout_secs))
                .with_busy_timeout_ms(config.db.busy_timeout_ms),
        );
        let org_api = Arc::new(OrgApi::new(org_repo, inquiry_repo));

        Ok(Self {
            db_path,
            seed_report,
            config_manager,
            entity_resolver,
            import_api,
            org_api,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 FOODAPP_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("FOODAPP_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./foodapp_inquiry.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("foodapp-inquiry");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("foodapp_inquiry.db");
        }
    }
    path.to_string_lossy().to_string()
}

/// 获取默认配置文件路径
pub fn get_default_config_path() -> std::path::PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("foodapp-inquiry").join("config.json"))
        .unwrap_or_else(|| std::path::PathBuf::from("./foodapp_inquiry.json"))
}

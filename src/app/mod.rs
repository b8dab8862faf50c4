// ==========================================
// 食品询价管理 - 应用层
// ==========================================
// 职责: 组装仓储与 API，供 CLI 使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_config_path, get_default_db_path, AppState};

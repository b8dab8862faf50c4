// ==========================================
// 食品询价管理 - API 层
// ==========================================
// 职责: 提供异步业务接口，供 CLI/上层服务调用
// ==========================================

pub mod error;
pub mod import_api;
pub mod org_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use import_api::{ImportApi, DEFAULT_IMPORT_TIMEOUT};
pub use org_api::OrgApi;

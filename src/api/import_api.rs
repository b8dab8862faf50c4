// ==========================================
// 食品询价管理 - 询价导入API
// ==========================================
// 职责: 异步入口，导入在阻塞线程池中执行
// 约束: 每次请求独立连接；超时/取消通过 ImportContext 协作生效
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::import_rules::ImportRulesReader;
use crate::db::{open_sqlite_connection_with_timeout, DEFAULT_BUSY_TIMEOUT_MS};
use crate::domain::inquiry::ImportSummary;
use crate::importer::{ImportContext, InquiryImporter};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// 默认导入超时
pub const DEFAULT_IMPORT_TIMEOUT: Duration = Duration::from_secs(120);

/// 询价导入API
pub struct ImportApi {
    db_path: String,
    rules_reader: Arc<dyn ImportRulesReader>,
    timeout: Duration,
    busy_timeout_ms: u64,
}

impl ImportApi {
    /// 创建新的ImportApi实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - rules_reader: 导入规则来源（通常为 ConfigManager）
    pub fn new(db_path: String, rules_reader: Arc<dyn ImportRulesReader>) -> Self {
        Self {
            db_path,
            rules_reader,
            timeout: DEFAULT_IMPORT_TIMEOUT,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }

    /// 从文件导入询价表
    pub async fn import_inquiry_file(
        &self,
        org_id: &str,
        file_path: &Path,
    ) -> ApiResult<ImportSummary> {
        let is_xlsx = file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("xlsx"))
            .unwrap_or(false);
        if !is_xlsx {
            return Err(ApiError::InvalidInput(format!(
                "当前仅支持 .xlsx 格式文件导入: {}",
                file_path.display()
            )));
        }
        let bytes = tokio::fs::read(file_path).await.map_err(|e| {
            ApiError::InvalidInput(format!("读取文件失败 {}: {}", file_path.display(), e))
        })?;
        self.import_inquiry(org_id, bytes).await
    }

    /// 导入询价表（使用API级超时）
    pub async fn import_inquiry(&self, org_id: &str, bytes: Vec<u8>) -> ApiResult<ImportSummary> {
        self.import_inquiry_with_cancel(org_id, bytes, CancellationToken::new())
            .await
    }

    /// 导入询价表，调用方可通过令牌取消
    ///
    /// # 返回
    /// - Ok(ImportSummary): 已提交
    /// - Err(ApiError::Cancelled): 超时或被取消，已回滚
    #[instrument(skip(self, bytes, cancel), fields(org_id = %org_id, size = bytes.len()))]
    pub async fn import_inquiry_with_cancel(
        &self,
        org_id: &str,
        bytes: Vec<u8>,
        cancel: CancellationToken,
    ) -> ApiResult<ImportSummary> {
        if org_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("org_id 不能为空".to_string()));
        }

        let rules = self
            .rules_reader
            .get_import_rules()
            .await
            .map_err(|e| ApiError::InternalError(format!("读取导入规则失败: {}", e)))?;

        let ctx = ImportContext::new()
            .with_timeout(self.timeout)
            .with_cancel_token(cancel);
        let db_path = self.db_path.clone();
        let busy_timeout_ms = self.busy_timeout_ms;
        let org = org_id.to_string();

        let handle = tokio::task::spawn_blocking(move || -> ApiResult<ImportSummary> {
            let conn = open_sqlite_connection_with_timeout(&db_path, busy_timeout_ms)
                .map_err(|e| ApiError::DatabaseError(format!("打开数据库失败: {}", e)))?;
            let importer =
                InquiryImporter::from_connection(Arc::new(Mutex::new(conn))).with_rules(rules);
            Ok(importer.import_with_context(&ctx, &org, &bytes)?)
        });

        let summary = handle
            .await
            .map_err(|e| ApiError::InternalError(format!("导入任务异常终止: {}", e)))?
            .map_err(|e| {
                warn!(error = %e, "询价导入失败");
                e
            })?;

        info!(
            inquiry_id = %summary.inquiry_id,
            rows = summary.total_rows(),
            elapsed_ms = summary.elapsed_ms,
            "询价导入成功"
        );
        Ok(summary)
    }
}

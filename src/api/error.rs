// ==========================================
// 食品询价管理 - API层错误类型
// ==========================================
// 职责: 将仓储/导入错误转换为调用方可识别的错误
// 约束: 错误信息保留定位（sheet/行/列）
// ==========================================

use crate::importer::error::{ImportError, ImportErrorKind};
use crate::repository::error::RepositoryError;
use serde::Serialize;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ===== 业务规则错误 =====
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 导入被拒绝（结构/数据行/分配前提），未写入任何数据
    #[error("导入被拒绝[{kind:?}]: {message}")]
    ImportRejected {
        kind: ImportErrorKind,
        message: String,
    },

    #[error("导入超时或已取消")]
    Cancelled,

    // ===== 数据访问错误 =====
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 稳定的错误码（供 CLI 输出/前端映射）
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::ImportRejected { kind, .. } => match kind {
                ImportErrorKind::Structural => "IMPORT_STRUCTURAL",
                ImportErrorKind::DataRow => "IMPORT_DATA_ROW",
                ImportErrorKind::AllocationPrecondition => "ALLOCATION_PRECONDITION",
                _ => "IMPORT_REJECTED",
            },
            ApiError::Cancelled => "CANCELLED",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::DatabaseTransactionError(_) => "DATABASE_TRANSACTION_ERROR",
            ApiError::InternalError(_) | ApiError::Other(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// 序列化后的错误
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg)
            | RepositoryError::UniqueConstraintViolation(msg)
            | RepositoryError::ForeignKeyViolation(msg) => ApiError::DatabaseError(msg),
            err @ RepositoryError::AllocationPrecondition { .. } => ApiError::ImportRejected {
                kind: ImportErrorKind::AllocationPrecondition,
                message: err.to_string(),
            },
            err @ RepositoryError::SequenceExhausted { .. } => {
                ApiError::DatabaseError(err.to_string())
            }
            RepositoryError::ValidationError(msg) => ApiError::InvalidInput(msg),
        }
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        let kind = err.kind();
        match kind {
            ImportErrorKind::Cancelled => ApiError::Cancelled,
            ImportErrorKind::Input => ApiError::InvalidInput(err.to_string()),
            ImportErrorKind::Structural
            | ImportErrorKind::DataRow
            | ImportErrorKind::AllocationPrecondition => ApiError::ImportRejected {
                kind,
                message: err.to_string(),
            },
            ImportErrorKind::Persistence => match err {
                ImportError::Repository {
                    source: RepositoryError::NotFound { entity, id },
                    ..
                } => ApiError::NotFound(format!("{}(id={})不存在", entity, id)),
                other => ApiError::DatabaseError(other.to_string()),
            },
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

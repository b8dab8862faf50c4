// ==========================================
// 食品询价管理 - 导入模块错误类型
// ==========================================
// 分类:
// - Structural: 标题/表头/列结构不合法，未写入任何数据
// - DataRow: 数据行缺少必填字段，整个事务回滚
// - AllocationPrecondition: 机构 code/sort 不满足派生条件
// - Persistence: 数据库失败，整个事务回滚
// 工具: thiserror 派生宏
// ==========================================

use crate::repository::error::RepositoryError;
use serde::Serialize;
use thiserror::Error;

/// 错误大类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportErrorKind {
    Structural,
    DataRow,
    AllocationPrecondition,
    Persistence,
    Cancelled,
    Input,
}

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 工作簿结构错误 =====
    #[error("工作簿解析失败: {0}")]
    Workbook(String),

    #[error("工作簿中没有可导入的工作表")]
    EmptyWorkbook,

    #[error("标题格式错误 ({title}): {reason}")]
    InvalidTitle { title: String, reason: String },

    #[error("sheet {sheet}: 未找到包含“品名”的表头行")]
    HeaderNotFound { sheet: String },

    #[error("sheet {sheet}: 缺少必需列 {column}")]
    MissingColumn { sheet: String, column: String },

    #[error("sheet {sheet}: 缺少询价列 {column}")]
    MissingMarketColumn { sheet: String, column: String },

    #[error("sheet {sheet}: 供应商列重复 {column}")]
    DuplicateSupplierColumn { sheet: String, column: String },

    #[error("sheet {sheet}: 未找到供应商结算价列")]
    NoSupplierColumn { sheet: String },

    // ===== 数据行错误 =====
    #[error("sheet {sheet} 第{row}行: {message}")]
    DataRow {
        sheet: String,
        row: usize,
        message: String,
    },

    // ===== 仓储错误（带定位信息） =====
    #[error("{context}: {source}")]
    Repository {
        context: String,
        #[source]
        source: RepositoryError,
    },

    // ===== 调用方错误 =====
    #[error("导入已取消或超时")]
    Cancelled,

    #[error("输入无效: {0}")]
    InvalidInput(String),
}

impl ImportError {
    /// 错误大类
    pub fn kind(&self) -> ImportErrorKind {
        match self {
            ImportError::Workbook(_)
            | ImportError::EmptyWorkbook
            | ImportError::InvalidTitle { .. }
            | ImportError::HeaderNotFound { .. }
            | ImportError::MissingColumn { .. }
            | ImportError::MissingMarketColumn { .. }
            | ImportError::DuplicateSupplierColumn { .. }
            | ImportError::NoSupplierColumn { .. } => ImportErrorKind::Structural,
            ImportError::DataRow { .. } => ImportErrorKind::DataRow,
            ImportError::Repository { source, .. } => match source {
                RepositoryError::AllocationPrecondition { .. } => {
                    ImportErrorKind::AllocationPrecondition
                }
                // 解析器返回的空名称校验错误属于数据行问题
                RepositoryError::ValidationError(_) => ImportErrorKind::DataRow,
                _ => ImportErrorKind::Persistence,
            },
            ImportError::Cancelled => ImportErrorKind::Cancelled,
            ImportError::InvalidInput(_) => ImportErrorKind::Input,
        }
    }

    /// 为仓储错误附加定位信息
    pub fn repository(context: impl Into<String>, source: RepositoryError) -> Self {
        ImportError::Repository {
            context: context.into(),
            source,
        }
    }
}

impl From<RepositoryError> for ImportError {
    fn from(source: RepositoryError) -> Self {
        ImportError::Repository {
            context: "导入".to_string(),
            source,
        }
    }
}

impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::from(RepositoryError::from(err))
    }
}

impl From<zip::result::ZipError> for ImportError {
    fn from(err: zip::result::ZipError) -> Self {
        ImportError::Workbook(err.to_string())
    }
}

impl From<quick_xml::Error> for ImportError {
    fn from(err: quick_xml::Error) -> Self {
        ImportError::Workbook(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;

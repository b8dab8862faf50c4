// ==========================================
// 食品询价管理 - 核心库
// ==========================================
// 职责: 询价表导入、实体解析、机构内编码分配
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问与编码分配
pub mod repository;

// 导入层 - 工作簿解析与导入编排
pub mod importer;

// 配置层 - 配置文件与导入规则
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 状态组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    Category, Goods, GoodsAvgDetail, GoodsPrice, ImportSummary, Market, Organization,
    PriceInquiry, SheetSummary, Supplier, TenDay,
};

// 仓储
pub use repository::{
    CodeSequenceAllocator, EntityResolver, InquiryRepository, OrganizationRepository,
    RepositoryError,
};

// 导入
pub use importer::{
    ImportContext, ImportError, ImportValidator, InquiryImporter, OoxmlWorkbookParser,
    WorkbookParser,
};

// API
pub use api::{ApiError, ImportApi, OrgApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "食品询价管理";

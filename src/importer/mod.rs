// ==========================================
// 食品询价管理 - 导入层
// ==========================================
// 职责: 询价工作簿解析、结构校验、事务内写入
// 支持: .xlsx（OOXML 直读 / calamine）
// ==========================================

// 模块声明
pub mod calamine_parser;
pub mod data_cleaner;
pub mod error;
pub mod import_validator;
pub mod inquiry_importer;
pub mod workbook_parser;

// 重导出核心类型
pub use calamine_parser::CalamineWorkbookParser;
pub use error::{ImportError, ImportErrorKind, ImportResult};
pub use import_validator::{
    parse_supplier_header, ImportValidator, MarketColumn, SheetLayout, SupplierColumn, TitleInfo,
};
pub use inquiry_importer::{ImportContext, InquiryImporter};
pub use workbook_parser::{
    locate_header, HeaderRow, OoxmlWorkbookParser, Sheet, Workbook, WorkbookParser,
};

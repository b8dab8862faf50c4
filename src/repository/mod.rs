// ==========================================
// 食品询价管理 - 数据仓储层
// ==========================================
// 红线: Repository 不含导入编排逻辑
// 约束: 所有查询使用参数化
// ==========================================

pub mod code_allocator;
pub mod entity_resolver;
pub mod error;
pub mod inquiry_repo;
pub mod organization_repo;
pub mod search_key;
pub mod seed;

// 重导出核心仓储
pub use code_allocator::{AllocatedCode, CodeSequenceAllocator, OrgNamespace};
pub use entity_resolver::{EntityResolver, Resolved};
pub use error::{RepositoryError, RepositoryResult};
pub use inquiry_repo::{InquiryRepository, InquiryTableCounts};
pub use organization_repo::OrganizationRepository;
pub use search_key::pinyin_key;
pub use seed::{ensure_defaults, SeedReport, DEFAULT_CATEGORIES, DEFAULT_ORG_ID};

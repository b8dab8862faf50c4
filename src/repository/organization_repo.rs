// ==========================================
// 食品询价管理 - 机构仓储
// ==========================================
// 新机构: sort = 已有机构 sort 的最小缺口, code = 两位补零 sort
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::organization::Organization;
use crate::repository::code_allocator::first_gap;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::search_key::pinyin_key;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

pub struct OrganizationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OrganizationRepository {
    /// 创建新的 OrganizationRepository 实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<Organization> {
        Ok(Organization {
            id: row.get(0)?,
            name: row.get(1)?,
            code: row.get(2)?,
            parent_id: row.get(3)?,
            description: row.get(4)?,
            sort: row.get(5)?,
            is_deleted: row.get::<_, i64>(6)? != 0,
            pinyin: row.get(7)?,
        })
    }

    /// 新建机构
    ///
    /// # 参数
    /// - name: 机构名称（非空）
    /// - parent_id: 上级机构；为 None 时指向自身
    /// - description: 描述
    ///
    /// # 返回
    /// 新机构（已分配 code/sort）
    pub fn create(
        &self,
        name: &str,
        parent_id: Option<&str>,
        description: &str,
    ) -> RepositoryResult<Organization> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RepositoryError::ValidationError("机构名称不能为空".to_string()));
        }

        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        // 已删除机构的 sort 同样保留，code 全局唯一
        let used: BTreeSet<i64> = {
            let mut stmt = tx.prepare("SELECT sort FROM base_org")?;
            let sorts = stmt
                .query_map([], |row| row.get::<_, i64>(0))?
                .collect::<rusqlite::Result<BTreeSet<i64>>>()?;
            sorts
        };
        let sort = first_gap(&used);

        let id = Uuid::new_v4().to_string();
        let org = Organization {
            parent_id: parent_id.map(str::to_string).unwrap_or_else(|| id.clone()),
            id,
            name: name.to_string(),
            code: Organization::code_from_sort(sort),
            description: description.to_string(),
            sort,
            pinyin: pinyin_key(name),
            is_deleted: false,
        };

        if parent_id.is_some() {
            let parent_exists: bool = tx
                .query_row(
                    "SELECT 1 FROM base_org WHERE id = ?1 AND is_deleted = 0",
                    params![org.parent_id],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if !parent_exists {
                return Err(RepositoryError::NotFound {
                    entity: "Organization".to_string(),
                    id: org.parent_id.clone(),
                });
            }
        }

        tx.execute(
            "INSERT INTO base_org (id, name, code, parent_id, description, sort, pinyin)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                org.id,
                org.name,
                org.code,
                org.parent_id,
                org.description,
                org.sort,
                org.pinyin
            ],
        )?;
        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        info!(org_id = %org.id, code = %org.code, sort = org.sort, "新建机构");
        Ok(org)
    }

    /// 按主键查询（含已删除）
    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Organization>> {
        let conn = self.get_conn()?;
        let org = conn
            .query_row(
                "SELECT id, name, code, parent_id, description, sort, is_deleted, pinyin
                 FROM base_org WHERE id = ?1",
                params![id],
                Self::map_row,
            )
            .optional()?;
        Ok(org)
    }

    /// 列出有效机构，按 sort 升序
    pub fn list_active(&self) -> RepositoryResult<Vec<Organization>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, code, parent_id, description, sort, is_deleted, pinyin
             FROM base_org WHERE is_deleted = 0 ORDER BY sort ASC",
        )?;
        let orgs = stmt
            .query_map([], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orgs)
    }
}

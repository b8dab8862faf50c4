// ==========================================
// 食品询价管理 - 机构与询价查询API
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::inquiry::{GoodsAvgDetail, GoodsPrice, PriceInquiry};
use crate::domain::organization::Organization;
use crate::repository::{InquiryRepository, InquiryTableCounts, OrganizationRepository};
use std::sync::Arc;

/// 机构API
pub struct OrgApi {
    org_repo: Arc<OrganizationRepository>,
    inquiry_repo: Arc<InquiryRepository>,
}

impl OrgApi {
    pub fn new(org_repo: Arc<OrganizationRepository>, inquiry_repo: Arc<InquiryRepository>) -> Self {
        Self {
            org_repo,
            inquiry_repo,
        }
    }

    /// 新建机构（code/sort 自动分配）
    ///
    /// # 参数
    /// - name: 机构名称
    /// - parent_id: 上级机构 id，None 表示顶级
    /// - description: 描述，可为空
    pub fn create_org(
        &self,
        name: &str,
        parent_id: Option<&str>,
        description: Option<&str>,
    ) -> ApiResult<Organization> {
        if name.trim().is_empty() {
            return Err(ApiError::InvalidInput("机构名称不能为空".to_string()));
        }
        Ok(self
            .org_repo
            .create(name, parent_id, description.unwrap_or(""))?)
    }

    pub fn get_org(&self, org_id: &str) -> ApiResult<Organization> {
        self.org_repo
            .find_by_id(org_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Organization(id={})不存在", org_id)))
    }

    pub fn list_orgs(&self) -> ApiResult<Vec<Organization>> {
        Ok(self.org_repo.list_active()?)
    }

    /// 询价单及其明细
    pub fn get_inquiry(
        &self,
        inquiry_id: &str,
    ) -> ApiResult<(PriceInquiry, Vec<GoodsAvgDetail>, Vec<GoodsPrice>)> {
        let inquiry = self
            .inquiry_repo
            .find_inquiry(inquiry_id)?
            .ok_or_else(|| ApiError::NotFound(format!("PriceInquiry(id={})不存在", inquiry_id)))?;
        let details = self.inquiry_repo.list_avg_details(inquiry_id)?;
        let prices = self.inquiry_repo.list_goods_prices(inquiry_id)?;
        Ok((inquiry, details, prices))
    }

    /// 机构下各表行数
    pub fn table_counts(&self, org_id: &str) -> ApiResult<InquiryTableCounts> {
        Ok(self.inquiry_repo.count_rows(org_id)?)
    }
}

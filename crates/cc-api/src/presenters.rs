//! # Response Presenters
//!
//! JSON shapes for the two API generations:
//!
//! - v3 resources carry `links` and lists use a `pagination` block with
//!   `first`/`last`/`next`/`previous` hrefs.
//! - v2 resources are split into `metadata` and `entity` and lists carry
//!   `prev_url`/`next_url`.

use cc_core::{Guid, RouteMapping, ServiceBinding};
use cc_store::{Page, Pagination};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Link {
    pub href: String,
}

impl Link {
    fn to(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }
}

// ---------------------------------------------------------------------------
// v3 route mappings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RouteMappingLinks {
    #[serde(rename = "self")]
    pub self_link: Link,
    pub app: Link,
    pub route: Link,
    pub process: Link,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RouteMappingResponse {
    pub guid: String,
    pub app_port: Option<i32>,
    pub process_type: String,
    pub created_at: DateTime<Utc>,
    pub links: RouteMappingLinks,
}

pub fn route_mapping_path(guid: &Guid) -> String {
    format!("/v3/route_mappings/{guid}")
}

impl From<&RouteMapping> for RouteMappingResponse {
    fn from(mapping: &RouteMapping) -> Self {
        let app = &mapping.app_guid;
        Self {
            guid: mapping.guid.to_string(),
            app_port: mapping.app_port,
            process_type: mapping.process_type.clone(),
            created_at: mapping.created_at,
            links: RouteMappingLinks {
                self_link: Link::to(route_mapping_path(&mapping.guid)),
                app: Link::to(format!("/v3/apps/{app}")),
                route: Link::to(format!("/v2/routes/{}", mapping.route_guid)),
                process: Link::to(format!(
                    "/v3/apps/{app}/processes/{}",
                    mapping.process_type
                )),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaginationInfo {
    pub total_results: u64,
    pub total_pages: u64,
    pub first: Link,
    pub last: Link,
    pub next: Option<Link>,
    pub previous: Option<Link>,
}

impl PaginationInfo {
    /// `base_path` is the list endpoint without query string.
    pub fn new(base_path: &str, total_results: u64, pagination: Pagination) -> Self {
        let per_page = pagination.per_page;
        let total_pages = total_results.div_ceil(u64::from(per_page.max(1)));
        let last_page = total_pages.max(1);
        let page = u64::from(pagination.page);
        let href = |page: u64| Link::to(format!("{base_path}?page={page}&per_page={per_page}"));
        Self {
            total_results,
            total_pages,
            first: href(1),
            last: href(last_page),
            next: (page < last_page).then(|| href(page + 1)),
            previous: (page > 1).then(|| href((page - 1).min(last_page))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RouteMappingList {
    pub pagination: PaginationInfo,
    pub resources: Vec<RouteMappingResponse>,
}

impl RouteMappingList {
    pub fn new(base_path: &str, page: &Page<RouteMapping>, pagination: Pagination) -> Self {
        Self {
            pagination: PaginationInfo::new(base_path, page.total_results, pagination),
            resources: page.resources.iter().map(RouteMappingResponse::from).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// v2 service bindings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct V2Metadata {
    pub guid: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ServiceBindingEntity {
    pub app_guid: String,
    pub service_instance_guid: String,
    #[schema(value_type = Object)]
    pub credentials: serde_json::Value,
    #[schema(value_type = Object)]
    pub binding_options: serde_json::Value,
    #[schema(value_type = Option<Object>)]
    pub gateway_data: Option<serde_json::Value>,
    pub gateway_name: String,
    pub syslog_drain_url: Option<String>,
    pub app_url: String,
    pub service_instance_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ServiceBindingResponse {
    pub metadata: V2Metadata,
    pub entity: ServiceBindingEntity,
}

pub fn service_binding_path(guid: &Guid) -> String {
    format!("/v2/service_bindings/{guid}")
}

impl From<&ServiceBinding> for ServiceBindingResponse {
    fn from(binding: &ServiceBinding) -> Self {
        Self {
            metadata: V2Metadata {
                guid: binding.guid.to_string(),
                url: service_binding_path(&binding.guid),
                created_at: binding.created_at,
            },
            entity: ServiceBindingEntity {
                app_guid: binding.app_guid.to_string(),
                service_instance_guid: binding.service_instance_guid.to_string(),
                credentials: binding.credentials.clone(),
                binding_options: binding.binding_options.clone(),
                gateway_data: binding.gateway_data.clone(),
                gateway_name: binding.gateway_name.clone(),
                syslog_drain_url: binding.syslog_drain_url.clone(),
                app_url: format!("/v2/apps/{}", binding.app_guid),
                service_instance_url: format!(
                    "/v2/service_instances/{}",
                    binding.service_instance_guid
                ),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ServiceBindingList {
    pub total_results: u64,
    pub total_pages: u64,
    pub prev_url: Option<String>,
    pub next_url: Option<String>,
    pub resources: Vec<ServiceBindingResponse>,
}

impl ServiceBindingList {
    /// `filter_query` is the non-paging part of the query string, already
    /// encoded, e.g. `app_guid=abc`.
    pub fn new(
        filter_query: &str,
        page: &Page<ServiceBinding>,
        pagination: Pagination,
    ) -> Self {
        let total_pages = page.total_pages(pagination.per_page);
        let current = u64::from(pagination.page);
        let url = |page: u64| {
            let mut url = format!(
                "/v2/service_bindings?page={page}&per_page={}",
                pagination.per_page
            );
            if !filter_query.is_empty() {
                url.push('&');
                url.push_str(filter_query);
            }
            url
        };
        Self {
            total_results: page.total_results,
            total_pages,
            prev_url: (current > 1).then(|| url(current - 1)),
            next_url: (current < total_pages).then(|| url(current + 1)),
            resources: page
                .resources
                .iter()
                .map(ServiceBindingResponse::from)
                .collect(),
        }
    }
}

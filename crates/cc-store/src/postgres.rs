//! Postgres [`Store`] backend via SQLx.
//!
//! Fixture tables (`apps`, `routes`, `service_instances`, ...) are read-only
//! here. Unique, foreign-key and check violations are mapped back to
//! [`ValidationErrors`] by constraint name (see `migrations/0001_initial.sql`),
//! so callers see the same field sets the in-memory backend reports.

use std::time::Duration;

use async_trait::async_trait;
use cc_core::{
    App, AuditEvent, BrokerEndpoint, Guid, Process, ProcessRouteMapping, Route, RouteMapping,
    ServiceBinding, ServiceInstance, ServiceInstanceKind, Space, SpaceRole, SpaceRoleKind,
    ValidationErrors, ValidationKind,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

use crate::{
    Page, Pagination, ResourceCounts, RouteMappingFilter, ServiceBindingFilter, Store,
    StoreError, StoreTransaction, PROCESS_ROUTE_MAPPING_KEY, ROUTE_MAPPING_KEY,
    SERVICE_BINDING_KEY,
};

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` when no URL is configured (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool(database_url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = database_url else {
        tracing::warn!(
            "DATABASE_URL not set; running in-memory only mode. \
             State will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Map a constraint name to the validation failure it represents.
fn constraint_violation(constraint: &str) -> Option<ValidationErrors> {
    let (fields, kind): (&[&'static str], ValidationKind) = match constraint {
        "route_mappings_app_route_process_type_key" => (&ROUTE_MAPPING_KEY, ValidationKind::Unique),
        "route_mappings_app_guid_fkey" => (&["app"], ValidationKind::Presence),
        "route_mappings_route_guid_fkey" => (&["route"], ValidationKind::Presence),
        "route_mappings_app_port_check" => (&["app_port"], ValidationKind::Range),
        "process_route_mappings_pkey" => (&PROCESS_ROUTE_MAPPING_KEY, ValidationKind::Unique),
        "process_route_mappings_process_guid_fkey" => (&["process"], ValidationKind::Presence),
        "process_route_mappings_route_guid_fkey" => (&["route"], ValidationKind::Presence),
        "service_bindings_app_service_instance_key" => {
            (&SERVICE_BINDING_KEY, ValidationKind::Unique)
        }
        "service_bindings_app_guid_fkey" => (&["app"], ValidationKind::Presence),
        "service_bindings_service_instance_guid_fkey" => {
            (&["service_instance"], ValidationKind::Presence)
        }
        _ => return None,
    };
    Some(ValidationErrors::single(fields, kind))
}

/// Classify a SQLx error, turning known constraint violations into
/// [`StoreError::Validation`].
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(errors) = db.constraint().and_then(constraint_violation) {
            return StoreError::Validation(errors);
        }
    }
    StoreError::Database(err.to_string())
}

fn guid_strings(guids: &Option<Vec<Guid>>) -> Option<Vec<String>> {
    guids
        .as_ref()
        .map(|v| v.iter().map(|g| g.as_str().to_owned()).collect())
}

fn limit_offset(pagination: Pagination) -> (i64, i64) {
    (
        i64::from(pagination.per_page),
        i64::try_from(pagination.offset()).unwrap_or(i64::MAX),
    )
}

#[derive(sqlx::FromRow)]
struct SpaceRow {
    guid: String,
    name: String,
    organization_guid: String,
}

#[derive(sqlx::FromRow)]
struct AppRow {
    guid: String,
    name: String,
    space_guid: String,
}

#[derive(sqlx::FromRow)]
struct ProcessRow {
    guid: String,
    app_guid: String,
    process_type: String,
}

#[derive(sqlx::FromRow)]
struct RouteRow {
    guid: String,
    host: String,
    path: String,
    space_guid: String,
}

#[derive(sqlx::FromRow)]
struct ServiceInstanceRow {
    guid: String,
    name: String,
    space_guid: String,
    bindable: bool,
    kind: String,
    broker_url: Option<String>,
    broker_username: Option<String>,
    broker_password: Option<String>,
    service_id: Option<String>,
    plan_id: Option<String>,
    credentials: Value,
    syslog_drain_url: Option<String>,
}

impl ServiceInstanceRow {
    fn into_model(self) -> Result<ServiceInstance, StoreError> {
        let kind = match self.kind.as_str() {
            "managed" => {
                let missing = || {
                    StoreError::Serialization(format!(
                        "managed service instance {} has no broker configuration",
                        self.guid
                    ))
                };
                ServiceInstanceKind::Managed {
                    broker: BrokerEndpoint {
                        url: self.broker_url.clone().ok_or_else(missing)?,
                        username: self.broker_username.clone().unwrap_or_default(),
                        password: self.broker_password.clone().unwrap_or_default(),
                    },
                    service_id: self.service_id.clone().ok_or_else(missing)?,
                    plan_id: self.plan_id.clone().ok_or_else(missing)?,
                }
            }
            "user_provided" => ServiceInstanceKind::UserProvided {
                credentials: self.credentials,
                syslog_drain_url: self.syslog_drain_url,
            },
            other => {
                return Err(StoreError::Serialization(format!(
                    "unknown service instance kind: {other}"
                )))
            }
        };
        Ok(ServiceInstance {
            guid: Guid::from(self.guid),
            name: self.name,
            space_guid: Guid::from(self.space_guid),
            bindable: self.bindable,
            kind,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SpaceRoleRow {
    user_guid: String,
    space_guid: String,
    role: String,
}

#[derive(sqlx::FromRow)]
struct RouteMappingRow {
    guid: String,
    app_guid: String,
    route_guid: String,
    process_type: String,
    app_port: Option<i32>,
    created_at: DateTime<Utc>,
}

impl From<RouteMappingRow> for RouteMapping {
    fn from(row: RouteMappingRow) -> Self {
        Self {
            guid: Guid::from(row.guid),
            app_guid: Guid::from(row.app_guid),
            route_guid: Guid::from(row.route_guid),
            process_type: row.process_type,
            app_port: row.app_port,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ServiceBindingRow {
    guid: String,
    app_guid: String,
    service_instance_guid: String,
    binding_options: Value,
    credentials: Value,
    syslog_drain_url: Option<String>,
    gateway_name: String,
    gateway_data: Option<Value>,
    created_at: DateTime<Utc>,
}

impl From<ServiceBindingRow> for ServiceBinding {
    fn from(row: ServiceBindingRow) -> Self {
        Self {
            guid: Guid::from(row.guid),
            app_guid: Guid::from(row.app_guid),
            service_instance_guid: Guid::from(row.service_instance_guid),
            binding_options: row.binding_options,
            credentials: row.credentials,
            syslog_drain_url: row.syslog_drain_url,
            gateway_name: row.gateway_name,
            gateway_data: row.gateway_data,
            created_at: row.created_at,
        }
    }
}

const ROUTE_MAPPING_COLUMNS: &str =
    "rm.guid, rm.app_guid, rm.route_guid, rm.process_type, rm.app_port, rm.created_at";

const SERVICE_BINDING_COLUMNS: &str = "sb.guid, sb.app_guid, sb.service_instance_guid, \
     sb.binding_options, sb.credentials, sb.syslog_drain_url, sb.gateway_name, \
     sb.gateway_data, sb.created_at";

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await.map_err(classify)?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn find_space(&self, guid: &Guid) -> Result<Option<Space>, StoreError> {
        let row = sqlx::query_as::<_, SpaceRow>(
            "SELECT guid, name, organization_guid FROM spaces WHERE guid = $1",
        )
        .bind(guid.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        Ok(row.map(|r| Space {
            guid: Guid::from(r.guid),
            name: r.name,
            organization_guid: Guid::from(r.organization_guid),
        }))
    }

    async fn find_app(&self, guid: &Guid) -> Result<Option<App>, StoreError> {
        let row = sqlx::query_as::<_, AppRow>("SELECT guid, name, space_guid FROM apps WHERE guid = $1")
            .bind(guid.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        Ok(row.map(|r| App {
            guid: Guid::from(r.guid),
            name: r.name,
            space_guid: Guid::from(r.space_guid),
        }))
    }

    async fn find_route(&self, guid: &Guid) -> Result<Option<Route>, StoreError> {
        let row = sqlx::query_as::<_, RouteRow>(
            "SELECT guid, host, path, space_guid FROM routes WHERE guid = $1",
        )
        .bind(guid.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        Ok(row.map(|r| Route {
            guid: Guid::from(r.guid),
            host: r.host,
            path: r.path,
            space_guid: Guid::from(r.space_guid),
        }))
    }

    async fn find_process(
        &self,
        app_guid: &Guid,
        process_type: &str,
    ) -> Result<Option<Process>, StoreError> {
        let row = sqlx::query_as::<_, ProcessRow>(
            "SELECT guid, app_guid, process_type FROM processes
             WHERE app_guid = $1 AND process_type = $2",
        )
        .bind(app_guid.as_str())
        .bind(process_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        Ok(row.map(|r| Process {
            guid: Guid::from(r.guid),
            app_guid: Guid::from(r.app_guid),
            process_type: r.process_type,
        }))
    }

    async fn find_service_instance(
        &self,
        guid: &Guid,
    ) -> Result<Option<ServiceInstance>, StoreError> {
        let row = sqlx::query_as::<_, ServiceInstanceRow>(
            "SELECT guid, name, space_guid, bindable, kind, broker_url, broker_username,
                    broker_password, service_id, plan_id, credentials, syslog_drain_url
             FROM service_instances WHERE guid = $1",
        )
        .bind(guid.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        row.map(ServiceInstanceRow::into_model).transpose()
    }

    async fn space_roles_for(&self, user_guid: &Guid) -> Result<Vec<SpaceRole>, StoreError> {
        let rows = sqlx::query_as::<_, SpaceRoleRow>(
            "SELECT user_guid, space_guid, role FROM space_roles WHERE user_guid = $1",
        )
        .bind(user_guid.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        rows.into_iter()
            .map(|r| {
                let role = SpaceRoleKind::parse(&r.role).ok_or_else(|| {
                    StoreError::Serialization(format!("unknown space role: {}", r.role))
                })?;
                Ok(SpaceRole {
                    user_guid: Guid::from(r.user_guid),
                    space_guid: Guid::from(r.space_guid),
                    role,
                })
            })
            .collect()
    }

    async fn find_route_mapping(&self, guid: &Guid) -> Result<Option<RouteMapping>, StoreError> {
        let row = sqlx::query_as::<_, RouteMappingRow>(&format!(
            "SELECT {ROUTE_MAPPING_COLUMNS} FROM route_mappings rm WHERE rm.guid = $1"
        ))
        .bind(guid.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        Ok(row.map(RouteMapping::from))
    }

    async fn list_route_mappings(
        &self,
        filter: &RouteMappingFilter,
        pagination: Pagination,
    ) -> Result<Page<RouteMapping>, StoreError> {
        let app_guid = filter.app_guid.as_ref().map(Guid::as_str);
        let spaces = guid_strings(&filter.space_guids);
        let (limit, offset) = limit_offset(pagination);

        const WHERE: &str = "FROM route_mappings rm JOIN apps a ON a.guid = rm.app_guid
             WHERE ($1::text IS NULL OR rm.app_guid = $1)
               AND ($2::text[] IS NULL OR a.space_guid = ANY($2))";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {WHERE}"))
            .bind(app_guid)
            .bind(&spaces)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;

        let rows = sqlx::query_as::<_, RouteMappingRow>(&format!(
            "SELECT {ROUTE_MAPPING_COLUMNS} {WHERE}
             ORDER BY rm.created_at, rm.guid LIMIT $3 OFFSET $4"
        ))
        .bind(app_guid)
        .bind(&spaces)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        Ok(Page {
            total_results: u64::try_from(total).unwrap_or_default(),
            resources: rows.into_iter().map(RouteMapping::from).collect(),
        })
    }

    async fn find_service_binding(
        &self,
        guid: &Guid,
    ) -> Result<Option<ServiceBinding>, StoreError> {
        let row = sqlx::query_as::<_, ServiceBindingRow>(&format!(
            "SELECT {SERVICE_BINDING_COLUMNS} FROM service_bindings sb WHERE sb.guid = $1"
        ))
        .bind(guid.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        Ok(row.map(ServiceBinding::from))
    }

    async fn list_service_bindings(
        &self,
        filter: &ServiceBindingFilter,
        pagination: Pagination,
    ) -> Result<Page<ServiceBinding>, StoreError> {
        let app_guid = filter.app_guid.as_ref().map(Guid::as_str);
        let instance_guid = filter.service_instance_guid.as_ref().map(Guid::as_str);
        let spaces = guid_strings(&filter.space_guids);
        let (limit, offset) = limit_offset(pagination);

        const WHERE: &str = "FROM service_bindings sb JOIN apps a ON a.guid = sb.app_guid
             WHERE ($1::text IS NULL OR sb.app_guid = $1)
               AND ($2::text IS NULL OR sb.service_instance_guid = $2)
               AND ($3::text[] IS NULL OR a.space_guid = ANY($3))";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {WHERE}"))
            .bind(app_guid)
            .bind(instance_guid)
            .bind(&spaces)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;

        let rows = sqlx::query_as::<_, ServiceBindingRow>(&format!(
            "SELECT {SERVICE_BINDING_COLUMNS} {WHERE}
             ORDER BY sb.created_at, sb.guid LIMIT $4 OFFSET $5"
        ))
        .bind(app_guid)
        .bind(instance_guid)
        .bind(&spaces)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        Ok(Page {
            total_results: u64::try_from(total).unwrap_or_default(),
            resources: rows.into_iter().map(ServiceBinding::from).collect(),
        })
    }

    async fn count_binding_associations(&self, binding_guid: &Guid) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM service_binding_associations WHERE service_binding_guid = $1",
        )
        .bind(binding_guid.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn validate_service_binding(&self, binding: &ServiceBinding) -> Result<(), StoreError> {
        binding.validate()?;
        let mut errors = ValidationErrors::new();

        let app = self.find_app(&binding.app_guid).await?;
        let instance = self
            .find_service_instance(&binding.service_instance_guid)
            .await?;
        if app.is_none() {
            errors.add(&["app"], ValidationKind::Presence);
        }
        if instance.is_none() {
            errors.add(&["service_instance"], ValidationKind::Presence);
        }
        if let (Some(app), Some(instance)) = (&app, &instance) {
            if app.space_guid != instance.space_guid {
                errors.add(&["service_instance"], ValidationKind::SpaceMismatch);
            }
        }

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM service_bindings
                            WHERE app_guid = $1 AND service_instance_guid = $2)",
        )
        .bind(binding.app_guid.as_str())
        .bind(binding.service_instance_guid.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        if taken {
            errors.add(&SERVICE_BINDING_KEY, ValidationKind::Unique);
        }

        errors.into_result().map_err(StoreError::from)
    }

    async fn resource_counts(&self) -> Result<ResourceCounts, StoreError> {
        let (route_mappings, service_bindings): (i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM route_mappings), (SELECT COUNT(*) FROM service_bindings)",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        Ok(ResourceCounts {
            route_mappings: u64::try_from(route_mappings).unwrap_or_default(),
            service_bindings: u64::try_from(service_bindings).unwrap_or_default(),
        })
    }
}

/// A live Postgres transaction. SQLx rolls it back on drop.
struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn insert_route_mapping(&mut self, mapping: &RouteMapping) -> Result<(), StoreError> {
        mapping.validate()?;
        sqlx::query(
            "INSERT INTO route_mappings (guid, app_guid, route_guid, process_type, app_port, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(mapping.guid.as_str())
        .bind(mapping.app_guid.as_str())
        .bind(mapping.route_guid.as_str())
        .bind(&mapping.process_type)
        .bind(mapping.app_port)
        .bind(mapping.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn delete_route_mapping(&mut self, guid: &Guid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM route_mappings WHERE guid = $1")
            .bind(guid.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                resource: "route_mapping",
                guid: guid.clone(),
            });
        }
        Ok(())
    }

    async fn insert_process_route_mapping(
        &mut self,
        mapping: &ProcessRouteMapping,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO process_route_mappings (process_guid, route_guid, app_port)
             VALUES ($1, $2, $3)",
        )
        .bind(mapping.process_guid.as_str())
        .bind(mapping.route_guid.as_str())
        .bind(mapping.app_port)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn delete_process_route_mappings(
        &mut self,
        process_guid: &Guid,
        route_guid: &Guid,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM process_route_mappings WHERE process_guid = $1 AND route_guid = $2",
        )
        .bind(process_guid.as_str())
        .bind(route_guid.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;
        Ok(result.rows_affected())
    }

    async fn insert_service_binding(
        &mut self,
        binding: &ServiceBinding,
    ) -> Result<(), StoreError> {
        binding.validate()?;

        let spaces: Option<(String, String)> = sqlx::query_as(
            "SELECT a.space_guid, si.space_guid
             FROM apps a, service_instances si
             WHERE a.guid = $1 AND si.guid = $2",
        )
        .bind(binding.app_guid.as_str())
        .bind(binding.service_instance_guid.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(classify)?;
        if let Some((app_space, instance_space)) = spaces {
            if app_space != instance_space {
                return Err(StoreError::Validation(ValidationErrors::single(
                    &["service_instance"],
                    ValidationKind::SpaceMismatch,
                )));
            }
        }

        sqlx::query(
            "INSERT INTO service_bindings (guid, app_guid, service_instance_guid, binding_options,
                 credentials, syslog_drain_url, gateway_name, gateway_data, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(binding.guid.as_str())
        .bind(binding.app_guid.as_str())
        .bind(binding.service_instance_guid.as_str())
        .bind(&binding.binding_options)
        .bind(&binding.credentials)
        .bind(&binding.syslog_drain_url)
        .bind(&binding.gateway_name)
        .bind(&binding.gateway_data)
        .bind(binding.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn delete_service_binding(&mut self, guid: &Guid) -> Result<(), StoreError> {
        let dependents: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM service_binding_associations WHERE service_binding_guid = $1",
        )
        .bind(guid.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(classify)?;
        if dependents > 0 {
            return Err(StoreError::HasDependents {
                resource: "service_binding",
                guid: guid.clone(),
            });
        }

        let result = sqlx::query("DELETE FROM service_bindings WHERE guid = $1")
            .bind(guid.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                resource: "service_binding",
                guid: guid.clone(),
            });
        }
        Ok(())
    }

    async fn delete_binding_associations(
        &mut self,
        binding_guid: &Guid,
    ) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM service_binding_associations WHERE service_binding_guid = $1")
                .bind(binding_guid.as_str())
                .execute(&mut *self.tx)
                .await
                .map_err(classify)?;
        Ok(result.rows_affected())
    }

    async fn insert_audit_event(&mut self, event: &AuditEvent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO audit_events (guid, event_type, actor, actor_type, actor_name, actee,
                 actee_type, actee_name, space_guid, organization_guid, metadata, timestamp)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(event.guid.as_str())
        .bind(&event.event_type)
        .bind(&event.actor)
        .bind(&event.actor_type)
        .bind(&event.actor_name)
        .bind(event.actee.as_str())
        .bind(&event.actee_type)
        .bind(&event.actee_name)
        .bind(event.space_guid.as_str())
        .bind(event.organization_guid.as_str())
        .bind(&event.metadata)
        .bind(event.timestamp)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgTransaction { tx } = *self;
        tx.commit().await.map_err(classify)
    }
}

//! Entity lookups that fold read denial into not-found.
//!
//! A resource the actor cannot read is reported exactly like a missing one.

use cc_core::{App, Guid, Process, Route, RouteMapping, ServiceBinding};
use cc_store::Store;

use crate::access::Permissions;
use crate::error::ApiError;

/// Everything a route-mapping create needs, resolved and readable.
#[derive(Debug, Clone)]
pub struct RouteMappingTargets {
    pub app: App,
    pub route: Route,
    /// The app's process of the requested type, when one exists.
    pub process: Option<Process>,
}

pub async fn fetch_app(
    store: &dyn Store,
    permissions: &Permissions,
    app_guid: &Guid,
) -> Result<App, ApiError> {
    match store.find_app(app_guid).await? {
        Some(app) if permissions.can_read(&app.space_guid) => Ok(app),
        _ => Err(ApiError::ResourceNotFound("App not found".into())),
    }
}

pub async fn fetch_route_mapping_targets(
    store: &dyn Store,
    permissions: &Permissions,
    app_guid: &Guid,
    route_guid: &Guid,
    process_type: &str,
) -> Result<RouteMappingTargets, ApiError> {
    let app = fetch_app(store, permissions, app_guid).await?;
    let route = match store.find_route(route_guid).await? {
        Some(route) if permissions.can_read(&route.space_guid) => route,
        _ => return Err(ApiError::ResourceNotFound("Route not found".into())),
    };
    let process = store.find_process(&app.guid, process_type).await?;
    Ok(RouteMappingTargets {
        app,
        route,
        process,
    })
}

/// A route mapping together with its owning app.
pub async fn fetch_route_mapping(
    store: &dyn Store,
    permissions: &Permissions,
    guid: &Guid,
) -> Result<(RouteMapping, App), ApiError> {
    let not_found = || ApiError::ResourceNotFound("Route mapping not found".into());
    let mapping = store.find_route_mapping(guid).await?.ok_or_else(not_found)?;
    match store.find_app(&mapping.app_guid).await? {
        Some(app) if permissions.can_read(&app.space_guid) => Ok((mapping, app)),
        _ => Err(not_found()),
    }
}

/// A service binding together with its bound app.
pub async fn fetch_service_binding(
    store: &dyn Store,
    permissions: &Permissions,
    guid: &Guid,
) -> Result<(ServiceBinding, App), ApiError> {
    let not_found = || ApiError::ServiceBindingNotFound(guid.clone());
    let binding = store.find_service_binding(guid).await?.ok_or_else(not_found)?;
    match store.find_app(&binding.app_guid).await? {
        Some(app) if permissions.can_read(&app.space_guid) => Ok((binding, app)),
        _ => Err(not_found()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Scopes;
    use cc_core::{SpaceRole, SpaceRoleKind};
    use cc_store::MemoryStore;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.put_app(App {
            guid: Guid::from("app"),
            name: "app".into(),
            space_guid: Guid::from("space"),
        });
        store.put_route(Route {
            guid: Guid::from("route"),
            host: "h".into(),
            path: String::new(),
            space_guid: Guid::from("space"),
        });
        store.put_route(Route {
            guid: Guid::from("hidden-route"),
            host: "x".into(),
            path: String::new(),
            space_guid: Guid::from("elsewhere"),
        });
        store
    }

    fn reader() -> Permissions {
        Permissions::new(
            Scopes {
                read: true,
                write: false,
                admin: false,
            },
            vec![SpaceRole {
                user_guid: Guid::from("user"),
                space_guid: Guid::from("space"),
                role: SpaceRoleKind::Auditor,
            }],
        )
    }

    #[tokio::test]
    async fn unreadable_route_looks_missing() {
        let store = store();
        let err = fetch_route_mapping_targets(
            &store,
            &reader(),
            &Guid::from("app"),
            &Guid::from("hidden-route"),
            "web",
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Route not found");
    }

    #[tokio::test]
    async fn app_is_checked_before_route() {
        let store = store();
        let err = fetch_route_mapping_targets(
            &store,
            &Permissions::admin(),
            &Guid::from("missing"),
            &Guid::from("missing-route"),
            "web",
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "App not found");
    }

    #[tokio::test]
    async fn targets_without_process() {
        let store = store();
        let targets = fetch_route_mapping_targets(
            &store,
            &reader(),
            &Guid::from("app"),
            &Guid::from("route"),
            "worker",
        )
        .await
        .unwrap();
        assert!(targets.process.is_none());
        assert_eq!(targets.route.guid.as_str(), "route");
    }

    #[tokio::test]
    async fn unreadable_binding_is_not_found() {
        let store = store();
        let binding = ServiceBinding::new(Guid::from("app"), Guid::from("si"), serde_json::json!({}));
        store.put_service_binding(binding.clone());

        let stranger = Permissions::new(Scopes::parse("cloud_controller.read"), vec![]);
        let err = fetch_service_binding(&store, &stranger, &binding.guid)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ServiceBindingNotFound(_)));

        let (found, app) = fetch_service_binding(&store, &reader(), &binding.guid)
            .await
            .unwrap();
        assert_eq!(found.guid, binding.guid);
        assert_eq!(app.guid.as_str(), "app");
    }
}

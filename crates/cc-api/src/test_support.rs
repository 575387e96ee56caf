//! Shared fixtures for unit tests.

use cc_core::{
    App, BrokerEndpoint, Guid, Organization, Process, Route, ServiceInstance,
    ServiceInstanceKind, Space,
};
use cc_store::MemoryStore;
use serde_json::json;

pub const SPACE: &str = "space";
pub const OTHER_SPACE: &str = "other-space";
pub const APP: &str = "app";
pub const ROUTE: &str = "route";
pub const FOREIGN_ROUTE: &str = "foreign-route";
pub const WEB_PROCESS: &str = "web-process";
pub const WORKER_PROCESS: &str = "worker-process";
pub const MANAGED_INSTANCE: &str = "managed";
pub const USER_PROVIDED_INSTANCE: &str = "ups";
pub const UNBINDABLE_INSTANCE: &str = "unbindable";

pub fn managed_instance(guid: &str, space: &str, bindable: bool) -> ServiceInstance {
    ServiceInstance {
        guid: Guid::from(guid),
        name: guid.to_string(),
        space_guid: Guid::from(space),
        bindable,
        kind: ServiceInstanceKind::Managed {
            broker: BrokerEndpoint {
                url: "http://broker.test".into(),
                username: "admin".into(),
                password: "secret".into(),
            },
            service_id: "service".into(),
            plan_id: "plan".into(),
        },
    }
}

pub fn user_provided_instance(guid: &str, space: &str) -> ServiceInstance {
    ServiceInstance {
        guid: Guid::from(guid),
        name: guid.to_string(),
        space_guid: Guid::from(space),
        bindable: true,
        kind: ServiceInstanceKind::UserProvided {
            credentials: json!({"uri": "db://ups"}),
            syslog_drain_url: None,
        },
    }
}

/// One org, two spaces, an app with web and worker processes, a route in
/// each space and three service instances.
pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.put_organization(Organization {
        guid: Guid::from("org"),
        name: "org".into(),
    });
    for space in [SPACE, OTHER_SPACE] {
        store.put_space(Space {
            guid: Guid::from(space),
            name: space.into(),
            organization_guid: Guid::from("org"),
        });
    }
    store.put_app(App {
        guid: Guid::from(APP),
        name: "dora".into(),
        space_guid: Guid::from(SPACE),
    });
    for (guid, process_type) in [(WEB_PROCESS, "web"), (WORKER_PROCESS, "worker")] {
        store.put_process(Process {
            guid: Guid::from(guid),
            app_guid: Guid::from(APP),
            process_type: process_type.into(),
        });
    }
    store.put_route(Route {
        guid: Guid::from(ROUTE),
        host: "dora".into(),
        path: String::new(),
        space_guid: Guid::from(SPACE),
    });
    store.put_route(Route {
        guid: Guid::from(FOREIGN_ROUTE),
        host: "elsewhere".into(),
        path: "/x".into(),
        space_guid: Guid::from(OTHER_SPACE),
    });
    store.put_service_instance(managed_instance(MANAGED_INSTANCE, SPACE, true));
    store.put_service_instance(user_provided_instance(USER_PROVIDED_INSTANCE, SPACE));
    store.put_service_instance(managed_instance(UNBINDABLE_INSTANCE, SPACE, false));
    store
}

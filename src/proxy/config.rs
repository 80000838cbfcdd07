use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// HTTP server key every route lives under.
pub const MAIN_SERVER: &str = "main";

/// Public listen addresses of the shared proxy.
pub const MAIN_LISTEN: [&str; 2] = [":80", ":443"];

// ---------------------------------------------------------------------------
// Admin API document
// ---------------------------------------------------------------------------

/// The reverse proxy's whole configuration document as exchanged with its
/// admin API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub apps: Apps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<Admin>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Apps {
    #[serde(default)]
    pub http: Http,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Http {
    #[serde(default)]
    pub servers: HashMap<String, Server>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub listen: Vec<String>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub handle: Vec<Handle>,
    #[serde(rename = "match", default)]
    pub matches: Vec<HostMatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Handle {
    pub handler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstreams: Option<Vec<Upstream>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    pub dial: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostMatch {
    pub host: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Admin {
    pub listen: String,
}

// ---------------------------------------------------------------------------
// Construction / route manipulation
// ---------------------------------------------------------------------------

impl ProxyConfig {
    /// The initial configuration pushed once the proxy answers: public
    /// listeners, a loopback-only admin endpoint and an empty route table.
    pub fn base(admin_listen: &str) -> Self {
        let mut servers = HashMap::new();
        servers.insert(
            MAIN_SERVER.to_owned(),
            Server {
                listen: MAIN_LISTEN.iter().map(|s| (*s).to_owned()).collect(),
                routes: Vec::new(),
            },
        );
        Self {
            apps: Apps {
                http: Http { servers },
            },
            admin: Some(Admin {
                listen: admin_listen.to_owned(),
            }),
        }
    }

    pub fn main_routes(&self) -> Option<&Vec<Route>> {
        self.apps.http.servers.get(MAIN_SERVER).map(|s| &s.routes)
    }
}

impl Route {
    /// Route proxying a host to one dial target per running instance.
    pub fn reverse_proxy(host: &str, upstreams: Vec<String>) -> Self {
        Self {
            handle: vec![Handle {
                handler: "reverse_proxy".into(),
                upstreams: Some(upstreams.into_iter().map(|dial| Upstream { dial }).collect()),
                root: None,
            }],
            matches: vec![HostMatch {
                host: vec![host.to_owned()],
            }],
        }
    }

    /// Route serving static files for a host from a content directory.
    pub fn file_server(host: &str, root: &str) -> Self {
        Self {
            handle: vec![Handle {
                handler: "file_server".into(),
                upstreams: None,
                root: Some(root.to_owned()),
            }],
            matches: vec![HostMatch {
                host: vec![host.to_owned()],
            }],
        }
    }

    pub fn hosts(&self) -> &[String] {
        self.matches.first().map_or(&[], |m| m.host.as_slice())
    }

    pub fn set_hosts(&mut self, hosts: Vec<String>) {
        self.matches = vec![HostMatch { host: hosts }];
    }
}

/// Index of the route whose host matcher contains `host`.
pub fn find_route_index(routes: &[Route], host: &str) -> Option<usize> {
    routes.iter().position(|route| {
        route
            .matches
            .iter()
            .any(|m| m.host.iter().any(|h| h == host))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_config_shape() {
        let cfg = ProxyConfig::base("127.0.0.1:2019");
        let value = serde_json::to_value(&cfg).unwrap();
        assert_eq!(
            value["apps"]["http"]["servers"]["main"]["listen"],
            serde_json::json!([":80", ":443"])
        );
        assert_eq!(
            value["apps"]["http"]["servers"]["main"]["routes"],
            serde_json::json!([])
        );
        assert_eq!(value["admin"]["listen"], "127.0.0.1:2019");
    }

    #[test]
    fn reverse_proxy_route_shape() {
        let route = Route::reverse_proxy(
            "backend-prod.example.com",
            vec!["abc-prod-0:3000".into(), "abc-prod-1:3000".into()],
        );
        let value = serde_json::to_value(&route).unwrap();
        assert_eq!(value["handle"][0]["handler"], "reverse_proxy");
        assert_eq!(value["handle"][0]["upstreams"][0]["dial"], "abc-prod-0:3000");
        assert_eq!(value["handle"][0]["upstreams"][1]["dial"], "abc-prod-1:3000");
        assert_eq!(
            value["match"][0]["host"],
            serde_json::json!(["backend-prod.example.com"])
        );
        // file_server-only field must be absent on a proxy route
        assert!(value["handle"][0].get("root").is_none());
    }

    #[test]
    fn file_server_route_shape() {
        let route = Route::file_server("frontend-prod.example.com", "/var/sarabi/data/sites/abc");
        let value = serde_json::to_value(&route).unwrap();
        assert_eq!(value["handle"][0]["handler"], "file_server");
        assert_eq!(value["handle"][0]["root"], "/var/sarabi/data/sites/abc");
        assert!(value["handle"][0].get("upstreams").is_none());
    }

    #[test]
    fn find_route_index_matches_any_alias() {
        let mut route = Route::reverse_proxy("backend-prod.example.com", vec!["a:1".into()]);
        route.set_hosts(vec![
            "backend-prod.example.com".into(),
            "api.example.com".into(),
        ]);
        let routes = vec![
            Route::file_server("frontend-prod.example.com", "/srv"),
            route,
        ];

        assert_eq!(find_route_index(&routes, "api.example.com"), Some(1));
        assert_eq!(find_route_index(&routes, "frontend-prod.example.com"), Some(0));
        assert_eq!(find_route_index(&routes, "missing.example.com"), None);
    }

    #[test]
    fn config_round_trips_through_json() {
        let mut cfg = ProxyConfig::base("127.0.0.1:2019");
        cfg.apps
            .http
            .servers
            .get_mut(MAIN_SERVER)
            .unwrap()
            .routes
            .push(Route::reverse_proxy("h.example.com", vec!["c:80".into()]));

        let json = serde_json::to_string(&cfg).unwrap();
        let parsed: ProxyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cfg);
    }
}

use super::{require, same_id};
use crate::context::ApiContext;
use crate::error::{CoreError, CoreResult, EntityKind};
use crate::models::{
    Document, HttpRoute, ReverseProxy, ReverseProxyHost, ReverseProxyHostCors,
    ReverseProxyHostTls, TcpRoute,
};
use crate::query::{filter_by_property, Filter};
use crate::util::generate_id;
use crate::JsonDatabase;

// Proxy changes are written straight to disk so the proxy can be reloaded
// from the file right after the call returns.

fn find_proxy_host_mut<'a>(doc: &'a mut Document, key: &str) -> CoreResult<&'a mut ReverseProxyHost> {
    doc.reverse_proxy_hosts
        .iter_mut()
        .find(|h| h.matches_key(key))
        .ok_or_else(|| CoreError::not_found(EntityKind::ReverseProxyHost, key))
}

impl JsonDatabase {
    /// Applies `change` to a proxy host and writes when it reports a change.
    fn change_proxy_host<T, F>(&self, ctx: &ApiContext, key: &str, change: F) -> CoreResult<T>
    where
        F: FnOnce(&mut ReverseProxyHost) -> CoreResult<(T, bool)>,
    {
        let (value, changed) = self.with_document_mut_if(|doc| change(find_proxy_host_mut(doc, key)?))?;
        if changed {
            self.save_now(ctx)?;
        }
        Ok(value)
    }

    /// Returns the global reverse-proxy configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when none is stored.
    pub fn get_reverse_proxy_config(&self, _ctx: &ApiContext) -> CoreResult<ReverseProxy> {
        self.with_document(|doc| doc.reverse_proxy.clone())?
            .ok_or_else(|| CoreError::not_found(EntityKind::ReverseProxy, "config"))
    }

    fn set_proxy_enabled(&self, ctx: &ApiContext, enabled: bool) -> CoreResult<ReverseProxy> {
        let (proxy, changed) = self.with_document_mut_if(|doc| {
            let proxy = doc
                .reverse_proxy
                .as_mut()
                .ok_or_else(|| CoreError::not_found(EntityKind::ReverseProxy, "config"))?;
            let changed = proxy.enabled != enabled;
            proxy.enabled = enabled;
            Ok((proxy.clone(), changed))
        })?;
        if changed {
            self.save_now(ctx)?;
        }
        Ok(proxy)
    }

    /// Turns the reverse proxy on.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when no configuration is stored.
    pub fn enable_proxy_config(&self, ctx: &ApiContext) -> CoreResult<ReverseProxy> {
        self.set_proxy_enabled(ctx, true)
    }

    /// Turns the reverse proxy off.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when no configuration is stored.
    pub fn disable_proxy_config(&self, ctx: &ApiContext) -> CoreResult<ReverseProxy> {
        self.set_proxy_enabled(ctx, false)
    }

    /// Stores the global configuration when it differs from the current one.
    /// The stored id is kept; a first configuration gets a new one.
    ///
    /// # Errors
    ///
    /// Fails when disconnected or the write fails.
    pub fn update_reverse_proxy(&self, ctx: &ApiContext, proxy: &ReverseProxy) -> CoreResult<ReverseProxy> {
        let (stored, changed) = self.with_document_mut_if(|doc| {
            if let Some(current) = &doc.reverse_proxy {
                if !current.diff(proxy) {
                    return Ok((current.clone(), false));
                }
            }
            let mut next = proxy.clone();
            next.id = doc
                .reverse_proxy
                .as_ref()
                .map_or_else(generate_id, |current| current.id.clone());
            doc.reverse_proxy = Some(next.clone());
            Ok((next, true))
        })?;
        if changed {
            self.save_now(ctx)?;
        }
        Ok(stored)
    }

    /// Lists proxy hosts matching `filter`.
    ///
    /// # Errors
    ///
    /// Fails when disconnected.
    pub fn get_reverse_proxy_hosts(
        &self,
        _ctx: &ApiContext,
        filter: Option<&Filter>,
    ) -> CoreResult<Vec<ReverseProxyHost>> {
        let hosts = self.with_document(|doc| doc.reverse_proxy_hosts.clone())?;
        Ok(filter_by_property(hosts, filter))
    }

    /// Finds a proxy host by id or `host:port` address.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when no proxy host matches.
    pub fn get_reverse_proxy_host(&self, _ctx: &ApiContext, key: &str) -> CoreResult<ReverseProxyHost> {
        self.with_document(|doc| {
            doc.reverse_proxy_hosts
                .iter()
                .find(|h| h.matches_key(key))
                .cloned()
        })?
        .ok_or_else(|| CoreError::not_found(EntityKind::ReverseProxyHost, key))
    }

    /// Stores a new proxy host. The host and its routes get fresh ids.
    ///
    /// # Errors
    ///
    /// Fails on an empty host, a taken id or address, or a host carrying both
    /// HTTP routes and a TCP route.
    pub fn create_reverse_proxy_host(
        &self,
        ctx: &ApiContext,
        mut host: ReverseProxyHost,
    ) -> CoreResult<ReverseProxyHost> {
        require(EntityKind::ReverseProxyHost, "host", &host.host)?;
        if !host.http_routes.is_empty() && host.tcp_route.is_some() {
            return Err(CoreError::invalid_operation(
                "a reverse proxy host cannot have both http routes and a tcp route",
            ));
        }
        if host.id.is_empty() {
            host.id = generate_id();
        }
        for route in &mut host.http_routes {
            route.id = generate_id();
        }
        if let Some(route) = &mut host.tcp_route {
            route.id = generate_id();
        }

        let created = self.with_document_mut(|doc| {
            let address = host.address();
            if doc
                .reverse_proxy_hosts
                .iter()
                .any(|h| same_id(&h.id, &host.id) || h.address() == address)
            {
                return Err(CoreError::already_exists(EntityKind::ReverseProxyHost, address));
            }
            doc.reverse_proxy_hosts.push(host.clone());
            Ok(host)
        })?;
        self.save_now(ctx)?;
        ctx.log_info(format!("created reverse proxy host {}", created.address()));
        Ok(created)
    }

    /// Updates host, port, TLS and CORS of a proxy host. Empty host or port
    /// and absent TLS or CORS keep the stored values.
    ///
    /// # Errors
    ///
    /// Fails on an empty id or an unknown proxy host.
    pub fn update_reverse_proxy_host(
        &self,
        ctx: &ApiContext,
        host: &ReverseProxyHost,
    ) -> CoreResult<ReverseProxyHost> {
        require(EntityKind::ReverseProxyHost, "id", &host.id)?;
        self.change_proxy_host(ctx, &host.id, |stored| {
            let mut next = stored.clone();
            if !host.host.is_empty() {
                next.host.clone_from(&host.host);
            }
            if !host.port.is_empty() {
                next.port.clone_from(&host.port);
            }
            if host.tls.is_some() {
                next.tls.clone_from(&host.tls);
            }
            if host.cors.is_some() {
                next.cors.clone_from(&host.cors);
            }
            let changed = next.diff(stored);
            *stored = next;
            Ok((stored.clone(), changed))
        })
    }

    /// Removes a proxy host by id or address.
    ///
    /// # Errors
    ///
    /// Fails on an empty key or an unknown proxy host.
    pub fn delete_reverse_proxy_host(&self, ctx: &ApiContext, key: &str) -> CoreResult<()> {
        require(EntityKind::ReverseProxyHost, "id", key)?;
        self.with_document_mut(|doc| {
            let index = doc
                .reverse_proxy_hosts
                .iter()
                .position(|h| h.matches_key(key))
                .ok_or_else(|| CoreError::not_found(EntityKind::ReverseProxyHost, key))?;
            doc.reverse_proxy_hosts.remove(index);
            Ok(())
        })?;
        self.save_now(ctx)?;
        ctx.log_info(format!("deleted reverse proxy host {key}"));
        Ok(())
    }

    /// Sets the TLS settings of a proxy host.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown proxy host.
    pub fn configure_reverse_proxy_host_tls(
        &self,
        ctx: &ApiContext,
        key: &str,
        tls: ReverseProxyHostTls,
    ) -> CoreResult<ReverseProxyHost> {
        self.change_proxy_host(ctx, key, |stored| {
            let changed = stored.tls.as_ref() != Some(&tls);
            stored.tls = Some(tls);
            Ok((stored.clone(), changed))
        })
    }

    /// Sets the CORS settings of a proxy host.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown proxy host.
    pub fn configure_reverse_proxy_host_cors(
        &self,
        ctx: &ApiContext,
        key: &str,
        cors: ReverseProxyHostCors,
    ) -> CoreResult<ReverseProxyHost> {
        self.change_proxy_host(ctx, key, |stored| {
            let changed = stored.cors.as_ref() != Some(&cors);
            stored.cors = Some(cors);
            Ok((stored.clone(), changed))
        })
    }

    /// Adds an HTTP route with a fresh id.
    ///
    /// # Errors
    ///
    /// Fails for an unknown proxy host, one that forwards TCP, or a route
    /// already present.
    pub fn create_reverse_proxy_host_http_route(
        &self,
        ctx: &ApiContext,
        key: &str,
        mut route: HttpRoute,
    ) -> CoreResult<HttpRoute> {
        route.id = generate_id();
        self.change_proxy_host(ctx, key, |stored| {
            if stored.tcp_route.is_some() {
                return Err(CoreError::invalid_operation(
                    "cannot add http routes to a reverse proxy host with a tcp route",
                ));
            }
            if !route.route().is_empty() && stored.http_routes.iter().any(|r| r.route() == route.route()) {
                return Err(CoreError::already_exists(EntityKind::HttpRoute, route.route()));
            }
            stored.http_routes.push(route.clone());
            Ok((route, true))
        })
    }

    /// Replaces the HTTP route matching the route's id or path.
    ///
    /// # Errors
    ///
    /// Fails for an unknown proxy host or route.
    pub fn update_reverse_proxy_host_http_route(
        &self,
        ctx: &ApiContext,
        key: &str,
        route: &HttpRoute,
    ) -> CoreResult<HttpRoute> {
        self.change_proxy_host(ctx, key, |stored| {
            let existing = stored
                .http_routes
                .iter_mut()
                .find(|r| (!route.id.is_empty() && same_id(&r.id, &route.id)) || r.matches_key(route.route()))
                .ok_or_else(|| CoreError::not_found(EntityKind::HttpRoute, route.route()))?;
            if !existing.diff(route) {
                return Ok((existing.clone(), false));
            }
            let id = std::mem::take(&mut existing.id);
            *existing = HttpRoute { id, ..route.clone() };
            Ok((existing.clone(), true))
        })
    }

    /// Removes the HTTP route with the given id or path.
    ///
    /// # Errors
    ///
    /// Fails for an unknown proxy host or route.
    pub fn delete_reverse_proxy_host_http_route(
        &self,
        ctx: &ApiContext,
        key: &str,
        route_key: &str,
    ) -> CoreResult<()> {
        self.change_proxy_host(ctx, key, |stored| {
            let index = stored
                .http_routes
                .iter()
                .position(|r| r.matches_key(route_key))
                .ok_or_else(|| CoreError::not_found(EntityKind::HttpRoute, route_key))?;
            stored.http_routes.remove(index);
            Ok(((), true))
        })
    }

    /// Sets the TCP route of a proxy host. A host without one gets it with a
    /// fresh id.
    ///
    /// # Errors
    ///
    /// Fails for an unknown proxy host or one that has HTTP routes.
    pub fn update_reverse_proxy_host_tcp_route(
        &self,
        ctx: &ApiContext,
        key: &str,
        route: &TcpRoute,
    ) -> CoreResult<TcpRoute> {
        self.change_proxy_host(ctx, key, |stored| {
            if !stored.http_routes.is_empty() {
                return Err(CoreError::invalid_operation(
                    "cannot update the tcp route of a reverse proxy host with http routes",
                ));
            }
            match &mut stored.tcp_route {
                Some(existing) if !existing.diff(route) => Ok((existing.clone(), false)),
                Some(existing) => {
                    let id = std::mem::take(&mut existing.id);
                    *existing = TcpRoute { id, ..route.clone() };
                    Ok((existing.clone(), true))
                }
                None => {
                    let created = TcpRoute {
                        id: generate_id(),
                        ..route.clone()
                    };
                    stored.tcp_route = Some(created.clone());
                    Ok((created, true))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{root, store};
    use super::*;

    fn http_route(path: &str, port: &str) -> HttpRoute {
        HttpRoute {
            path: path.into(),
            target_host: "10.0.0.2".into(),
            target_port: port.into(),
            ..HttpRoute::default()
        }
    }

    #[test]
    fn global_config_is_diff_gated() {
        let (_dir, db) = store();
        assert!(db.get_reverse_proxy_config(&root()).is_err());
        assert!(db.enable_proxy_config(&root()).is_err());

        let config = ReverseProxy {
            host: "0.0.0.0".into(),
            port: "8443".into(),
            ..ReverseProxy::default()
        };
        let stored = db.update_reverse_proxy(&root(), &config).unwrap();
        assert!(!stored.id.is_empty());

        let writes = db.stats().disk_writes();
        let again = db.update_reverse_proxy(&root(), &config).unwrap();
        assert_eq!(again.id, stored.id);
        assert!(db.disable_proxy_config(&root()).is_ok());
        assert_eq!(db.stats().disk_writes(), writes);
        assert!(!db.is_dirty());

        assert!(db.enable_proxy_config(&root()).unwrap().enabled);
        assert!(!db.disable_proxy_config(&root()).unwrap().enabled);
        let moved = ReverseProxy {
            port: "9443".into(),
            ..config
        };
        assert_eq!(db.update_reverse_proxy(&root(), &moved).unwrap().id, stored.id);
    }

    #[test]
    fn create_assigns_ids_and_enforces_exclusivity() {
        let (_dir, db) = store();
        let mut host = ReverseProxyHost::new("App.local", "80");
        host.http_routes = vec![http_route("/api", "3000"), http_route("/web", "8080")];
        let created = db.create_reverse_proxy_host(&root(), host).unwrap();
        assert!(!created.id.is_empty());
        assert!(created.http_routes.iter().all(|r| !r.id.is_empty()));
        assert_ne!(created.http_routes[0].id, created.http_routes[1].id);

        assert!(matches!(
            db.create_reverse_proxy_host(&root(), ReverseProxyHost::new("app.local", "80")),
            Err(CoreError::AlreadyExists { .. })
        ));

        let mut both = ReverseProxyHost::new("db.local", "5432");
        both.http_routes = vec![http_route("/", "1")];
        both.tcp_route = Some(TcpRoute::default());
        assert!(matches!(
            db.create_reverse_proxy_host(&root(), both),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(db.get_reverse_proxy_host(&root(), "app.local:80").is_ok());
    }

    #[test]
    fn host_settings() {
        let (_dir, db) = store();
        let created = db
            .create_reverse_proxy_host(&root(), ReverseProxyHost::new("app.local", "80"))
            .unwrap();

        let change = ReverseProxyHost {
            id: created.id.clone(),
            port: "443".into(),
            ..ReverseProxyHost::default()
        };
        let updated = db.update_reverse_proxy_host(&root(), &change).unwrap();
        assert_eq!(updated.host, "app.local");
        assert_eq!(updated.port, "443");

        let tls = ReverseProxyHostTls {
            enabled: true,
            certificate: "CERT".into(),
            private_key: "KEY".into(),
        };
        let with_tls = db
            .configure_reverse_proxy_host_tls(&root(), "app.local:443", tls.clone())
            .unwrap();
        assert_eq!(with_tls.tls, Some(tls));

        let cors = ReverseProxyHostCors {
            enabled: true,
            allowed_origins: vec!["*".into()],
            ..ReverseProxyHostCors::default()
        };
        let with_cors = db
            .configure_reverse_proxy_host_cors(&root(), &created.id, cors)
            .unwrap();
        assert!(with_cors.cors.unwrap().enabled);

        db.delete_reverse_proxy_host(&root(), &created.id).unwrap();
        assert!(db.get_reverse_proxy_hosts(&root(), None).unwrap().is_empty());
    }

    #[test]
    fn http_routes_lifecycle() {
        let (_dir, db) = store();
        let created = db
            .create_reverse_proxy_host(&root(), ReverseProxyHost::new("app.local", "80"))
            .unwrap();

        let route = db
            .create_reverse_proxy_host_http_route(&root(), &created.id, http_route("/api", "3000"))
            .unwrap();
        assert!(!route.id.is_empty());
        assert!(matches!(
            db.create_reverse_proxy_host_http_route(&root(), &created.id, http_route("/api", "1")),
            Err(CoreError::AlreadyExists { kind: EntityKind::HttpRoute, .. })
        ));

        let mut changed = route.clone();
        changed.target_port = "4000".into();
        let updated = db
            .update_reverse_proxy_host_http_route(&root(), &created.id, &changed)
            .unwrap();
        assert_eq!(updated.id, route.id);
        assert_eq!(
            db.get_reverse_proxy_host(&root(), &created.id).unwrap().http_routes[0].target_port,
            "4000"
        );

        assert!(matches!(
            db.update_reverse_proxy_host_tcp_route(&root(), &created.id, &TcpRoute::default()),
            Err(CoreError::InvalidOperation { .. })
        ));

        db.delete_reverse_proxy_host_http_route(&root(), &created.id, "/api")
            .unwrap();
        assert!(db.get_reverse_proxy_host(&root(), &created.id).unwrap().http_routes.is_empty());
    }

    #[test]
    fn tcp_route_is_set_and_kept_exclusive() {
        let (_dir, db) = store();
        let created = db
            .create_reverse_proxy_host(&root(), ReverseProxyHost::new("db.local", "5432"))
            .unwrap();
        let route = TcpRoute {
            target_host: "10.0.0.5".into(),
            target_port: "5432".into(),
            ..TcpRoute::default()
        };
        let stored = db
            .update_reverse_proxy_host_tcp_route(&root(), &created.id, &route)
            .unwrap();
        assert!(!stored.id.is_empty());

        let moved = TcpRoute {
            target_port: "6432".into(),
            ..route
        };
        let updated = db
            .update_reverse_proxy_host_tcp_route(&root(), "db.local:5432", &moved)
            .unwrap();
        assert_eq!(updated.id, stored.id);
        assert_eq!(updated.target_port, "6432");

        assert!(matches!(
            db.create_reverse_proxy_host_http_route(&root(), &created.id, http_route("/", "80")),
            Err(CoreError::InvalidOperation { .. })
        ));
    }
}

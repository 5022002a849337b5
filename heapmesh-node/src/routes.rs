use crate::context::Context;
use heapmesh_common::peer::{AdminResponse, JoinRequest, JoinResponse, ListedPeer, PeerInfo};
use heapmesh_common::protocol::{Request, Response};
use heapmesh_common::registry::Command;
use heapmesh_common::router::{RouteArguments, RoutingTable};
use std::sync::Arc;

pub type Handler = Box<dyn Fn(RouteArguments, &Request) -> Response + Send + Sync>;

fn handler<F>(f: F) -> Handler
where
    F: Fn(RouteArguments, &Request) -> Response + Send + Sync + 'static,
{
    Box::new(f)
}

pub fn routing_table(ctx: Arc<Context>) -> RoutingTable<Handler> {
    let mut routes = RoutingTable::new(handler(|_, _| Response::not_found()));

    let admin_ctx = ctx.clone();
    routes.register_handler("/admin", handler(move |args, req| admin(&admin_ctx, args, req)));
    routes.register_handler("/join", handler(move |args, req| join(&ctx, args, req)));
    routes.register_handler("/request_vote", handler(|_, _| not_supported("request_vote")));
    routes.register_handler("/append_entries", handler(|_, _| not_supported("append_entries")));

    routes
}

pub fn admin(ctx: &Context, _args: RouteArguments, _req: &Request) -> Response {
    let peers = ctx
        .registry
        .all()
        .into_iter()
        .filter_map(|p| {
            Some(ListedPeer {
                id: p.id?,
                ip_address: p.ip_address,
                first_seen: p.first_seen,
                last_seen: p.last_seen,
            })
        })
        .collect();

    let body = AdminResponse {
        status: "GOOD".to_owned(),
        master: ctx.config.master,
        peers,
        diagnostics: ctx.arena.diagnostics(),
    };

    match Response::json(200, &body) {
        Ok(res) => res,
        Err(e) => {
            error!("failed to encode admin snapshot: {:?}", e);
            Response::new(500)
        }
    }
}

pub fn join(ctx: &Context, _args: RouteArguments, req: &Request) -> Response {
    let now = chrono::Utc::now().timestamp();

    let peer = match req
        .get_json::<JoinRequest>()
        .and_then(|body| PeerInfo::from_join(&body, now))
    {
        Ok(peer) => peer,
        Err(e) => {
            warn!("rejected join: {}", e);
            return Response::from_error(&e);
        }
    };

    let command = if ctx.registry.find_by_address(&peer.ip_address).is_some() {
        Command::Touch {
            ip_address: peer.ip_address,
            at: now,
        }
    } else {
        peer.insert()
    };

    if !ctx.executor.execute(command) {
        return Response::new(500);
    }

    match Response::json(200, &JoinResponse::joined()) {
        Ok(res) => res,
        Err(e) => {
            error!("failed to encode join response: {:?}", e);
            Response::new(500)
        }
    }
}

/// Election and log replication are not implemented; these routes only acknowledge.
fn not_supported(route: &str) -> Response {
    debug!("{} is not supported yet", route);
    Response::new(200)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use heapmesh_common::arena::InternalAllocator;
    use heapmesh_common::config::NodeConfig;
    use std::net::{IpAddr, Ipv4Addr};

    fn context() -> Arc<Context> {
        Arc::new(Context::new(NodeConfig::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            0,
        )))
    }

    fn post(uri: &str, body: &str) -> Request {
        let raw = format!(
            "POST {} HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
            uri,
            body.len(),
            body
        );
        Request::parse(raw.as_bytes()).unwrap()
    }

    fn dispatch(ctx: &Arc<Context>, req: &Request) -> Response {
        let routes = routing_table(ctx.clone());
        let (handler, args) = routes.route(req.path());
        handler(args, req)
    }

    #[test]
    fn join_inserts_peer() {
        let ctx = context();
        let res = dispatch(&ctx, &post("/join", r#"{"ip_address":"10.0.0.5","is_master":false}"#));

        assert_eq!(res.status_code, 200);
        assert_eq!(res.body, r#"{"status":"JOINED"}"#);
        assert_eq!(res.headers["Content-Type"], "application/json");

        let peers = ctx.registry.all();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].ip_address, "10.0.0.5");
        assert_eq!(peers[0].first_seen, peers[0].last_seen);
    }

    #[test]
    fn malformed_join_is_a_client_error() {
        let ctx = context();

        for body in ["not json", r#"{"ip_address":"10.0.0.5"}"#, r#"{"ip_address":"nope","is_master":false}"#] {
            let res = dispatch(&ctx, &post("/join", body));
            assert_eq!(res.status_code, 400, "{}", body);
        }

        assert!(ctx.registry.is_empty());
    }

    #[test]
    fn repeated_join_touches_existing_entry() {
        let ctx = context();
        let body = r#"{"ip_address":"10.0.0.5","is_master":false}"#;

        assert_eq!(dispatch(&ctx, &post("/join", body)).status_code, 200);
        assert_eq!(dispatch(&ctx, &post("/join", body)).status_code, 200);
        assert_eq!(ctx.registry.len(), 1);
    }

    #[test]
    fn admin_lists_every_registry_entry() {
        let ctx = context();
        dispatch(&ctx, &post("/join", r#"{"ip_address":"10.0.0.5","is_master":false}"#));
        dispatch(&ctx, &post("/join", r#"{"ip_address":"10.0.0.6","is_master":true}"#));

        let res = dispatch(&ctx, &Request::parse(b"GET /admin HTTP/1.1\r\n\r\n").unwrap());
        let body: AdminResponse = serde_json::from_str(&res.body).unwrap();

        assert_eq!(res.status_code, 200);
        assert_eq!(body.status, "GOOD");
        assert_eq!(body.peers.len(), ctx.registry.len());
        assert_eq!(body.peers[1].ip_address, "10.0.0.6");
        assert!(body.diagnostics.contains_key("internal_buffers"));
    }

    #[test]
    fn placeholders_acknowledge_without_body() {
        let ctx = context();

        for uri in ["/request_vote", "/append_entries"] {
            let res = dispatch(&ctx, &post(uri, "{}"));
            assert_eq!(res.status_code, 200);
            assert!(res.body.is_empty());
        }
    }

    struct FixedArena;

    impl InternalAllocator for FixedArena {
        fn buffer(&self, capacity: usize) -> BytesMut {
            BytesMut::with_capacity(capacity)
        }

        fn diagnostics(&self) -> serde_json::Map<String, serde_json::Value> {
            let mut handles = serde_json::Map::new();
            handles.insert("shared_page_table".to_owned(), 4096.into());
            handles
        }
    }

    #[test]
    fn admin_reports_the_installed_arena() {
        let ctx = Arc::new(
            Context::new(NodeConfig::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))
                .with_arena(Arc::new(FixedArena)),
        );

        let res = dispatch(&ctx, &Request::parse(b"GET /admin HTTP/1.1\r\n\r\n").unwrap());
        let body: AdminResponse = serde_json::from_str(&res.body).unwrap();

        assert_eq!(body.diagnostics["shared_page_table"], 4096);
        assert!(body.peers.is_empty());
    }

    #[test]
    fn unknown_path_is_not_found() {
        let ctx = context();
        let res = dispatch(&ctx, &Request::parse(b"GET /nope HTTP/1.1\r\n\r\n").unwrap());

        assert_eq!(res.status_code, 404);
    }
}

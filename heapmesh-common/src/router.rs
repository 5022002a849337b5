use std::collections::HashMap;

/// Path segments of a matched route, in order.
pub type RouteArguments = Vec<String>;

/// Exact-match table from uri path to handler, with a fallback for unknown paths.
pub struct RoutingTable<H> {
    routes: HashMap<String, H>,
    not_found: H,
}

impl<H> RoutingTable<H> {
    pub fn new(not_found: H) -> Self {
        RoutingTable {
            routes: HashMap::new(),
            not_found,
        }
    }

    pub fn register_handler(&mut self, path: impl Into<String>, handler: H) {
        let path = path.into();
        if self.routes.insert(path.clone(), handler).is_some() {
            warn!("handler for {} replaced", path);
        }
    }

    pub fn route(&self, path: &str) -> (&H, RouteArguments) {
        match self.routes.get(path) {
            Some(handler) => (handler, segments(path)),
            None => (&self.not_found, RouteArguments::new()),
        }
    }
}

fn segments(path: &str) -> RouteArguments {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

//! Gate configuration and the allow/redirect decision table.

use super::{provider::Identity, route::RouteClass, route::RouteTable};

const DEFAULT_LOGIN_PATH: &str = "/login";
const DEFAULT_LANDING_PATH: &str = "/app/dashboard";

/// Outcome of the decision table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Forward,
    Redirect(String),
}

impl Decision {
    #[must_use]
    pub fn is_forward(&self) -> bool {
        matches!(self, Self::Forward)
    }
}

#[derive(Clone, Debug)]
pub struct GateConfig {
    routes: RouteTable,
    login_path: String,
    landing_path: String,
    refresh_public: bool,
}

impl GateConfig {
    #[must_use]
    pub fn new(routes: RouteTable) -> Self {
        Self {
            routes,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            landing_path: DEFAULT_LANDING_PATH.to_string(),
            refresh_public: true,
        }
    }

    #[must_use]
    pub fn with_login_path(mut self, path: String) -> Self {
        self.login_path = path;
        self
    }

    #[must_use]
    pub fn with_landing_path(mut self, path: String) -> Self {
        self.landing_path = path;
        self
    }

    /// Whether public paths still go through the provider exchange.
    #[must_use]
    pub fn with_refresh_public(mut self, refresh: bool) -> Self {
        self.refresh_public = refresh;
        self
    }

    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    #[must_use]
    pub fn landing_path(&self) -> &str {
        &self.landing_path
    }

    #[must_use]
    pub fn refresh_public(&self) -> bool {
        self.refresh_public
    }

    /// Apply the decision table for a classified path.
    #[must_use]
    pub fn decide(&self, class: RouteClass, identity: Option<&Identity>) -> Decision {
        match (class, identity) {
            (RouteClass::Protected, None) => Decision::Redirect(self.login_path.clone()),
            (RouteClass::AuthOnly, Some(_)) => Decision::Redirect(self.landing_path.clone()),
            (RouteClass::Protected, Some(_))
            | (RouteClass::AuthOnly, None)
            | (RouteClass::Public, _) => Decision::Forward,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::new(RouteTable::default())
    }
}

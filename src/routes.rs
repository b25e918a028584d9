//! Navigation targets of the client and their URL paths.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Home,
    Conversation,
    Report { session_id: String },
    History,
}

impl Route {
    pub fn name(&self) -> &'static str {
        match self {
            Route::Home => "home",
            Route::Conversation => "conversation",
            Route::Report { .. } => "report",
            Route::History => "history",
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Conversation => "/conversation".to_string(),
            Route::Report { session_id } => format!("/report/{}", session_id),
            Route::History => "/history".to_string(),
        }
    }

    /// Resolves a path (optionally carrying a query string or fragment) to a route.
    pub fn parse(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Some(Route::Home),
            ["conversation"] => Some(Route::Conversation),
            ["history"] => Some(Route::History),
            ["report", session_id] => Some(Route::Report {
                session_id: (*session_id).to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

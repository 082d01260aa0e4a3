//! Route gating.
//!
//! Every page asks the same question: given the session status, may this
//! route render, should it wait, or should the user be sent elsewhere?
//! `gate` answers it once for all routes.

use std::fmt;

use super::session::SessionStatus;

/// Who may see a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Anyone, whatever the session status.
    Public,
    /// Logged-in users only.
    Protected,
    /// Logged-out users only (login, register).
    GuestOnly,
}

/// Routes of the web application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
    LoginHandler,
    Register,
    Meals,
    MealPlan(String),
    Workouts,
    WorkoutProgram { kind: String, level: String },
    Progress,
    Forum,
    ForumPost(i64),
}

impl Route {
    /// Parse a path such as `/forum/12`. Query strings and trailing slashes
    /// are ignored.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let route = match segments.as_slice() {
            [] => Route::Home,
            ["login"] => Route::Login,
            ["login", "handler"] => Route::LoginHandler,
            ["register"] => Route::Register,
            ["meals"] => Route::Meals,
            ["meals", "daily", plan] => Route::MealPlan(plan.to_string()),
            ["workouts"] => Route::Workouts,
            ["workouts", kind, level] => Route::WorkoutProgram {
                kind: kind.to_string(),
                level: level.to_string(),
            },
            ["progress"] => Route::Progress,
            ["forum"] => Route::Forum,
            ["forum", id] => Route::ForumPost(id.parse().ok()?),
            _ => return None,
        };
        Some(route)
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Login => "/login".to_string(),
            Route::LoginHandler => "/login/handler".to_string(),
            Route::Register => "/register".to_string(),
            Route::Meals => "/meals".to_string(),
            Route::MealPlan(plan) => format!("/meals/daily/{}", plan),
            Route::Workouts => "/workouts".to_string(),
            Route::WorkoutProgram { kind, level } => format!("/workouts/{}/{}", kind, level),
            Route::Progress => "/progress".to_string(),
            Route::Forum => "/forum".to_string(),
            Route::ForumPost(id) => format!("/forum/{}", id),
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Route::Progress | Route::Forum | Route::ForumPost(_) => Access::Protected,
            Route::Login | Route::Register => Access::GuestOnly,
            _ => Access::Public,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// What a page should do right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Show a loading indicator until the session settles.
    Loading,
    Render,
    Redirect(Route),
}

pub fn gate(status: SessionStatus, access: Access) -> GateDecision {
    match (access, status) {
        (Access::Public, _) => GateDecision::Render,
        (_, SessionStatus::Unresolved | SessionStatus::Resolving) => GateDecision::Loading,
        (Access::Protected, SessionStatus::Authenticated) => GateDecision::Render,
        (Access::Protected, SessionStatus::Unauthenticated) => GateDecision::Redirect(Route::Login),
        (Access::GuestOnly, SessionStatus::Authenticated) => GateDecision::Redirect(Route::Home),
        (Access::GuestOnly, SessionStatus::Unauthenticated) => GateDecision::Render,
    }
}

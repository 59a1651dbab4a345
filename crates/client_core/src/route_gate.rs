//! Navigation guard for protected screens.

use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::types::{ProfileStatus, SessionPhase, SessionSnapshot};

pub const ONBOARDING_STEPS: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Root,
    Login,
    Signup,
    /// Onboarding questionnaire, steps `1..=4`.
    Onboarding(u8),
    Home,
    Log,
    Insights,
    Share,
    Settings,
    Profile,
}

impl Route {
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        let route = match trimmed {
            "" => Self::Root,
            "/login" => Self::Login,
            "/signup" => Self::Signup,
            "/home" => Self::Home,
            "/log" => Self::Log,
            "/insights" => Self::Insights,
            "/share" => Self::Share,
            "/settings" => Self::Settings,
            "/profile" => Self::Profile,
            other => {
                let step = other.strip_prefix("/question")?.parse::<u8>().ok()?;
                if !(1..=ONBOARDING_STEPS).contains(&step) {
                    return None;
                }
                Self::Onboarding(step)
            }
        };
        Some(route)
    }

    pub fn path(&self) -> String {
        match self {
            Self::Root => "/".into(),
            Self::Login => "/login".into(),
            Self::Signup => "/signup".into(),
            Self::Onboarding(step) => format!("/question{step}"),
            Self::Home => "/home".into(),
            Self::Log => "/log".into(),
            Self::Insights => "/insights".into(),
            Self::Share => "/share".into(),
            Self::Settings => "/settings".into(),
            Self::Profile => "/profile".into(),
        }
    }

    pub fn is_protected(&self) -> bool {
        matches!(
            self,
            Self::Home | Self::Log | Self::Insights | Self::Share | Self::Settings | Self::Profile
        )
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Session still resolving; show a placeholder.
    Loading,
    Redirect(Route),
    Render(Route),
}

/// Whether protected screens require a completed onboarding profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfilePolicy {
    #[default]
    AllowIncomplete,
    RequireProfile,
}

impl FromStr for ProfilePolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "allow_incomplete" => Ok(Self::AllowIncomplete),
            "require_profile" => Ok(Self::RequireProfile),
            other => Err(format!("unknown profile policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RouteGate {
    policy: ProfilePolicy,
}

impl RouteGate {
    pub fn new(policy: ProfilePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ProfilePolicy {
        self.policy
    }

    pub fn decide(&self, session: &SessionSnapshot, route: Route) -> GateDecision {
        if !route.is_protected() {
            return GateDecision::Render(route);
        }

        match session.phase {
            SessionPhase::Initializing => GateDecision::Loading,
            SessionPhase::Unauthenticated => GateDecision::Redirect(Route::Login),
            SessionPhase::Authenticated => match (self.policy, session.profile()) {
                (ProfilePolicy::AllowIncomplete, _) => GateDecision::Render(route),
                (ProfilePolicy::RequireProfile, ProfileStatus::Present) => {
                    GateDecision::Render(route)
                }
                (ProfilePolicy::RequireProfile, ProfileStatus::Missing) => {
                    GateDecision::Redirect(Route::Onboarding(1))
                }
                (ProfilePolicy::RequireProfile, ProfileStatus::Unknown) => GateDecision::Loading,
            },
        }
    }
}

/// Where to send the user right after login or registration.
pub fn post_auth_destination(has_profile: bool) -> Route {
    if has_profile {
        Route::Home
    } else {
        Route::Onboarding(1)
    }
}

#[cfg(test)]
#[path = "tests/route_gate_tests.rs"]
mod tests;

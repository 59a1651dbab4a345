use shared::domain::UserSummary;

use crate::error::ClassifiedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Initializing,
    Unauthenticated,
    Authenticated,
}

/// Whether the signed-in user has completed the onboarding profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileStatus {
    #[default]
    Unknown,
    Missing,
    Present,
}

impl ProfileStatus {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::Missing => Some(false),
            Self::Present => Some(true),
        }
    }
}

/// Read-only view of the session handed to screens and the route gate.
/// Never carries the bearer credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub user: Option<UserSummary>,
    profile: ProfileStatus,
    pub last_error: Option<ClassifiedError>,
}

impl SessionSnapshot {
    pub(crate) fn new(
        phase: SessionPhase,
        user: Option<UserSummary>,
        profile: ProfileStatus,
        last_error: Option<ClassifiedError>,
    ) -> Self {
        Self {
            phase,
            user,
            profile,
            last_error,
        }
    }

    pub fn initializing() -> Self {
        Self::new(SessionPhase::Initializing, None, ProfileStatus::Unknown, None)
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == SessionPhase::Authenticated
    }

    /// Profile status, reported as `Unknown` unless signed in.
    pub fn profile(&self) -> ProfileStatus {
        if self.is_authenticated() {
            self.profile
        } else {
            ProfileStatus::Unknown
        }
    }

    pub fn has_profile(&self) -> Option<bool> {
        self.profile().as_bool()
    }
}

/// Discrete session signals. State itself is published as snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(UserSummary),
    SignedOut,
    /// The server rejected the credential; navigate to the login screen.
    RedirectToLogin,
}

/// Result of a successful login or registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub user: UserSummary,
    pub has_profile: bool,
}

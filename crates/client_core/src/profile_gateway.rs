//! Typed calls to `/profiles/me`.

use std::sync::Arc;

use shared::{
    domain::Profile,
    protocol::{NewProfile, ProfileChanges},
};

use crate::{error::TransportError, transport::Transport};

const PROFILE_PATH: &str = "/profiles/me";

#[derive(Clone)]
pub struct ProfileGateway {
    transport: Arc<Transport>,
}

impl ProfileGateway {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    /// `Ok(None)` when the user has not completed onboarding yet.
    pub async fn get_profile(&self) -> Result<Option<Profile>, TransportError> {
        match self.transport.get(PROFILE_PATH).await {
            Ok(profile) => Ok(Some(profile)),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }

    pub async fn create_profile(&self, profile: &NewProfile) -> Result<Profile, TransportError> {
        self.transport.post(PROFILE_PATH, profile).await
    }

    pub async fn update_profile(
        &self,
        changes: &ProfileChanges,
    ) -> Result<Profile, TransportError> {
        self.transport.put(PROFILE_PATH, changes).await
    }
}

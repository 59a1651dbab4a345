//! Period and mood log endpoints. Every call here is protected, so a
//! rejected credential surfaces through the transport's expiry reaction.

use std::sync::Arc;

use shared::{
    domain::{MoodEntry, MoodId, PeriodId, PeriodRecord},
    protocol::{NewMood, NewPeriod, RecordQuery},
};

use crate::{error::TransportError, transport::Transport};

#[derive(Clone)]
pub struct RecordsGateway {
    transport: Arc<Transport>,
}

impl RecordsGateway {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    pub async fn list_periods(
        &self,
        query: &RecordQuery,
    ) -> Result<Vec<PeriodRecord>, TransportError> {
        self.transport.get_with_query("/periods/", query).await
    }

    pub async fn create_period(&self, period: &NewPeriod) -> Result<PeriodRecord, TransportError> {
        self.transport.post("/periods/", period).await
    }

    pub async fn get_period(&self, id: PeriodId) -> Result<PeriodRecord, TransportError> {
        self.transport.get(&format!("/periods/{}", id.0)).await
    }

    pub async fn update_period(
        &self,
        id: PeriodId,
        period: &NewPeriod,
    ) -> Result<PeriodRecord, TransportError> {
        self.transport.put(&format!("/periods/{}", id.0), period).await
    }

    pub async fn delete_period(&self, id: PeriodId) -> Result<(), TransportError> {
        self.transport.delete(&format!("/periods/{}", id.0)).await
    }

    pub async fn list_moods(&self, query: &RecordQuery) -> Result<Vec<MoodEntry>, TransportError> {
        self.transport.get_with_query("/moods/", query).await
    }

    pub async fn create_mood(&self, mood: &NewMood) -> Result<MoodEntry, TransportError> {
        self.transport.post("/moods/", mood).await
    }

    pub async fn get_mood(&self, id: MoodId) -> Result<MoodEntry, TransportError> {
        self.transport.get(&format!("/moods/{}", id.0)).await
    }

    pub async fn update_mood(
        &self,
        id: MoodId,
        mood: &NewMood,
    ) -> Result<MoodEntry, TransportError> {
        self.transport.put(&format!("/moods/{}", id.0), mood).await
    }

    pub async fn delete_mood(&self, id: MoodId) -> Result<(), TransportError> {
        self.transport.delete(&format!("/moods/{}", id.0)).await
    }
}

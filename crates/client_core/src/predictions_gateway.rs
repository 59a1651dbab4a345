//! Typed calls to the `/predictions` and `/insights` endpoints.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;
use shared::protocol::{
    CyclePrediction, HistoryRange, Insights, ModelStatusReport, NewPeriod, PredictionHistory,
    PredictionQuery, RetrainReport, SevenDayPlan,
};

use crate::{error::TransportError, transport::Transport};

#[derive(Clone)]
pub struct PredictionsGateway {
    transport: Arc<Transport>,
}

impl PredictionsGateway {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    /// Forecast for `target_date`, or for today when `None`.
    pub async fn current(
        &self,
        target_date: Option<NaiveDate>,
    ) -> Result<CyclePrediction, TransportError> {
        let query = PredictionQuery { target_date };
        self.transport
            .get_with_query("/predictions/current", &query)
            .await
    }

    pub async fn history(&self, range: &HistoryRange) -> Result<PredictionHistory, TransportError> {
        self.transport
            .get_with_query("/predictions/history", range)
            .await
    }

    pub async fn retrain(&self) -> Result<RetrainReport, TransportError> {
        self.transport.post_empty("/predictions/retrain").await
    }

    /// Report an observed period so future forecasts can be corrected. The
    /// reply shape is server-defined.
    pub async fn confirm_period(&self, period: &NewPeriod) -> Result<Value, TransportError> {
        self.transport
            .post("/predictions/confirm-period", period)
            .await
    }

    pub async fn model_status(&self) -> Result<ModelStatusReport, TransportError> {
        self.transport.get("/predictions/model-status").await
    }

    pub async fn cycle_info(&self) -> Result<Value, TransportError> {
        self.transport.get("/predictions/cycle-info").await
    }

    pub async fn seven_day_plan(&self) -> Result<SevenDayPlan, TransportError> {
        self.transport.get("/predictions/7-day-plan").await
    }

    pub async fn insights(&self) -> Result<Insights, TransportError> {
        self.transport.get("/insights/").await
    }
}

#[cfg(test)]
#[path = "tests/predictions_gateway_tests.rs"]
mod tests;

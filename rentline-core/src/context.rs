use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Per-request working context passed explicitly through every engine call.
/// `now` is fixed once per request so every step sees the same instant.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub now: DateTime<Utc>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            now,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::models::message::Outbound;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Sent,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "sent" => Ok(DeliveryStatus::Sent),
            other => Err(anyhow::anyhow!("unknown delivery status {:?}", other)),
        }
    }
}

// Outbox row. Ids grow with creation order.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNotification {
    pub id: u64,
    pub recipient: String,
    pub body: Outbound,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
}

//! Persisted user record shape.
//!
//! The user store keeps quota state inside a larger user document:
//!
//! ```json
//! {
//!   "email": "…",
//!   "usageStats": {
//!     "subscription": { "tier": "premium", "isActive": true, "totalUsed": 2,
//!                       "ceiling": 50, "startDate": "…", "endDate": "…" },
//!     "today": 4,
//!     "lastGeneratedAt": "2024-05-01T09:30:00Z",
//!     "totalGenerated": 17
//!   }
//! }
//! ```
//!
//! Fields outside `usageStats` are carried through untouched.

use super::{PeriodCounters, Tier, UserQuota};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors raised when a stored record cannot be turned into a [`UserQuota`].
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The document does not have the expected shape or types.
    #[error("malformed user record: {0}")]
    Malformed(#[from] serde_json::Error),
    /// A premium subscription without an end date never expires.
    #[error("premium subscription has no end date")]
    MissingEndDate,
    /// The subscription ends before it starts.
    #[error("subscription ends ({end}) before it starts ({start})")]
    EndsBeforeStart { start: DateTime<Utc>, end: DateTime<Utc> },
}

/// Full user document as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub usage_stats: UsageStats,
    /// Everything else on the user document.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub subscription: SubscriptionRecord,
    #[serde(default)]
    pub today: u32,
    #[serde(default)]
    pub last_generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_generated: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub tier: Tier,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub total_used: u32,
    pub ceiling: u32,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Parse a stored document.
    pub fn from_json(value: serde_json::Value) -> Result<Self, RecordError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Render back to a document.
    pub fn to_json(&self) -> Result<serde_json::Value, RecordError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Validated quota state.
    pub fn quota(&self) -> Result<UserQuota, RecordError> {
        UserQuota::try_from(&self.usage_stats)
    }

    /// Write quota state back, leaving the rest of the document alone.
    pub fn set_quota(&mut self, quota: &UserQuota) {
        self.usage_stats = UsageStats::from(quota);
    }
}

impl TryFrom<&UsageStats> for UserQuota {
    type Error = RecordError;

    fn try_from(stats: &UsageStats) -> Result<Self, Self::Error> {
        let sub = &stats.subscription;
        if sub.tier == Tier::Premium && sub.end_date.is_none() {
            return Err(RecordError::MissingEndDate);
        }
        if let Some(end) = sub.end_date {
            if end < sub.start_date {
                return Err(RecordError::EndsBeforeStart { start: sub.start_date, end });
            }
        }
        Ok(UserQuota {
            tier: sub.tier,
            is_active: sub.is_active,
            start_date: sub.start_date,
            end_date: sub.end_date,
            total_used: sub.total_used,
            ceiling: sub.ceiling,
            last_generated_at: stats.last_generated_at,
            period_counters: PeriodCounters { today: stats.today },
            total_generated: stats.total_generated,
        })
    }
}

impl From<&UserQuota> for UsageStats {
    fn from(quota: &UserQuota) -> Self {
        UsageStats {
            subscription: SubscriptionRecord {
                tier: quota.tier,
                is_active: quota.is_active,
                total_used: quota.total_used,
                ceiling: quota.ceiling,
                start_date: quota.start_date,
                end_date: quota.end_date,
            },
            today: quota.period_counters.today,
            last_generated_at: quota.last_generated_at,
            total_generated: quota.total_generated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn premium_doc() -> serde_json::Value {
        json!({
            "email": "student@example.org",
            "usageStats": {
                "subscription": {
                    "tier": "premium",
                    "isActive": true,
                    "totalUsed": 2,
                    "ceiling": 50,
                    "startDate": "2024-05-01T00:00:00Z",
                    "endDate": "2024-05-31T00:00:00Z"
                },
                "today": 4,
                "lastGeneratedAt": "2024-05-02T09:30:00Z",
                "totalGenerated": 17
            }
        })
    }

    #[test]
    fn parses_premium_record() {
        let record = UserRecord::from_json(premium_doc()).unwrap();
        let quota = record.quota().unwrap();
        assert_eq!(quota.tier, Tier::Premium);
        assert_eq!(quota.total_used, 2);
        assert_eq!(quota.period_counters.today, 4);
        assert_eq!(quota.total_generated, 17);
        assert_eq!(record.rest["email"], "student@example.org");
    }

    #[test]
    fn set_quota_preserves_other_fields() {
        let mut record = UserRecord::from_json(premium_doc()).unwrap();
        let mut quota = record.quota().unwrap();
        quota.period_counters.today = 5;
        record.set_quota(&quota);

        let doc = record.to_json().unwrap();
        assert_eq!(doc["usageStats"]["today"], 5);
        assert_eq!(doc["email"], "student@example.org");
        assert_eq!(doc["usageStats"]["subscription"]["totalUsed"], 2);
    }

    #[test]
    fn rejects_wrong_types() {
        let mut doc = premium_doc();
        doc["usageStats"]["subscription"]["totalUsed"] = json!("two");
        assert!(matches!(UserRecord::from_json(doc), Err(RecordError::Malformed(_))));

        let mut doc = premium_doc();
        doc["usageStats"]["subscription"]["tier"] = json!("gold");
        assert!(matches!(UserRecord::from_json(doc), Err(RecordError::Malformed(_))));
    }

    #[test]
    fn rejects_premium_without_end() {
        let mut doc = premium_doc();
        doc["usageStats"]["subscription"]["endDate"] = json!(null);
        let record = UserRecord::from_json(doc).unwrap();
        assert!(matches!(record.quota(), Err(RecordError::MissingEndDate)));
    }

    #[test]
    fn rejects_end_before_start() {
        let mut doc = premium_doc();
        doc["usageStats"]["subscription"]["endDate"] = json!("2024-04-01T00:00:00Z");
        let record = UserRecord::from_json(doc).unwrap();
        assert!(matches!(record.quota(), Err(RecordError::EndsBeforeStart { .. })));
    }

    #[test]
    fn free_record_defaults_missing_counters() {
        let doc = json!({
            "usageStats": {
                "subscription": { "tier": "free", "ceiling": 3, "startDate": "2024-05-01T00:00:00Z" }
            }
        });
        let quota = UserRecord::from_json(doc).unwrap().quota().unwrap();
        assert_eq!(quota.tier, Tier::Free);
        assert_eq!(quota.total_used, 0);
        assert_eq!(quota.last_generated_at, None);
        assert!(!quota.is_active);
    }
}

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use scenario_governor::quota::{QuotaStore, Tier, UserQuota};
use scenario_governor::selector::{Catalog, DiseaseEntry, Rarity};
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// Premium record that last generated at `last` with `today` generations counted.
pub fn premium_quota(
    start: DateTime<Utc>,
    today: u32,
    last: Option<DateTime<Utc>>,
) -> UserQuota {
    let mut quota = UserQuota::free(50, start);
    quota.tier = Tier::Premium;
    quota.is_active = true;
    quota.end_date = Some(start + chrono::Duration::days(30));
    quota.period_counters.today = today;
    quota.last_generated_at = last;
    quota
}

/// Store whose reads and writes always fail.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl QuotaStore for FailingStore {
    type Error = io::Error;

    async fn load(&self, _user_id: &str) -> Result<Option<UserQuota>, Self::Error> {
        Err(io::Error::new(io::ErrorKind::ConnectionRefused, "store offline"))
    }

    async fn save(&self, _user_id: &str, _quota: &UserQuota) -> Result<(), Self::Error> {
        Err(io::Error::new(io::ErrorKind::ConnectionRefused, "store offline"))
    }
}

/// Store that reads fine but refuses writes.
#[derive(Debug, Clone, Default)]
pub struct ReadOnlyStore {
    pub inner: scenario_governor::quota::InMemoryQuotaStore,
}

#[async_trait]
impl QuotaStore for ReadOnlyStore {
    type Error = io::Error;

    async fn load(&self, user_id: &str) -> Result<Option<UserQuota>, Self::Error> {
        Ok(self.inner.get(user_id))
    }

    async fn save(&self, _user_id: &str, _quota: &UserQuota) -> Result<(), Self::Error> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only replica"))
    }
}

pub fn cardiology_catalog() -> Catalog {
    Catalog::new().with_domain(
        "Cardiology",
        [
            DiseaseEntry::new("Myocardial Infarction", Rarity::Common),
            DiseaseEntry::new("Pericarditis", Rarity::Rare),
        ],
    )
}

/// One domain with every rarity band populated.
pub fn balanced_catalog() -> Catalog {
    Catalog::new().with_domain(
        "Internal Medicine",
        [
            DiseaseEntry::new("Hypertension", Rarity::VeryCommon),
            DiseaseEntry::new("Type 2 Diabetes", Rarity::Common),
            DiseaseEntry::new("Sarcoidosis", Rarity::Uncommon),
            DiseaseEntry::new("Addison Disease", Rarity::Rare),
            DiseaseEntry::new("Erdheim-Chester Disease", Rarity::VeryRare),
        ],
    )
}

/// Captures formatted tracing output for assertions.
#[derive(Clone, Default)]
pub struct SharedWriter(pub Arc<Mutex<Vec<u8>>>);

impl SharedWriter {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

pub struct SharedGuard(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

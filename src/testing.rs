//! Test doubles shared by the unit tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::api::{
  ApiFuture, ClaimResult, DownlinePage, DownlineRequest, MemberDetail, MemberSummary, RateTable,
  RateTier, Referral, RewardsApi,
};
use crate::cache::{CacheStore, SqliteStorage};
use crate::clock::ManualClock;
use crate::coalesce::RequestCoalescer;
use crate::domain::Domain;
use crate::manager::{DomainManager, ManagerDeps};
use crate::notify::Notifier;
use crate::session::StaticSession;

pub const STALE_WINDOW_SECS: i64 = 300;

/// Canned responses, read when a call is made.
pub struct Responses {
  pub rate: Result<RateTable, String>,
  pub downline: Result<Vec<Referral>, String>,
  pub summary: Result<MemberSummary, String>,
  pub detail: Result<MemberDetail, String>,
  pub claim: Result<ClaimResult, String>,
}

impl Default for Responses {
  fn default() -> Self {
    let joined = |day: u32| -> DateTime<Utc> {
      Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap()
    };
    let referral = |username: &str, nickname: &str, day: u32, wagered: f64| Referral {
      username: username.to_string(),
      nickname: nickname.to_string(),
      joined_at: joined(day),
      total_wagered: wagered,
      earned: wagered * 0.1,
    };

    Self {
      rate: Ok(RateTable {
        tiers: vec![
          RateTier {
            level: 1,
            rate: 0.1,
          },
          RateTier {
            level: 2,
            rate: 0.05,
          },
        ],
      }),
      downline: Ok(vec![
        referral("u-3", "mallory", 20, 120.0),
        referral("u-1", "Bob", 18, 40.0),
        referral("u-2", "alice", 11, 300.0),
        referral("u-4", "Trent", 2, 5.0),
      ]),
      summary: Ok(MemberSummary {
        total_earned: 140.0,
        claimable: 40.0,
        total_referrals: 4,
        active_referrals: 3,
      }),
      detail: Ok(MemberDetail {
        username: "alice".to_string(),
        referral_code: Some("ALICE10".to_string()),
        tier: 1,
        referred_by: None,
      }),
      claim: Ok(ClaimResult {
        amount_claimed: 12.5,
      }),
    }
  }
}

/// Scripted [`RewardsApi`] that counts calls and can hold responses back.
#[derive(Default)]
pub struct FakeApi {
  rate_calls: AtomicUsize,
  downline_calls: AtomicUsize,
  summary_calls: AtomicUsize,
  detail_calls: AtomicUsize,
  claim_calls: AtomicUsize,
  responses: Mutex<Responses>,
  gate: Mutex<Option<Arc<Semaphore>>>,
  downline_requests: Mutex<Vec<DownlineRequest>>,
}

impl FakeApi {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn respond(&self, f: impl FnOnce(&mut Responses)) {
    f(&mut self.responses.lock().unwrap());
  }

  /// Calls made from now on stay pending until [`release`](Self::release).
  pub fn hold(&self) {
    *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
  }

  pub fn release(&self) {
    if let Some(gate) = self.gate.lock().unwrap().take() {
      // Closing wakes every waiter at once
      gate.close();
    }
  }

  pub fn rate_calls(&self) -> usize {
    self.rate_calls.load(Ordering::SeqCst)
  }

  pub fn downline_calls(&self) -> usize {
    self.downline_calls.load(Ordering::SeqCst)
  }

  pub fn summary_calls(&self) -> usize {
    self.summary_calls.load(Ordering::SeqCst)
  }

  pub fn detail_calls(&self) -> usize {
    self.detail_calls.load(Ordering::SeqCst)
  }

  pub fn claim_calls(&self) -> usize {
    self.claim_calls.load(Ordering::SeqCst)
  }

  /// Calls that need credentials, claims excluded.
  pub fn member_calls(&self) -> usize {
    self.downline_calls() + self.summary_calls() + self.detail_calls()
  }

  pub fn last_downline_request(&self) -> Option<DownlineRequest> {
    self.downline_requests.lock().unwrap().last().cloned()
  }

  fn reply<T: Send + 'static>(&self, counter: &AtomicUsize, result: Result<T, String>) -> ApiFuture<T> {
    counter.fetch_add(1, Ordering::SeqCst);
    let gate = self.gate.lock().unwrap().clone();
    Box::pin(async move {
      if let Some(gate) = gate {
        let _ = gate.acquire().await;
      }
      result
    })
  }
}

impl RewardsApi for FakeApi {
  fn fetch_rate(&self, _domain: Domain) -> ApiFuture<RateTable> {
    let result = self.responses.lock().unwrap().rate.clone();
    self.reply(&self.rate_calls, result)
  }

  fn fetch_downline(&self, _domain: Domain, request: DownlineRequest) -> ApiFuture<DownlinePage> {
    let result = self
      .responses
      .lock()
      .unwrap()
      .downline
      .clone()
      .map(|records| DownlinePage {
        total_records: records.len() as u64,
        records,
        page: request.page,
      });
    self.downline_requests.lock().unwrap().push(request);
    self.reply(&self.downline_calls, result)
  }

  fn fetch_member_summary(
    &self,
    _domain: Domain,
    _username: &str,
    _token: &str,
  ) -> ApiFuture<MemberSummary> {
    let result = self.responses.lock().unwrap().summary.clone();
    self.reply(&self.summary_calls, result)
  }

  fn fetch_member_detail(
    &self,
    _domain: Domain,
    _username: &str,
    _token: &str,
  ) -> ApiFuture<MemberDetail> {
    let result = self.responses.lock().unwrap().detail.clone();
    self.reply(&self.detail_calls, result)
  }

  fn claim(&self, _domain: Domain, _username: &str, _token: &str) -> ApiFuture<ClaimResult> {
    let result = {
      let mut responses = self.responses.lock().unwrap();
      let result = responses.claim.clone();
      // The server moves the claimed amount out of the claimable balance
      if let (Ok(claimed), Ok(summary)) = (&result, &mut responses.summary) {
        summary.claimable -= claimed.amount_claimed;
      }
      result
    };
    self.reply(&self.claim_calls, result)
  }
}

/// Notifier that remembers what it was told.
#[derive(Default)]
pub struct RecordingNotifier {
  successes: Mutex<Vec<String>>,
  errors: Mutex<Vec<String>>,
}

impl RecordingNotifier {
  pub fn successes(&self) -> Vec<String> {
    self.successes.lock().unwrap().clone()
  }

  pub fn errors(&self) -> Vec<String> {
    self.errors.lock().unwrap().clone()
  }
}

impl Notifier for RecordingNotifier {
  fn success(&self, message: &str) {
    self.successes.lock().unwrap().push(message.to_string());
  }

  fn error(&self, message: &str) {
    self.errors.lock().unwrap().push(message.to_string());
  }
}

/// Everything a manager needs, wired to fakes and an in-memory database.
pub struct Harness {
  pub api: Arc<FakeApi>,
  pub session: Arc<StaticSession>,
  pub notifier: Arc<RecordingNotifier>,
  pub clock: Arc<ManualClock>,
  pub store: CacheStore,
  pub coalescer: RequestCoalescer,
}

impl Harness {
  pub fn new() -> Self {
    Self {
      api: FakeApi::new(),
      session: Arc::new(StaticSession::anonymous()),
      notifier: Arc::new(RecordingNotifier::default()),
      clock: Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
      )),
      store: CacheStore::new(SqliteStorage::open_in_memory().unwrap()),
      coalescer: RequestCoalescer::new(),
    }
  }

  pub fn login(&self) {
    self.session.login("alice", "secret-token");
  }

  pub fn deps(&self) -> ManagerDeps {
    ManagerDeps {
      api: self.api.clone(),
      session: self.session.clone(),
      store: self.store.clone(),
      coalescer: self.coalescer.clone(),
      clock: self.clock.clone(),
      notifier: self.notifier.clone(),
      stale_window: Duration::seconds(STALE_WINDOW_SECS),
      records_per_page: 10,
    }
  }

  /// A fresh manager over the shared store, as after a restart.
  pub fn manager(&self, domain: Domain) -> DomainManager {
    DomainManager::new(domain, self.deps())
  }
}

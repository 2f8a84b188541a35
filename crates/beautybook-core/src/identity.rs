//! C10 Identity Verification: stateful handshake with an external broker,
//! mapped into internal CI/DI uniqueness.

use crate::error::CoreError;
use crate::types::IdentityVerification;
use crate::types::IdentityVerificationStatus;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Restrictions passed into the broker as typed "bypass" parameters.
#[derive(Debug, Clone)]
pub struct VerificationRestrictions {
    pub min_age: Option<u8>,
    pub allowed_carriers: Vec<String>,
}

/// Authoritative result fetched from the broker once the client completes
/// its out-of-band flow. `verified = false` maps to `status = failed`.
#[derive(Debug, Clone)]
pub struct BrokerResult {
    pub verified: bool,
    pub ci: Option<String>,
    pub di: Option<String>,
    pub name: Option<String>,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub operator: Option<String>,
}

/// Port the broker adapter implements. Kept synchronous at the trait
/// boundary so the engine stays testable without an executor; the service
/// crate's adapter wraps its real (mock) async client with a blocking
/// handoff.
pub trait IdentityBroker: Send + Sync {
    fn prepare(&self, verification_id: &str, restrictions: &VerificationRestrictions) -> String;
    fn fetch_result(&self, verification_id: &str) -> BrokerResult;
}

pub struct IdentityVerificationEngine {
    records: Vec<IdentityVerification>,
}

impl IdentityVerificationEngine {
    pub fn new() -> Self {
        Self { records: Vec::new() }
    }

    pub fn get(&self, verification_id: &str) -> Option<&IdentityVerification> {
        self.records.iter().find(|r| r.verification_id == verification_id)
    }

    /// Clone of every record, for callers that need to build a `ci -> userId`
    /// index ahead of a `verify` call without holding two borrows of `self`
    /// at once (`existing_ci_owner` below only learns the `ci` it must look
    /// up *inside* `verify`, after the broker round-trip).
    pub fn snapshot(&self) -> Vec<IdentityVerification> {
        self.records.clone()
    }

    /// `prepare(verificationId, customer, restrictions)`. Persists a
    /// `ready` record and returns the client-SDK token the broker minted.
    pub fn prepare(
        &mut self,
        broker: &dyn IdentityBroker,
        verification_id: &str,
        restrictions: &VerificationRestrictions,
        now: DateTime<Utc>,
    ) -> String {
        let token = broker.prepare(verification_id, restrictions);
        self.records.push(IdentityVerification {
            id: Uuid::new_v4().to_string(),
            verification_id: verification_id.to_string(),
            user_id: None,
            status: IdentityVerificationStatus::Ready,
            ci: None,
            di: None,
            name: None,
            birth_date: None,
            gender: None,
            operator: None,
            verified_at: None,
            created_at: now,
        });
        token
    }

    /// `verify(verificationId)`. Fetches the broker's authoritative result,
    /// enforces global CI uniqueness (`existing_ci_owner` is looked up by
    /// the caller across non-deleted users), re-checks age server-side, and
    /// attaches the verification to `user_id` on success.
    pub fn verify(
        &mut self,
        broker: &dyn IdentityBroker,
        verification_id: &str,
        user_id: &str,
        min_age: Option<u8>,
        existing_ci_owner: impl FnOnce(&str) -> Option<String>,
        now: DateTime<Utc>,
    ) -> Result<IdentityVerification, CoreError> {
        let idx = self
            .records
            .iter()
            .position(|r| r.verification_id == verification_id)
            .ok_or_else(|| CoreError::not_found("identity_verification", verification_id))?;

        let result = broker.fetch_result(verification_id);

        if !result.verified {
            self.records[idx].status = IdentityVerificationStatus::Failed;
            return Ok(self.records[idx].clone());
        }

        if let (Some(min_age), Some(birth_date)) = (min_age, result.birth_date.as_deref()) {
            if !meets_min_age(birth_date, min_age, now) {
                self.records[idx].status = IdentityVerificationStatus::Failed;
                return Ok(self.records[idx].clone());
            }
        }

        if let Some(ci) = result.ci.as_deref() {
            if let Some(owner) = existing_ci_owner(ci) {
                if owner != user_id {
                    self.records[idx].status = IdentityVerificationStatus::Failed;
                    return Err(CoreError::DuplicateUser(ci.to_string()));
                }
            }
        }

        self.records[idx].status = IdentityVerificationStatus::Verified;
        self.records[idx].user_id = Some(user_id.to_string());
        self.records[idx].ci = result.ci;
        self.records[idx].di = result.di;
        self.records[idx].name = result.name;
        self.records[idx].birth_date = result.birth_date;
        self.records[idx].gender = result.gender;
        self.records[idx].operator = result.operator;
        self.records[idx].verified_at = Some(now);

        Ok(self.records[idx].clone())
    }
}

impl Default for IdentityVerificationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// `birth_date` is `YYYY-MM-DD`. Returns `false` on an unparsable date
/// rather than panicking — the broker is an external system.
fn meets_min_age(birth_date: &str, min_age: u8, now: DateTime<Utc>) -> bool {
    match chrono::NaiveDate::parse_from_str(birth_date, "%Y-%m-%d") {
        Ok(dob) => {
            let today = now.date_naive();
            let age = today.years_since(dob).unwrap_or(0);
            age >= min_age as u32
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct StubBroker {
        result: RefCell<BrokerResult>,
    }

    impl IdentityBroker for StubBroker {
        fn prepare(&self, verification_id: &str, _restrictions: &VerificationRestrictions) -> String {
            format!("token-{verification_id}")
        }

        fn fetch_result(&self, _verification_id: &str) -> BrokerResult {
            self.result.borrow().clone()
        }
    }

    fn verified_result(ci: &str) -> BrokerResult {
        BrokerResult {
            verified: true,
            ci: Some(ci.to_string()),
            di: Some("di-1".to_string()),
            name: Some("Hong Gildong".to_string()),
            birth_date: Some("2000-01-01".to_string()),
            gender: Some("M".to_string()),
            operator: Some("SKT".to_string()),
        }
    }

    #[test]
    fn prepare_then_verify_attaches_to_user() {
        let mut engine = IdentityVerificationEngine::new();
        let broker = StubBroker {
            result: RefCell::new(verified_result("ci-abc")),
        };
        engine.prepare(&broker, "v-1", &VerificationRestrictions { min_age: None, allowed_carriers: vec![] }, Utc::now());
        let record = engine
            .verify(&broker, "v-1", "user-x", None, |_| None, Utc::now())
            .unwrap();
        assert_eq!(record.status, IdentityVerificationStatus::Verified);
        assert_eq!(record.user_id.as_deref(), Some("user-x"));
    }

    #[test]
    fn duplicate_ci_is_rejected_for_a_different_user() {
        let mut engine = IdentityVerificationEngine::new();
        let broker = StubBroker {
            result: RefCell::new(verified_result("ci-abc")),
        };
        engine.prepare(&broker, "v-2", &VerificationRestrictions { min_age: None, allowed_carriers: vec![] }, Utc::now());
        let err = engine
            .verify(&broker, "v-2", "user-y", None, |_| Some("user-x".to_string()), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateUser(_)));

        let record = engine.get("v-2").unwrap();
        assert_eq!(record.status, IdentityVerificationStatus::Failed);
    }

    #[test]
    fn under_age_post_check_fails_verification() {
        let mut engine = IdentityVerificationEngine::new();
        let mut result = verified_result("ci-minor");
        result.birth_date = Some(format!("{}-01-01", Utc::now().format("%Y").to_string().parse::<i32>().unwrap() - 10));
        let broker = StubBroker {
            result: RefCell::new(result),
        };
        engine.prepare(&broker, "v-3", &VerificationRestrictions { min_age: Some(19), allowed_carriers: vec![] }, Utc::now());
        let record = engine
            .verify(&broker, "v-3", "user-z", Some(19), |_| None, Utc::now())
            .unwrap();
        assert_eq!(record.status, IdentityVerificationStatus::Failed);
    }
}

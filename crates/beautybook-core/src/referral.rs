//! C9 Referral Attribution: code issuance, chain validation, and commission
//! computation on settled payments.
//!
//! Crediting the referrer is performed by the caller via `PointLedger`; this
//! engine only resolves the referrer, computes the bonus, and tracks the
//! profile fields (`tier`, `successful_referrals`, `lifetime_commission`,
//! `influencer_qualified_at`) the commission and promotion rules depend on.

use crate::error::CoreError;
use crate::types::{ReferralProfile, ReferralTier};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;

pub struct ReferralEngine {
    profiles: HashMap<String, ReferralProfile>,
    by_code: HashMap<String, String>,
}

impl ReferralEngine {
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
            by_code: HashMap::new(),
        }
    }

    pub fn profile(&self, user_id: &str) -> Option<&ReferralProfile> {
        self.profiles.get(user_id)
    }

    /// Issues a stable `referral_code` for a newly created account.
    pub fn issue_code(&mut self, user_id: &str) -> ReferralProfile {
        let code = generate_referral_code();
        let profile = ReferralProfile {
            user_id: user_id.to_string(),
            referral_code: code.clone(),
            referred_by_code: None,
            tier: ReferralTier::Standard,
            successful_referrals: 0,
            lifetime_commission: 0,
            influencer_qualified_at: None,
        };
        self.by_code.insert(code, user_id.to_string());
        self.profiles.insert(user_id.to_string(), profile.clone());
        profile
    }

    fn resolve_referrer(&self, code: &str) -> Option<String> {
        self.by_code.get(code).cloned()
    }

    /// Sets `referred_by_code` once at onboarding. Rejects codes that would
    /// introduce a cycle (`referrerId == referredId`, or a chain where the
    /// referrer's own referrer transitively points back to `user_id`).
    pub fn set_referred_by_code(&mut self, user_id: &str, code: &str) -> Result<(), CoreError> {
        let referrer_id = self
            .resolve_referrer(code)
            .ok_or_else(|| CoreError::Validation("unknown referral code".to_string()))?;

        if referrer_id == user_id {
            return Err(CoreError::Validation("referrerId must not equal referredId".to_string()));
        }
        if self
            .profiles
            .get(user_id)
            .and_then(|p| p.referred_by_code.as_ref())
            .is_some()
        {
            return Err(CoreError::ConflictState(
                "referred_by_code is already set and cannot change".to_string(),
            ));
        }
        if self.would_cycle(&referrer_id, user_id) {
            return Err(CoreError::Validation("referral code would introduce a cycle".to_string()));
        }

        let profile = self
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| CoreError::not_found("referral_profile", user_id))?;
        profile.referred_by_code = Some(code.to_string());
        Ok(())
    }

    /// Walks the referrer chain upward from `referrer_id`; a cycle exists if
    /// it ever reaches `candidate_referred_id`.
    fn would_cycle(&self, referrer_id: &str, candidate_referred_id: &str) -> bool {
        let mut current = referrer_id.to_string();
        let mut hops = 0;
        loop {
            if current == candidate_referred_id {
                return true;
            }
            hops += 1;
            if hops > self.profiles.len() + 1 {
                return false;
            }
            match self.profiles.get(&current).and_then(|p| p.referred_by_code.clone()) {
                Some(code) => match self.resolve_referrer(&code) {
                    Some(next) => current = next,
                    None => return false,
                },
                None => return false,
            }
        }
    }

    /// Resolves the referrer for a paying user and computes the commission.
    /// Returns `None` if the payee has no `referred_by_code`. `eligible_amount`
    /// excludes the portion paid with points; `rate` is resolved per the
    /// referrer's current tier.
    pub fn commission_for_payment(
        &self,
        payee_user_id: &str,
        eligible_amount: i64,
        standard_rate: f64,
        influencer_rate: f64,
    ) -> Option<(String, i64)> {
        let payee = self.profiles.get(payee_user_id)?;
        let code = payee.referred_by_code.as_ref()?;
        let referrer_id = self.resolve_referrer(code)?;
        let referrer = self.profiles.get(&referrer_id)?;
        let rate = match referrer.tier {
            ReferralTier::Standard => standard_rate,
            ReferralTier::Influencer => influencer_rate,
        };
        let bonus = ((eligible_amount as f64) * rate).floor() as i64;
        if bonus <= 0 {
            return None;
        }
        Some((referrer_id, bonus))
    }

    /// Records a settled commission against the referrer's lifetime totals
    /// and evaluates influencer promotion. Idempotent: re-applying the same
    /// numbers does not re-set `influencer_qualified_at` once set.
    pub fn record_commission(
        &mut self,
        referrer_id: &str,
        bonus: i64,
        threshold: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let profile = self
            .profiles
            .get_mut(referrer_id)
            .ok_or_else(|| CoreError::not_found("referral_profile", referrer_id))?;
        profile.successful_referrals += 1;
        profile.lifetime_commission += bonus;
        if profile.successful_referrals >= threshold && profile.influencer_qualified_at.is_none() {
            profile.tier = ReferralTier::Influencer;
            profile.influencer_qualified_at = Some(now);
        }
        Ok(())
    }
}

impl Default for ReferralEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_referral_code() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referred_user_resolves_to_referrer_and_computes_bonus() {
        let mut engine = ReferralEngine::new();
        let a = engine.issue_code("user-a");
        engine.issue_code("user-b");
        engine.set_referred_by_code("user-b", &a.referral_code).unwrap();

        let (referrer, bonus) = engine
            .commission_for_payment("user-b", 10_000, 0.05, 0.10)
            .unwrap();
        assert_eq!(referrer, "user-a");
        assert_eq!(bonus, 500);
    }

    #[test]
    fn self_referral_is_rejected() {
        let mut engine = ReferralEngine::new();
        let a = engine.issue_code("user-a");
        let err = engine.set_referred_by_code("user-a", &a.referral_code).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn cyclic_referral_chain_is_rejected() {
        let mut engine = ReferralEngine::new();
        let a = engine.issue_code("user-a");
        let b = engine.issue_code("user-b");
        engine.issue_code("user-c");
        engine.set_referred_by_code("user-b", &a.referral_code).unwrap();
        engine.set_referred_by_code("user-c", &b.referral_code).unwrap();

        let err = engine.set_referred_by_code("user-a", &{
            engine.profile("user-c").unwrap().referral_code.clone()
        });
        assert!(matches!(err, Err(CoreError::Validation(_))));
    }

    #[test]
    fn referred_by_code_cannot_change_once_set() {
        let mut engine = ReferralEngine::new();
        let a = engine.issue_code("user-a");
        let b = engine.issue_code("user-b");
        engine.issue_code("user-c");
        engine.set_referred_by_code("user-c", &a.referral_code).unwrap();
        let err = engine.set_referred_by_code("user-c", &b.referral_code).unwrap_err();
        assert!(matches!(err, CoreError::ConflictState(_)));
    }

    #[test]
    fn influencer_promotion_is_idempotent_past_threshold() {
        let mut engine = ReferralEngine::new();
        engine.issue_code("user-a");
        let now = Utc::now();
        for _ in 0..5 {
            engine.record_commission("user-a", 100, 3, now).unwrap();
        }
        let profile = engine.profile("user-a").unwrap();
        assert_eq!(profile.tier, ReferralTier::Influencer);
        assert_eq!(profile.successful_referrals, 5);
    }
}

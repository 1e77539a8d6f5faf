//! Two named checks composed in order: per-IP throttle, then per-wallet
//! cooldown. Neither writes to the ledger.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use moka::ops::compute::Op;
use moka::sync::Cache;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::address::WalletAddress;
use crate::config::FaucetConfig;
use crate::ledger::{LedgerError, LedgerStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDenial {
    Ip {
        retry_after: Duration,
    },
    Wallet {
        retry_after: Duration,
        next_eligible_at: DateTime<Utc>,
    },
}

impl RateLimitDenial {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Ip { .. } => "ip_rate_limited",
            Self::Wallet { .. } => "wallet_rate_limited",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Ip { .. } => "Rate limit exceeded. Please wait before requesting again.",
            Self::Wallet { .. } => "Rate limit exceeded for this wallet",
        }
    }

    pub fn retry_after(&self) -> Duration {
        match self {
            Self::Ip { retry_after } | Self::Wallet { retry_after, .. } => *retry_after,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(RateLimitDenial),
}

/// At most N requests per IP per rolling window.
///
/// Each IP keeps the instants of its admitted requests inside the window.
/// The check and the append happen in one atomic per-key compute, so
/// concurrent requests from one IP cannot both take the last slot.
pub struct IpThrottle {
    requests_per_window: usize,
    window: Duration,
    admitted: Cache<IpAddr, VecDeque<Instant>>,
}

impl IpThrottle {
    pub fn new(requests_per_window: u32, window: Duration) -> Self {
        assert!(requests_per_window > 0, "IP quota must be positive");
        assert!(!window.is_zero(), "IP window must be non-zero");

        // Every admitted instant is older than the window once the entry
        // has gone unwritten that long
        let admitted = Cache::builder().time_to_live(window).build();
        Self {
            requests_per_window: requests_per_window as usize,
            window,
            admitted,
        }
    }

    /// Consume one slot for `ip`, or report how long until one frees up.
    pub fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), Duration> {
        let mut verdict = Ok(());
        self.admitted.entry(ip).and_compute_with(|entry| {
            let mut log = entry.map(|entry| entry.into_value()).unwrap_or_default();
            while log
                .front()
                .is_some_and(|admitted| now.saturating_duration_since(*admitted) >= self.window)
            {
                log.pop_front();
            }

            if log.len() < self.requests_per_window {
                log.push_back(now);
                return Op::Put(log);
            }
            if let Some(oldest) = log.front() {
                verdict = Err((*oldest + self.window).saturating_duration_since(now));
            }
            Op::Nop
        });
        verdict
    }

    /// Evict expired IP entries and return how many remain tracked.
    pub fn prune(&self) -> u64 {
        self.admitted.run_pending_tasks();
        self.admitted.entry_count()
    }
}

/// Minimum time between successful payouts to one wallet, read from the
/// ledger.
#[derive(Debug, Clone, Copy)]
pub struct WalletCooldown {
    cooldown: TimeDelta,
}

impl WalletCooldown {
    pub fn new(cooldown: TimeDelta) -> Self {
        assert!(cooldown >= TimeDelta::zero(), "Cooldown cannot be negative");
        Self { cooldown }
    }

    pub async fn check(
        &self,
        ledger: &dyn LedgerStore,
        wallet: &WalletAddress,
        now: DateTime<Utc>,
    ) -> Result<Decision, LedgerError> {
        if self.cooldown.is_zero() {
            return Ok(Decision::Allow);
        }

        let since = now - self.cooldown;
        let Some(last) = ledger.latest_success_since(wallet, since).await? else {
            return Ok(Decision::Allow);
        };

        let next_eligible_at = last.created_at.with_timezone(&Utc) + self.cooldown;
        let remaining = next_eligible_at - now;
        // A row exactly at the window edge still counts; keep the wait >= 1s
        let retry_after = remaining.to_std().unwrap_or_default().max(Duration::from_secs(1));
        Ok(Decision::Deny(RateLimitDenial::Wallet {
            retry_after,
            next_eligible_at,
        }))
    }
}

pub struct RateLimiter {
    ip: IpThrottle,
    wallet: WalletCooldown,
}

impl RateLimiter {
    pub fn new(ip: IpThrottle, wallet: WalletCooldown) -> Self {
        Self { ip, wallet }
    }

    pub fn from_config(config: &FaucetConfig) -> Self {
        Self::new(
            IpThrottle::new(config.ip_requests_per_window, config.ip_window()),
            WalletCooldown::new(config.wallet_cooldown()),
        )
    }

    pub fn wallet_cooldown(&self) -> &WalletCooldown {
        &self.wallet
    }

    /// Run the IP throttle, then the wallet cooldown. A passing IP check
    /// consumes its slot even if the wallet check then denies.
    pub async fn may_proceed(
        &self,
        ledger: &dyn LedgerStore,
        ip: IpAddr,
        wallet: &WalletAddress,
    ) -> Result<Decision, LedgerError> {
        if let Err(retry_after) = self.ip.check(ip) {
            debug!(%ip, "IP throttle denied funding request");
            return Ok(Decision::Deny(RateLimitDenial::Ip { retry_after }));
        }

        let decision = self.wallet.check(ledger, wallet, Utc::now()).await?;
        if let Decision::Deny(_) = &decision {
            debug!(%wallet, "Wallet cooldown denied funding request");
        }
        Ok(decision)
    }

    /// Periodically prune idle IP keys until shutdown is signalled.
    pub async fn run_housekeeping(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        assert!(!interval.is_zero(), "Housekeeping interval must be non-zero");
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let tracked = self.ip.prune();
                    debug!(tracked, "Pruned IP throttle state");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Rate limiter housekeeping stopped");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use rust_decimal::Decimal;

    use super::*;
    use crate::ledger::NewLedgerEntry;
    use crate::ledger::memory::MemoryLedger;

    fn wallet() -> WalletAddress {
        WalletAddress::parse(&format!("0x{}", "a".repeat(40))).unwrap()
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_ip_throttle_allows_one_per_window() {
        let throttle = IpThrottle::new(1, Duration::from_secs(60));
        assert!(throttle.check(ip(1)).is_ok());

        let wait = throttle.check(ip(1)).unwrap_err();
        assert!(wait > Duration::from_secs(50));
        assert!(wait <= Duration::from_secs(60));

        assert!(throttle.check(ip(2)).is_ok());
    }

    #[test]
    fn test_ip_throttle_honours_burst() {
        let throttle = IpThrottle::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(throttle.check(ip(7)).is_ok());
        }
        assert!(throttle.check(ip(7)).is_err());
    }

    #[test]
    fn test_ip_throttle_window_is_rolling() {
        let throttle = IpThrottle::new(3, Duration::from_millis(600));
        let start = Instant::now();
        for _ in 0..3 {
            assert!(throttle.check_at(ip(8), start).is_ok());
        }

        let later = start + Duration::from_millis(250);
        assert_eq!(
            throttle.check_at(ip(8), later),
            Err(Duration::from_millis(350))
        );

        // Only the slots admitted a full window ago free up
        let expired = start + Duration::from_millis(600);
        assert!(throttle.check_at(ip(8), expired).is_ok());
        assert!(throttle.check_at(ip(8), expired).is_ok());
        assert!(throttle.check_at(ip(8), expired).is_ok());
        assert!(throttle.check_at(ip(8), expired).is_err());
    }

    #[test]
    fn test_ip_throttle_spaced_requests_respect_window() {
        let throttle = IpThrottle::new(2, Duration::from_secs(10));
        let start = Instant::now();
        assert!(throttle.check_at(ip(9), start).is_ok());
        assert!(throttle.check_at(ip(9), start + Duration::from_secs(4)).is_ok());
        assert_eq!(
            throttle.check_at(ip(9), start + Duration::from_secs(7)),
            Err(Duration::from_secs(3))
        );
        assert!(throttle.check_at(ip(9), start + Duration::from_secs(10)).is_ok());
        assert_eq!(
            throttle.check_at(ip(9), start + Duration::from_secs(11)),
            Err(Duration::from_secs(3))
        );
    }

    #[tokio::test]
    async fn test_wallet_cooldown_boundary() {
        let ledger = MemoryLedger::new();
        let cooldown = WalletCooldown::new(TimeDelta::seconds(60));
        let now = Utc::now();

        let row = ledger
            .insert_at(
                NewLedgerEntry::success(&wallet(), "0xab".into(), Decimal::ONE, None),
                now - TimeDelta::seconds(55),
            )
            .await;
        match cooldown.check(&ledger, &wallet(), now).await.unwrap() {
            Decision::Deny(RateLimitDenial::Wallet {
                retry_after,
                next_eligible_at,
            }) => {
                assert_eq!(retry_after, Duration::from_secs(5));
                assert_eq!(next_eligible_at, now + TimeDelta::seconds(5));
            }
            other => panic!("expected wallet denial, got {other:?}"),
        }

        ledger.backdate(row.id, now - TimeDelta::seconds(65)).await;
        assert_eq!(
            cooldown.check(&ledger, &wallet(), now).await.unwrap(),
            Decision::Allow
        );
    }

    #[tokio::test]
    async fn test_wallet_cooldown_ignores_failed_attempts() {
        let ledger = MemoryLedger::new();
        ledger
            .record(NewLedgerEntry::failure(
                &wallet(),
                Decimal::ONE,
                "node unreachable".into(),
                None,
            ))
            .await
            .unwrap();

        let cooldown = WalletCooldown::new(TimeDelta::minutes(1));
        assert_eq!(
            cooldown.check(&ledger, &wallet(), Utc::now()).await.unwrap(),
            Decision::Allow
        );
    }

    #[tokio::test]
    async fn test_may_proceed_checks_ip_before_wallet() {
        let ledger = MemoryLedger::new();
        let limiter = RateLimiter::new(
            IpThrottle::new(1, Duration::from_secs(60)),
            WalletCooldown::new(TimeDelta::minutes(1)),
        );

        assert_eq!(
            limiter.may_proceed(&ledger, ip(1), &wallet()).await.unwrap(),
            Decision::Allow
        );
        let denied = limiter.may_proceed(&ledger, ip(1), &wallet()).await.unwrap();
        match denied {
            Decision::Deny(denial) => assert_eq!(denial.reason(), "ip_rate_limited"),
            Decision::Allow => panic!("second request from one IP must be throttled"),
        }
    }

    #[test]
    fn test_prune_keeps_active_keys() {
        let throttle = IpThrottle::new(1, Duration::from_secs(60));
        throttle.check(ip(1)).unwrap();
        assert_eq!(throttle.prune(), 1);
    }
}

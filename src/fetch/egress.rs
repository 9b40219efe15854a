//! Egress identity rotation
//!
//! An [`EgressPool`] holds every (proxy, user agent) pair the fetcher may
//! present to a remote service. Each attempt asks the pool's
//! [`SelectionStrategy`] for one, so a retry can leave through a different
//! proxy or announce a different user agent than the attempt before it.

use crate::config::{EgressConfig, EgressStrategy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// User agent sent when none is configured
pub const DEFAULT_USER_AGENT: &str = concat!("stat-harvest/", env!("CARGO_PKG_VERSION"));

/// The outward identity used for one fetch attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EgressIdentity {
    /// Proxy URL, or `None` for a direct connection
    pub proxy: Option<String>,
    pub user_agent: String,
}

impl fmt::Display for EgressIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.proxy {
            Some(proxy) => write!(f, "{} via {}", self.user_agent, proxy),
            None => write!(f, "{} (direct)", self.user_agent),
        }
    }
}

/// Picks an index into a pool of `len` identities
pub trait SelectionStrategy: Send + Sync + fmt::Debug {
    /// `attempt` is the retry attempt number of the fetch, starting at 0
    fn select(&self, len: usize, attempt: u32) -> usize;
}

/// Cycles through the pool in order
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStrategy for RoundRobin {
    fn select(&self, len: usize, _attempt: u32) -> usize {
        if len == 0 {
            return 0;
        }
        self.counter.fetch_add(1, Ordering::Relaxed) % len
    }
}

/// Picks a random identity each time
#[derive(Debug)]
pub struct RandomPick {
    rng: Mutex<StdRng>,
}

impl RandomPick {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic sequence, for tests
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomPick {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStrategy for RandomPick {
    fn select(&self, len: usize, _attempt: u32) -> usize {
        if len == 0 {
            return 0;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.random_range(0..len)
    }
}

/// The set of identities available to a fetch controller
#[derive(Debug)]
pub struct EgressPool {
    identities: Vec<EgressIdentity>,
    strategy: Box<dyn SelectionStrategy>,
}

impl EgressPool {
    /// Builds the cross product of `proxies` and `user_agents`
    ///
    /// No proxies means direct connections; no user agents means
    /// [`DEFAULT_USER_AGENT`].
    pub fn new(
        proxies: &[String],
        user_agents: &[String],
        strategy: Box<dyn SelectionStrategy>,
    ) -> Self {
        let proxies: Vec<Option<String>> = if proxies.is_empty() {
            vec![None]
        } else {
            proxies.iter().cloned().map(Some).collect()
        };
        let user_agents: Vec<String> = if user_agents.is_empty() {
            vec![DEFAULT_USER_AGENT.to_string()]
        } else {
            user_agents.to_vec()
        };

        let identities = proxies
            .iter()
            .flat_map(|proxy| {
                user_agents.iter().map(move |ua| EgressIdentity {
                    proxy: proxy.clone(),
                    user_agent: ua.clone(),
                })
            })
            .collect();

        Self {
            identities,
            strategy,
        }
    }

    pub fn from_config(config: &EgressConfig) -> Self {
        let strategy: Box<dyn SelectionStrategy> = match config.strategy {
            EgressStrategy::Random => Box::new(RandomPick::new()),
            EgressStrategy::RoundRobin => Box::new(RoundRobin::new()),
        };
        Self::new(&config.proxies, &config.user_agents, strategy)
    }

    pub fn identities(&self) -> &[EgressIdentity] {
        &self.identities
    }

    /// Distinct proxies in the pool, `None` standing for a direct connection
    pub fn proxies(&self) -> Vec<Option<String>> {
        let mut proxies: Vec<Option<String>> = Vec::new();
        for identity in &self.identities {
            if !proxies.contains(&identity.proxy) {
                proxies.push(identity.proxy.clone());
            }
        }
        proxies
    }

    /// Picks the identity for the given attempt
    pub fn select(&self, attempt: u32) -> EgressIdentity {
        let index = self.strategy.select(self.identities.len(), attempt);
        self.identities
            .get(index)
            .or_else(|| self.identities.first())
            .cloned()
            .unwrap_or_else(|| EgressIdentity {
                proxy: None,
                user_agent: DEFAULT_USER_AGENT.to_string(),
            })
    }
}

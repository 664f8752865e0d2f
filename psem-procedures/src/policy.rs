//! Per-procedure retry policies
//!
//! Each policy is a declarative record consumed by one generic poll loop in
//! the engine. The built-in table covers the procedures whose timing is
//! known from hardware; anything unlisted gets the generic policy. The
//! table stays open for registration so device variants can add their own
//! entries.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::time::Duration;

use crate::ids::{self, ProcedureId};

/// Procedure class, which selects the busy-write retry delay
///
/// The module class covers procedures serviced by a slow communications
/// co-processor; its delay is tuned against that hardware and is
/// configuration data, not a tunable of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcedureClass {
    #[default]
    Standard,
    Module,
}

impl ProcedureClass {
    /// Delay between retries of a busy/not-ready invocation write
    pub fn busy_write_delay(self) -> Duration {
        match self {
            Self::Standard => Duration::from_secs(2),
            Self::Module => Duration::from_secs(5),
        }
    }
}

/// Timing and retry record for one procedure identifier
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Sleep applied before the first poll of the result table
    pub initial_sleep: Duration,
    /// Sleep between polls
    pub poll_interval: Duration,
    /// Maximum result-table polls, the first included
    pub max_polls: u32,
    /// Send the keep-alive wait service before each sleep; suppressed for
    /// procedures known to mishandle it
    pub send_wait: bool,
    /// Treat a pending result as terminal after the poll budget's first
    /// hit; the fire-and-forget asymmetry kept as an explicit flag
    pub accept_in_progress: bool,
    pub class: ProcedureClass,
}

impl Default for RetryPolicy {
    /// Generic policy for unlisted procedures
    fn default() -> Self {
        Self {
            initial_sleep: Duration::ZERO,
            poll_interval: Duration::from_millis(100),
            max_polls: 20,
            send_wait: true,
            accept_in_progress: false,
            class: ProcedureClass::Standard,
        }
    }
}

static BUILTIN_POLICIES: Lazy<HashMap<ProcedureId, RetryPolicy>> = Lazy::new(|| {
    let mut table = HashMap::new();

    // configuration swap: the device validates and exchanges configuration
    // blocks, over a minute at worst
    table.insert(
        ids::CLOSE_CONFIG,
        RetryPolicy {
            initial_sleep: Duration::from_millis(4500),
            poll_interval: Duration::from_secs(1),
            max_polls: 80,
            ..RetryPolicy::default()
        },
    );

    // the switch capacitor has to charge before the switch can act or the
    // load side can be sampled
    let switch = RetryPolicy {
        poll_interval: Duration::from_secs(5),
        max_polls: 13,
        ..RetryPolicy::default()
    };
    table.insert(ids::REMOTE_CONNECT, switch);
    table.insert(ids::REMOTE_DISCONNECT, switch);
    table.insert(ids::LOAD_SIDE_VOLTAGE, switch);

    // fire-and-forget: a single poll after the radio settles, pending is a
    // terminal answer
    let network = RetryPolicy {
        initial_sleep: Duration::from_secs(4),
        poll_interval: Duration::from_secs(1),
        max_polls: 1,
        send_wait: false,
        accept_in_progress: true,
        ..RetryPolicy::default()
    };
    table.insert(ids::NETWORK_REGISTER, network);
    table.insert(ids::NETWORK_DEREGISTER, network);

    // the security co-processor needs its warm-up before the first poll
    table.insert(
        ids::AUTHENTICATE,
        RetryPolicy {
            initial_sleep: Duration::from_secs(15),
            ..RetryPolicy::default()
        },
    );

    let module = RetryPolicy {
        initial_sleep: Duration::from_secs(5),
        poll_interval: Duration::from_secs(1),
        max_polls: 60,
        class: ProcedureClass::Module,
        ..RetryPolicy::default()
    };
    table.insert(ids::MODULE_CONFIGURE, module);
    table.insert(ids::MODULE_STATUS, module);

    table
});

/// Per-procedure policies over a generic default
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: HashMap<ProcedureId, RetryPolicy>,
    default: RetryPolicy,
}

impl PolicyTable {
    /// Empty table: every procedure gets the generic policy
    pub fn new() -> Self {
        Self {
            policies: HashMap::new(),
            default: RetryPolicy::default(),
        }
    }

    /// Table pre-loaded with the built-in per-procedure policies
    pub fn builtin() -> Self {
        Self {
            policies: BUILTIN_POLICIES.clone(),
            default: RetryPolicy::default(),
        }
    }

    /// Register or replace the policy for one procedure
    pub fn register(&mut self, id: ProcedureId, policy: RetryPolicy) {
        self.policies.insert(id, policy);
    }

    pub fn policy_for(&self, id: ProcedureId) -> RetryPolicy {
        self.policies.get(&id).copied().unwrap_or(self.default)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlisted_procedure_gets_generic_policy() {
        let table = PolicyTable::builtin();
        let policy = table.policy_for(ProcedureId::standard(3));
        assert_eq!(policy.max_polls, 20);
        assert_eq!(policy.poll_interval, Duration::from_millis(100));
        assert!(policy.send_wait);
        assert!(!policy.accept_in_progress);
    }

    #[test]
    fn test_close_config_policy() {
        let policy = PolicyTable::builtin().policy_for(ids::CLOSE_CONFIG);
        assert_eq!(policy.initial_sleep, Duration::from_millis(4500));
        assert_eq!(policy.max_polls, 80);
        assert_eq!(policy.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_switch_policies() {
        for id in [ids::REMOTE_CONNECT, ids::REMOTE_DISCONNECT, ids::LOAD_SIDE_VOLTAGE] {
            let policy = PolicyTable::builtin().policy_for(id);
            assert_eq!(policy.max_polls, 13);
            assert_eq!(policy.poll_interval, Duration::from_secs(5));
        }
    }

    #[test]
    fn test_network_policies_are_fire_and_forget() {
        for id in [ids::NETWORK_REGISTER, ids::NETWORK_DEREGISTER] {
            let policy = PolicyTable::builtin().policy_for(id);
            assert_eq!(policy.max_polls, 1);
            assert_eq!(policy.initial_sleep, Duration::from_secs(4));
            assert!(!policy.send_wait);
            assert!(policy.accept_in_progress);
        }
    }

    #[test]
    fn test_module_class_write_delay() {
        let policy = PolicyTable::builtin().policy_for(ids::MODULE_CONFIGURE);
        assert_eq!(policy.class, ProcedureClass::Module);
        assert_eq!(policy.class.busy_write_delay(), Duration::from_secs(5));
        assert_eq!(
            ProcedureClass::Standard.busy_write_delay(),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_registration_overrides() {
        let mut table = PolicyTable::builtin();
        table.register(
            ids::CLOSE_CONFIG,
            RetryPolicy {
                max_polls: 5,
                ..RetryPolicy::default()
            },
        );
        assert_eq!(table.policy_for(ids::CLOSE_CONFIG).max_polls, 5);
    }
}

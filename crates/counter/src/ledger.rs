use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_core::{
    Aggregate, AggregateId, AggregateRoot, Event, LedgerError, LedgerResult, PrincipalId,
};

/// Counter ledger identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterLedgerId(pub AggregateId);

impl CounterLedgerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CounterLedgerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: CounterLedger.
///
/// Owns the full counter state: one non-negative count per principal plus the
/// ledger-wide global total. The invariant is
/// `global_total == sum of all entries`, maintained by committing every
/// (entry, total) pair inside a single `apply`.
///
/// Entries are created lazily on a principal's first successful write; an
/// absent entry reads as 0 and entries are never removed (reset stores 0).
/// Counts are `u64`; they are assumed to stay below `u64::MAX` (the hosted
/// surface has no upper bound).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterLedger {
    id: CounterLedgerId,
    counts: BTreeMap<PrincipalId, u64>,
    global_total: u64,
    version: u64,
}

impl CounterLedger {
    /// Fresh ledger: no entries, global total 0.
    pub fn new(id: CounterLedgerId) -> Self {
        Self {
            id,
            counts: BTreeMap::new(),
            global_total: 0,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> CounterLedgerId {
        self.id
    }

    /// Current count for `identity`, or 0 if no entry exists. Read-only.
    pub fn get_count(&self, identity: PrincipalId) -> u64 {
        self.counts.get(&identity).copied().unwrap_or(0)
    }

    /// Ledger-wide sum of all counts. Read-only.
    pub fn get_global_total(&self) -> u64 {
        self.global_total
    }
}

impl AggregateRoot for CounterLedger {
    type Id = CounterLedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CountUp (increment the caller's count by 1).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountUp {
    pub caller: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CountUpBy (increment the caller's count by `amount`; 0 is legal).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountUpBy {
    pub caller: PrincipalId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CountDown (decrement the caller's count by 1, guarded).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDown {
    pub caller: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CountDownBy (decrement the caller's count by `amount`, guarded).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDownBy {
    pub caller: PrincipalId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetCount (overwrite the caller's count with `value`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCount {
    pub caller: PrincipalId,
    pub value: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResetCount (equivalent to SetCount with value 0).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetCount {
    pub caller: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterCommand {
    CountUp(CountUp),
    CountUpBy(CountUpBy),
    CountDown(CountDown),
    CountDownBy(CountDownBy),
    SetCount(SetCount),
    ResetCount(ResetCount),
}

/// Event: CountIncremented (entry and global total both grow by `amount`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountIncremented {
    pub caller: PrincipalId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CountDecremented (entry and global total both shrink by `amount`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDecremented {
    pub caller: PrincipalId,
    pub amount: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CountSet (entry overwritten; global total adjusted by the delta).
///
/// Carries the `previous` count so applying stays a pure function of the
/// event: `global_total += value - previous`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSet {
    pub caller: PrincipalId,
    pub previous: u64,
    pub value: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterEvent {
    CountIncremented(CountIncremented),
    CountDecremented(CountDecremented),
    CountSet(CountSet),
}

impl Event for CounterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CounterEvent::CountIncremented(_) => "counter.count.incremented",
            CounterEvent::CountDecremented(_) => "counter.count.decremented",
            CounterEvent::CountSet(_) => "counter.count.set",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CounterEvent::CountIncremented(e) => e.occurred_at,
            CounterEvent::CountDecremented(e) => e.occurred_at,
            CounterEvent::CountSet(e) => e.occurred_at,
        }
    }
}

impl Aggregate for CounterLedger {
    type Command = CounterCommand;
    type Event = CounterEvent;
    type Error = LedgerError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CounterEvent::CountIncremented(e) => {
                let count = self.counts.entry(e.caller).or_insert(0);
                *count += e.amount;
                self.global_total += e.amount;
            }
            CounterEvent::CountDecremented(e) => {
                // `handle` guarantees the entry holds at least `amount`.
                let count = self.counts.entry(e.caller).or_insert(0);
                *count -= e.amount;
                self.global_total -= e.amount;
            }
            CounterEvent::CountSet(e) => {
                let count = self.counts.entry(e.caller).or_insert(0);
                *count = e.value;
                self.global_total = self.global_total - e.previous + e.value;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CounterCommand::CountUp(cmd) => self.handle_count_up(cmd),
            CounterCommand::CountUpBy(cmd) => self.handle_count_up_by(cmd),
            CounterCommand::CountDown(cmd) => self.handle_count_down(cmd),
            CounterCommand::CountDownBy(cmd) => self.handle_count_down_by(cmd),
            CounterCommand::SetCount(cmd) => self.handle_set_count(cmd),
            CounterCommand::ResetCount(cmd) => self.handle_reset_count(cmd),
        }
    }
}

impl CounterLedger {
    fn handle_count_up(&self, cmd: &CountUp) -> Result<Vec<CounterEvent>, LedgerError> {
        Ok(vec![CounterEvent::CountIncremented(CountIncremented {
            caller: cmd.caller,
            amount: 1,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_count_up_by(&self, cmd: &CountUpBy) -> Result<Vec<CounterEvent>, LedgerError> {
        // amount 0 is a legal no-op increment; it still creates the entry.
        Ok(vec![CounterEvent::CountIncremented(CountIncremented {
            caller: cmd.caller,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_count_down(&self, cmd: &CountDown) -> Result<Vec<CounterEvent>, LedgerError> {
        if self.get_count(cmd.caller) == 0 {
            return Err(LedgerError::UnderflowUnit);
        }
        Ok(vec![CounterEvent::CountDecremented(CountDecremented {
            caller: cmd.caller,
            amount: 1,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_count_down_by(&self, cmd: &CountDownBy) -> Result<Vec<CounterEvent>, LedgerError> {
        let count = self.get_count(cmd.caller);
        if cmd.amount > count {
            return Err(LedgerError::UnderflowAmount {
                amount: cmd.amount,
                count,
            });
        }
        Ok(vec![CounterEvent::CountDecremented(CountDecremented {
            caller: cmd.caller,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_count(&self, cmd: &SetCount) -> Result<Vec<CounterEvent>, LedgerError> {
        Ok(vec![CounterEvent::CountSet(CountSet {
            caller: cmd.caller,
            previous: self.get_count(cmd.caller),
            value: cmd.value,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reset_count(&self, cmd: &ResetCount) -> Result<Vec<CounterEvent>, LedgerError> {
        Ok(vec![CounterEvent::CountSet(CountSet {
            caller: cmd.caller,
            previous: self.get_count(cmd.caller),
            value: 0,
            occurred_at: cmd.occurred_at,
        })])
    }
}

/// Direct operation surface, matching the hosted contract interface.
///
/// Each method decides and commits one transition. A rejected guard returns
/// the error with no state change. The hosting dispatcher authenticates
/// `caller` and serializes calls; the ledger holds no locks.
impl CounterLedger {
    /// Increment the caller's count and the global total by 1. Never fails.
    pub fn count_up(&mut self, caller: PrincipalId) -> LedgerResult<bool> {
        self.execute(CounterCommand::CountUp(CountUp {
            caller,
            occurred_at: Utc::now(),
        }))
    }

    /// Increment the caller's count and the global total by `amount`.
    /// `amount = 0` succeeds and is a no-op increment. Never fails.
    pub fn count_up_by(&mut self, caller: PrincipalId, amount: u64) -> LedgerResult<bool> {
        self.execute(CounterCommand::CountUpBy(CountUpBy {
            caller,
            amount,
            occurred_at: Utc::now(),
        }))
    }

    /// Decrement the caller's count and the global total by 1.
    ///
    /// Fails with [`LedgerError::UnderflowUnit`] (code 1) when the count is
    /// already 0.
    pub fn count_down(&mut self, caller: PrincipalId) -> LedgerResult<bool> {
        self.execute(CounterCommand::CountDown(CountDown {
            caller,
            occurred_at: Utc::now(),
        }))
    }

    /// Decrement the caller's count and the global total by `amount`.
    ///
    /// Fails with [`LedgerError::UnderflowAmount`] (code 2) when `amount`
    /// exceeds the current count. `amount = 0` always succeeds.
    pub fn count_down_by(&mut self, caller: PrincipalId, amount: u64) -> LedgerResult<bool> {
        self.execute(CounterCommand::CountDownBy(CountDownBy {
            caller,
            amount,
            occurred_at: Utc::now(),
        }))
    }

    /// Overwrite the caller's count with `value`; the global total moves by
    /// the signed delta against the old count. Never fails.
    pub fn set_count(&mut self, caller: PrincipalId, value: u64) -> LedgerResult<bool> {
        self.execute(CounterCommand::SetCount(SetCount {
            caller,
            value,
            occurred_at: Utc::now(),
        }))
    }

    /// Set the caller's count back to 0, shrinking the global total by the
    /// old count. Never fails.
    pub fn reset_count(&mut self, caller: PrincipalId) -> LedgerResult<bool> {
        self.execute(CounterCommand::ResetCount(ResetCount {
            caller,
            occurred_at: Utc::now(),
        }))
    }

    /// Decide-then-commit in one step.
    ///
    /// Returns `Ok(true)` on success, mirroring the `(ok true)` convention of
    /// the hosted surface.
    fn execute(&mut self, command: CounterCommand) -> LedgerResult<bool> {
        let events = match self.handle(&command) {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!(code = err.code(), %err, "counter command rejected");
                return Err(err);
            }
        };

        for event in &events {
            tracing::debug!(event_type = event.event_type(), "applying counter event");
            self.apply(event);
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_ledger() -> CounterLedger {
        CounterLedger::new(CounterLedgerId::new(AggregateId::new()))
    }

    fn test_principal() -> PrincipalId {
        PrincipalId::new()
    }

    fn sum_of_counts(ledger: &CounterLedger) -> u64 {
        ledger.counts.values().sum()
    }

    #[test]
    fn fresh_ledger_reads_zero_for_any_principal() {
        let ledger = test_ledger();
        assert_eq!(ledger.get_count(test_principal()), 0);
        assert_eq!(ledger.get_global_total(), 0);
    }

    #[test]
    fn count_up_increments_entry_and_total() {
        let mut ledger = test_ledger();
        let caller = test_principal();

        assert_eq!(ledger.count_up(caller), Ok(true));

        assert_eq!(ledger.get_count(caller), 1);
        assert_eq!(ledger.get_global_total(), 1);
    }

    #[test]
    fn count_up_accumulates_across_calls() {
        let mut ledger = test_ledger();
        let caller = test_principal();

        ledger.count_up(caller).unwrap();
        ledger.count_up(caller).unwrap();

        assert_eq!(ledger.get_count(caller), 2);
        assert_eq!(ledger.get_global_total(), 2);
    }

    #[test]
    fn count_up_by_custom_amount() {
        let mut ledger = test_ledger();
        let caller = test_principal();

        assert_eq!(ledger.count_up_by(caller, 5), Ok(true));

        assert_eq!(ledger.get_count(caller), 5);
        assert_eq!(ledger.get_global_total(), 5);
    }

    #[test]
    fn count_up_by_zero_succeeds_without_changing_counts() {
        let mut ledger = test_ledger();
        let caller = test_principal();

        assert_eq!(ledger.count_up_by(caller, 0), Ok(true));

        assert_eq!(ledger.get_count(caller), 0);
        assert_eq!(ledger.get_global_total(), 0);
        // The entry is born on the first successful write, even a no-op one.
        assert!(ledger.counts.contains_key(&caller));
    }

    #[test]
    fn count_down_decrements_a_positive_count() {
        let mut ledger = test_ledger();
        let caller = test_principal();

        ledger.count_up(caller).unwrap();
        ledger.count_up(caller).unwrap();
        assert_eq!(ledger.count_down(caller), Ok(true));

        assert_eq!(ledger.get_count(caller), 1);
        assert_eq!(ledger.get_global_total(), 1);
    }

    #[test]
    fn count_down_at_zero_is_rejected_with_code_1() {
        let mut ledger = test_ledger();
        let caller = test_principal();

        let err = ledger.count_down(caller).unwrap_err();
        assert_eq!(err, LedgerError::UnderflowUnit);
        assert_eq!(err.code(), 1);

        assert_eq!(ledger.get_count(caller), 0);
        assert_eq!(ledger.get_global_total(), 0);
        assert_eq!(ledger.version(), 0);
    }

    #[test]
    fn count_down_by_within_count_succeeds() {
        let mut ledger = test_ledger();
        let caller = test_principal();

        ledger.set_count(caller, 10).unwrap();
        assert_eq!(ledger.count_down_by(caller, 3), Ok(true));

        assert_eq!(ledger.get_count(caller), 7);
        assert_eq!(ledger.get_global_total(), 7);
    }

    #[test]
    fn count_down_by_more_than_count_is_rejected_with_code_2() {
        let mut ledger = test_ledger();
        let caller = test_principal();

        ledger.set_count(caller, 3).unwrap();
        let version_before = ledger.version();

        let err = ledger.count_down_by(caller, 5).unwrap_err();
        assert_eq!(err, LedgerError::UnderflowAmount { amount: 5, count: 3 });
        assert_eq!(err.code(), 2);

        assert_eq!(ledger.get_count(caller), 3);
        assert_eq!(ledger.get_global_total(), 3);
        assert_eq!(ledger.version(), version_before);
    }

    #[test]
    fn count_down_by_zero_always_succeeds() {
        let mut ledger = test_ledger();
        let caller = test_principal();

        assert_eq!(ledger.count_down_by(caller, 0), Ok(true));
        assert_eq!(ledger.get_count(caller), 0);
        assert_eq!(ledger.get_global_total(), 0);
    }

    #[test]
    fn set_count_overwrites_and_adjusts_total_by_delta() {
        let mut ledger = test_ledger();
        let caller = test_principal();

        ledger.set_count(caller, 42).unwrap();
        assert_eq!(ledger.get_count(caller), 42);
        assert_eq!(ledger.get_global_total(), 42);

        // Setting downward shrinks the total by the difference.
        ledger.set_count(caller, 4).unwrap();
        assert_eq!(ledger.get_count(caller), 4);
        assert_eq!(ledger.get_global_total(), 4);
    }

    #[test]
    fn reset_count_zeroes_entry_and_releases_total() {
        let mut ledger = test_ledger();
        let caller = test_principal();
        let other = test_principal();

        ledger.count_up_by(caller, 3).unwrap();
        ledger.count_up_by(other, 2).unwrap();

        assert_eq!(ledger.reset_count(caller), Ok(true));

        assert_eq!(ledger.get_count(caller), 0);
        assert_eq!(ledger.get_count(other), 2);
        assert_eq!(ledger.get_global_total(), 2);
        // Entry persists with value 0 rather than being removed.
        assert!(ledger.counts.contains_key(&caller));
    }

    #[test]
    fn writes_never_touch_another_principals_entry() {
        let mut ledger = test_ledger();
        let alice = test_principal();
        let bob = test_principal();

        ledger.set_count(bob, 9).unwrap();

        ledger.count_up(alice).unwrap();
        ledger.count_up_by(alice, 4).unwrap();
        ledger.count_down(alice).unwrap();
        ledger.set_count(alice, 2).unwrap();
        ledger.reset_count(alice).unwrap();

        assert_eq!(ledger.get_count(bob), 9);
    }

    #[test]
    fn handle_is_pure_until_apply() {
        let mut ledger = test_ledger();
        let caller = test_principal();
        ledger.set_count(caller, 2).unwrap();

        let snapshot = ledger.clone();
        let cmd = CounterCommand::CountDownBy(CountDownBy {
            caller,
            amount: 1,
            occurred_at: Utc::now(),
        });

        let events = ledger.handle(&cmd).unwrap();
        assert_eq!(ledger, snapshot);

        for event in &events {
            ledger.apply(event);
        }
        assert_eq!(ledger.get_count(caller), 1);
        assert_eq!(ledger.version(), snapshot.version() + 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: any sequence of operations by a small set of principals
        /// keeps the global total equal to the sum of all entries, with
        /// rejected decrements changing nothing.
        #[test]
        fn global_total_always_equals_sum_of_counts(
            ops in prop::collection::vec((0u8..6, 0usize..3, 0u64..1_000u64), 1..64)
        ) {
            let mut ledger = test_ledger();
            let principals = [test_principal(), test_principal(), test_principal()];

            for (op, who, amount) in ops {
                let caller = principals[who];
                let before = ledger.clone();

                let outcome = match op {
                    0 => ledger.count_up(caller),
                    1 => ledger.count_up_by(caller, amount),
                    2 => ledger.count_down(caller),
                    3 => ledger.count_down_by(caller, amount),
                    4 => ledger.set_count(caller, amount),
                    _ => ledger.reset_count(caller),
                };

                match outcome {
                    Ok(true) => prop_assert_eq!(ledger.version(), before.version() + 1),
                    Ok(false) => prop_assert!(false, "success is always Ok(true)"),
                    Err(_) => prop_assert_eq!(&ledger, &before),
                }

                prop_assert_eq!(ledger.get_global_total(), sum_of_counts(&ledger));
            }
        }
    }
}

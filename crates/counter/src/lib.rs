//! Counter module (per-principal counters + ledger-wide global total).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod ledger;

pub use ledger::{
    CountDecremented, CountDown, CountDownBy, CountIncremented, CountSet, CountUp, CountUpBy,
    CounterCommand, CounterEvent, CounterLedger, CounterLedgerId, ResetCount, SetCount,
};

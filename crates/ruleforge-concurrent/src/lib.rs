//! Lock-free data structures backing the scheduler's work distribution.
//!
//! - `mpmc`: lock-free bounded multi-producer multi-consumer queue, used as
//!   the scheduler's ready-queue of runnable rules

pub mod mpmc;

// Cache/store coordination: the ephemeral tier, the in-flight dedup map, and
// the coordinator that ties them to the durable store in `db`.

pub mod coordinator;
pub mod ephemeral;
pub mod inflight;

pub use coordinator::{CommitOutcome, ResultCache, StoreFailure};
pub use ephemeral::{EphemeralCache, MemoryCache};
pub use inflight::{ComputeSlot, InFlightMap, SlotGuard, SlotWaiter, WaitOutcome};

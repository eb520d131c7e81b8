//! Cache module: the reconciling task cache state machine and its view.
//!
//! `CacheState` is deliberately synchronous and pure: every reconciliation
//! rule is a plain method over an in-memory sequence, so the whole merge
//! logic is unit-testable without a runtime. The async parts (round-trips,
//! feed pump, serialization of handlers) live in `app::session`.

mod state;
mod view;

pub use state::CacheState;
pub use view::CacheView;

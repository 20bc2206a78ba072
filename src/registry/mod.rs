//! The `registry` module tracks which identities are currently reachable.
//!
//! It is the only state shared between connection lifecycles (which insert
//! and remove entries) and the event relay (which reads them). The contract:
//!
//! - at most one connection per identity; a newer registration replaces the
//!   older one, which stays open but unreachable until it closes on its own
//! - `deregister` only removes the entry if it still belongs to the caller's
//!   connection, so a closing orphan never evicts its replacement
//! - `snapshot` hands out a point-in-time copy, so a scan that sends to
//!   connections never observes a mutation halfway through

pub mod engine;
pub mod identity;

pub use engine::Registry;
pub use identity::Identity;

//! Concrete `Provider` implementations for the JIT privileged-access
//! broker (spec §4.4): an in-memory fixture for tests, a log-backed
//! notifier stand-in, and a remote HTTP proxy for everything else.
//!
//! Every real provider body (AWS IAM, Okta, GitHub, PagerDuty, ...) is out
//! of scope; [`remote::RemoteProvider`] is how this workspace's runner
//! reaches them in production, by forwarding capability calls to an
//! operator-run provider service.

pub mod memory;
pub mod notifier;
pub mod remote;

pub use memory::InMemoryProvider;
pub use notifier::LogNotifier;
pub use remote::RemoteProvider;

//! In-memory test doubles for the UI driver.
//!
//! [`FakePage`] is a tiny scripted document: elements can appear, disappear
//! and become enabled on tokio's clock, and clicks can trigger delayed
//! reactions. Pair it with `#[tokio::test(start_paused = true)]` to exercise
//! waits deterministically. [`Portal`] scripts a whole provider portal on top
//! of it.

mod fake_page;
mod portal;

pub use fake_page::{Effect, FakeElement, FakePage, Interaction};
pub use portal::{Portal, PortalFactory};

//! # souqpay-store
//!
//! The persistence seam of the settlement engine: tenant-scoped document
//! collections with an atomic conditional-update primitive, plus the event
//! outbox and the queue/notification traits the engine publishes through.
//!
//! ## Concurrency model
//!
//! No component assumes a single-threaded host. Every status change that
//! must happen at most once is a conditional update ("update WHERE id = X
//! AND status = expected"); a zero-match result means "already handled".
//! The in-memory [`MemoryStore`] realizes that contract with one mutex per
//! collection, held only for the duration of a single operation — callers
//! never take locks of their own.

pub mod outbox;
pub mod store;

pub use outbox::{EventOutbox, JobQueue, NotificationSink};
pub use store::MemoryStore;

// ============================
// crates/backend-lib/src/store/mod.rs
// ============================
//! Storage seams.
//!
//! Two collaborators back the roulette:
//! - a keyed store holding queue entries and match records, offering
//!   atomic multi-key conditional commits and change notification;
//! - a document store holding chat sessions and their `messages`
//!   subcollections, offering batched all-or-nothing writes.
//!
//! Components receive both as injected trait objects.

pub mod document;
pub mod keyed;
pub mod memory;

pub use document::{ChatCollection, DocPrecondition, DocumentStore, WriteBatch, WriteOp};
pub use keyed::{KeyedStore, Mutation, Precondition, QueueChange, QueueEvent, Transaction, TxOutcome};
pub use memory::{MemoryDocumentStore, MemoryKeyedStore};

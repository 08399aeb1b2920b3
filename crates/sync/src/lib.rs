//! Reading state and its reconciliation.
//!
//! A [`StateSnapshot`] bundles per-book [`ProgressSnapshot`]s and the user's
//! [`BookmarkRecord`]s. Clients keep a local copy while offline and the server
//! keeps the confirmed copy; [`reconcile`] merges the two without ever
//! replacing a newer edit with an older one.
//!
//! Everything in this crate is pure. Reading and writing snapshots from
//! storage, and serialising concurrent writers, is the library's job.

pub mod error;
pub mod models;
mod reconcile;

pub use crate::models::{BookmarkRecord, ProgressSnapshot, StateSnapshot, Timestamp};
pub use crate::reconcile::{BookmarkPolicy, reconcile};

#![doc = "toggl2pl-core: core logic library for toggl2pl."]

//! This crate holds the aggregation and reconciliation engine used to move a
//! day's Toggl time entries into Project Laboratory. No HTTP transport lives
//! here; trackers are reached through the traits in [`contract`].
//!
//! # Usage
//! Fetch entries through an [`contract::EntrySource`], then drive a run with
//! [`synchronise::prepare`], [`synchronise::reconcile_prepared`] and
//! [`synchronise::publish_prepared`]. The pure
//! pieces ([`aggregate`], [`taxonomy`], [`rounding`]) can be called directly.

pub mod aggregate;
pub mod config;
pub mod contract;
pub mod error;
pub mod model;
pub mod publish;
pub mod reconcile;
pub mod rounding;
pub mod synchronise;
pub mod taxonomy;

//! Developer-post ingestion for the developer tracker.
//!
//! Queued Reddit items are fetched with their thread context, normalized into tracker
//! posts, and submitted to the tracker's write API at a bounded rate.

#![allow(clippy::needless_raw_string_hashes)]

pub mod api;
pub mod cache;
pub mod config;
pub mod constants;
pub mod ingest;
pub mod normalize;
pub mod post;
pub mod queue;
pub mod reddit;
pub mod web;

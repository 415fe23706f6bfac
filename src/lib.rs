//! Redis-backed content cache for a headless CMS.
//!
//! Reads go through [`cache::ContentCache`], which serves stored entries and
//! populates misses in the background. CMS webhooks drive invalidation via
//! [`cache::Invalidator`]; [`infra::http`] exposes the webhook, cache
//! administration and content routes.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;

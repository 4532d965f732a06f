#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! FieldHQ Trial & Subscription Lifecycle Engine
//!
//! This crate contains the core subsystem of the platform: the trial clock
//! evaluator, the idempotent reminder dispatcher, the email composition
//! layer, and the subscription mutation engine. Everything here is driven
//! either by the cron entry point in `fieldhq-api` or synchronously from
//! user-facing subscription routes.

pub mod audit;
pub mod clock;
pub mod dispatcher;
pub mod email;
pub mod error;
pub mod mailer;
pub mod pg;
pub mod store;
pub mod subscription;

pub use clock::{assign_bucket, days_remaining, is_expiry_candidate, ReminderBucket};
pub use dispatcher::{ExpiryCounts, ReminderCounts, TrialReminderService};
pub use email::{Branding, EmailContent, Notification};
pub use error::{LifecycleError, LifecycleResult};
pub use mailer::{Mailer, ResendMailer};
pub use pg::PgLifecycleStore;
pub use store::LifecycleStore;
pub use subscription::SubscriptionEngine;

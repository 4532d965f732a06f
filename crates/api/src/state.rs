//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use fieldhq_lifecycle::mailer::MailerConfig;
use fieldhq_lifecycle::{
    Branding, LifecycleStore, Mailer, PgLifecycleStore, ResendMailer, SubscriptionEngine,
    TrialReminderService,
};

use crate::config::Config;

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub reminders: Arc<TrialReminderService>,
    pub subscriptions: Arc<SubscriptionEngine>,
}

impl AppState {
    /// Production wiring: Postgres store, Resend transport
    pub fn new(pool: PgPool, config: Config) -> Self {
        let store: Arc<dyn LifecycleStore> = Arc::new(PgLifecycleStore::new(pool.clone()));
        let mailer: Arc<dyn Mailer> = Arc::new(ResendMailer::new(MailerConfig {
            resend_api_key: config.resend_api_key.clone(),
            email_from: config.email_from.clone(),
            reply_to: None,
        }));
        Self::with_backends(pool, config, store, mailer)
    }

    /// Wiring with injected store and mailer backends
    pub fn with_backends(
        pool: PgPool,
        config: Config,
        store: Arc<dyn LifecycleStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let branding = Branding {
            app_name: "FieldHQ".to_string(),
            support_email: config.support_email.clone(),
            dashboard_url: config.dashboard_url.clone(),
        };
        let reminders = Arc::new(
            TrialReminderService::new(Arc::clone(&store), Arc::clone(&mailer))
                .with_branding(branding.clone()),
        );
        let subscriptions =
            Arc::new(SubscriptionEngine::new(store, mailer).with_branding(branding));
        Self {
            pool,
            config: Arc::new(config),
            reminders,
            subscriptions,
        }
    }
}

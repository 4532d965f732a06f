//! Email composition layer
//!
//! Pure mapping from a notification kind plus typed parameters to a
//! subject and HTML body. No I/O; the dispatcher and the subscription
//! engine hand the rendered content to the outbound transport.
//!
//! Each kind carries its own parameter record so a kind can never receive
//! the wrong shape; rendering is a single exhaustive match.

use fieldhq_shared::Plan;
use time::macros::format_description;
use time::OffsetDateTime;

/// Sender branding embedded in the shared visual wrapper
#[derive(Debug, Clone)]
pub struct Branding {
    pub app_name: String,
    pub support_email: String,
    pub dashboard_url: String,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            app_name: "FieldHQ".to_string(),
            support_email: "support@fieldhq.app".to_string(),
            dashboard_url: "https://app.fieldhq.app".to_string(),
        }
    }
}

/// Rendered email, ready for the outbound transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub html: String,
}

/// The notification kinds the platform sends, each with its typed payload
#[derive(Debug, Clone)]
pub enum Notification {
    Welcome {
        name: String,
    },
    TrialStarted {
        name: String,
        trial_end: OffsetDateTime,
    },
    TrialCheckin {
        name: String,
    },
    TrialReminder {
        name: String,
        days_remaining: i64,
        trial_end: OffsetDateTime,
    },
    TrialExpired {
        name: String,
    },
    SubscriptionActivated {
        name: String,
        plan: Plan,
        monthly_cost_pence: i64,
        next_billing_date: OffsetDateTime,
    },
    PlanUpgraded {
        name: String,
        old_plan: Plan,
        new_plan: Plan,
        monthly_cost_pence: i64,
    },
    PlanDowngraded {
        name: String,
        old_plan: Plan,
        new_plan: Plan,
        effective_date: OffsetDateTime,
    },
    SeatsAdded {
        name: String,
        seats_added: u32,
        total_seats: u32,
        monthly_cost_pence: i64,
    },
    SeatsRemoved {
        name: String,
        seats_removed: u32,
        total_seats: u32,
        monthly_cost_pence: i64,
    },
    PaymentFailed {
        name: String,
        amount_pence: i64,
        retry_date: OffsetDateTime,
    },
    AccountDeletion {
        name: String,
        org_name: String,
    },
    CancellationConfirmed {
        name: String,
        access_until: OffsetDateTime,
    },
}

/// Format an amount in pence as pounds with two decimals, e.g. `£79.00`
pub fn format_gbp(pence: i64) -> String {
    format!("£{:.2}", pence as f64 / 100.0)
}

/// Format a date in UK style, e.g. `14 March 2025`
pub fn format_uk_date(date: OffsetDateTime) -> String {
    let fmt = format_description!("[day padding:none] [month repr:long] [year]");
    date.format(&fmt).unwrap_or_else(|_| "unknown".to_string())
}

/// Shared visual wrapper: header, kind-specific content, footer with
/// support and dashboard links, copyright year computed at render time
fn wrap(branding: &Branding, heading_colour: &str, heading: &str, inner: &str) -> String {
    let year = OffsetDateTime::now_utc().year();
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: {heading_colour};">{heading}</h2>
    {inner}
    <p>
        <a href="{dashboard_url}" style="display: inline-block; padding: 12px 24px; background-color: #6366f1; color: white; text-decoration: none; border-radius: 6px; font-weight: bold;">
            Open Dashboard
        </a>
    </p>
    <p style="color: #666; font-size: 14px;">
        Questions? Contact us at <a href="mailto:{support_email}">{support_email}</a>
    </p>
    <hr style="border: none; border-top: 1px solid #eee; margin: 20px 0;">
    <p style="color: #999; font-size: 12px;">&copy; {year} {app_name}</p>
</body>
</html>"#,
        heading_colour = heading_colour,
        heading = heading,
        inner = inner,
        dashboard_url = branding.dashboard_url,
        support_email = branding.support_email,
        app_name = branding.app_name,
        year = year,
    )
}

impl Notification {
    /// Render to subject and HTML. Assumes the caller passed sane data;
    /// no business state is validated here.
    pub fn render(&self, branding: &Branding) -> EmailContent {
        match self {
            Notification::Welcome { name } => {
                let inner = format!(
                    r#"<p>Hi {name},</p>
    <p>Welcome to {app}! Your account is ready. Raise your first job, build a quote, and invite your team from the dashboard.</p>"#,
                    name = name,
                    app = branding.app_name,
                );
                EmailContent {
                    subject: format!("Welcome to {}", branding.app_name),
                    html: wrap(branding, "#6366f1", "Welcome aboard", &inner),
                }
            }

            Notification::TrialStarted { name, trial_end } => {
                let inner = format!(
                    r#"<p>Hi {name},</p>
    <p>Your 14-day free trial has started. You have full access to every feature until <strong>{end}</strong> — no payment details needed.</p>"#,
                    name = name,
                    end = format_uk_date(*trial_end),
                );
                EmailContent {
                    subject: format!("Your {} trial has started", branding.app_name),
                    html: wrap(branding, "#16a34a", "Your trial has started", &inner),
                }
            }

            Notification::TrialCheckin { name } => {
                let inner = format!(
                    r#"<p>Hi {name},</p>
    <p>You're halfway through your trial — how's it going? If anything is unclear, reply to this email and a real person will help you get set up.</p>"#,
                    name = name,
                );
                EmailContent {
                    subject: "How's your trial going?".to_string(),
                    html: wrap(branding, "#6366f1", "How are you getting on?", &inner),
                }
            }

            Notification::TrialReminder {
                name,
                days_remaining,
                trial_end,
            } => {
                // Urgency switches to the warning style exactly at one day left
                let (colour, heading) = if *days_remaining == 1 {
                    ("#dc2626", "Your trial ends tomorrow")
                } else {
                    ("#f59e0b", "Your trial is ending soon")
                };
                let s = if *days_remaining == 1 { "" } else { "s" };
                let inner = format!(
                    r#"<p>Hi {name},</p>
    <p>Your free trial ends in <strong>{days} day{s}</strong>, on <strong>{end}</strong>.</p>
    <p>To keep your jobs, quotes and safety documents without interruption, choose a plan before then.</p>"#,
                    name = name,
                    days = days_remaining,
                    s = s,
                    end = format_uk_date(*trial_end),
                );
                EmailContent {
                    subject: if *days_remaining == 1 {
                        format!("Your {} trial ends tomorrow", branding.app_name)
                    } else {
                        format!(
                            "{} days left in your {} trial",
                            days_remaining, branding.app_name
                        )
                    },
                    html: wrap(branding, colour, heading, &inner),
                }
            }

            Notification::TrialExpired { name } => {
                let inner = format!(
                    r#"<p>Hi {name},</p>
    <p>Your free trial has ended. Your data is safe, but access is limited until you choose a plan.</p>
    <p>Pick up right where you left off — all your jobs, quotes and documents are waiting.</p>"#,
                    name = name,
                );
                EmailContent {
                    subject: format!("Your {} trial has ended", branding.app_name),
                    html: wrap(branding, "#dc2626", "Your trial has ended", &inner),
                }
            }

            Notification::SubscriptionActivated {
                name,
                plan,
                monthly_cost_pence,
                next_billing_date,
            } => {
                let inner = format!(
                    r#"<p>Hi {name},</p>
    <p>Thanks for subscribing! Your <strong>{plan}</strong> plan is now active.</p>
    <div style="background: #f0fdf4; border: 1px solid #bbf7d0; border-radius: 8px; padding: 16px; margin: 20px 0;">
        <p style="margin: 0 0 8px 0;"><strong>Plan:</strong> {plan}</p>
        <p style="margin: 0 0 8px 0;"><strong>Monthly cost:</strong> {cost}</p>
        <p style="margin: 0;"><strong>Next billing date:</strong> {billing}</p>
    </div>"#,
                    name = name,
                    plan = plan.display_name(),
                    cost = format_gbp(*monthly_cost_pence),
                    billing = format_uk_date(*next_billing_date),
                );
                EmailContent {
                    subject: format!("Subscription confirmed - {}", branding.app_name),
                    html: wrap(branding, "#16a34a", "You're all set", &inner),
                }
            }

            Notification::PlanUpgraded {
                name,
                old_plan,
                new_plan,
                monthly_cost_pence,
            } => {
                let inner = format!(
                    r#"<p>Hi {name},</p>
    <p>Your plan has been upgraded from <strong>{old}</strong> to <strong>{new}</strong>, effective immediately.</p>
    <div style="background: #f0f9ff; border: 1px solid #bae6fd; border-radius: 8px; padding: 16px; margin: 20px 0;">
        <p style="margin: 0 0 8px 0; color: #0369a1;"><strong>New plan:</strong> {new}</p>
        <p style="margin: 0;"><strong>New monthly cost:</strong> {cost}</p>
    </div>
    <p>The remainder of this billing period is prorated automatically.</p>"#,
                    name = name,
                    old = old_plan.display_name(),
                    new = new_plan.display_name(),
                    cost = format_gbp(*monthly_cost_pence),
                );
                EmailContent {
                    subject: format!(
                        "Plan upgraded to {} - {}",
                        new_plan.display_name(),
                        branding.app_name
                    ),
                    html: wrap(branding, "#6366f1", "Plan upgraded", &inner),
                }
            }

            Notification::PlanDowngraded {
                name,
                old_plan,
                new_plan,
                effective_date,
            } => {
                let inner = format!(
                    r#"<p>Hi {name},</p>
    <p>Your downgrade from <strong>{old}</strong> to <strong>{new}</strong> is scheduled.</p>
    <p>You keep your current {old} features until <strong>{effective}</strong>, when the new plan takes effect.</p>"#,
                    name = name,
                    old = old_plan.display_name(),
                    new = new_plan.display_name(),
                    effective = format_uk_date(*effective_date),
                );
                EmailContent {
                    subject: format!(
                        "Plan change scheduled to {} - {}",
                        new_plan.display_name(),
                        branding.app_name
                    ),
                    html: wrap(branding, "#6366f1", "Plan change scheduled", &inner),
                }
            }

            Notification::SeatsAdded {
                name,
                seats_added,
                total_seats,
                monthly_cost_pence,
            } => {
                let s = if *seats_added == 1 { "" } else { "s" };
                let inner = format!(
                    r#"<p>Hi {name},</p>
    <p>You've added <strong>{added} seat{s}</strong> to your subscription.</p>
    <div style="background: #f8fafc; border-radius: 8px; padding: 16px; margin: 20px 0;">
        <p style="margin: 0 0 8px 0;"><strong>Total seats:</strong> {total}</p>
        <p style="margin: 0;"><strong>New monthly cost:</strong> {cost}</p>
    </div>"#,
                    name = name,
                    added = seats_added,
                    s = s,
                    total = total_seats,
                    cost = format_gbp(*monthly_cost_pence),
                );
                EmailContent {
                    subject: format!("Seats added - {}", branding.app_name),
                    html: wrap(branding, "#6366f1", "Seats added", &inner),
                }
            }

            Notification::SeatsRemoved {
                name,
                seats_removed,
                total_seats,
                monthly_cost_pence,
            } => {
                let s = if *seats_removed == 1 { "" } else { "s" };
                let inner = format!(
                    r#"<p>Hi {name},</p>
    <p>You've removed <strong>{removed} seat{s}</strong> from your subscription.</p>
    <div style="background: #f8fafc; border-radius: 8px; padding: 16px; margin: 20px 0;">
        <p style="margin: 0 0 8px 0;"><strong>Total seats:</strong> {total}</p>
        <p style="margin: 0;"><strong>New monthly cost:</strong> {cost}</p>
    </div>"#,
                    name = name,
                    removed = seats_removed,
                    s = s,
                    total = total_seats,
                    cost = format_gbp(*monthly_cost_pence),
                );
                EmailContent {
                    subject: format!("Seats removed - {}", branding.app_name),
                    html: wrap(branding, "#6366f1", "Seats removed", &inner),
                }
            }

            Notification::PaymentFailed {
                name,
                amount_pence,
                retry_date,
            } => {
                let inner = format!(
                    r#"<p>Hi {name},</p>
    <p>We weren't able to process your payment of <strong>{amount}</strong>.</p>
    <p>We'll retry automatically on <strong>{retry}</strong>. Please update your payment method before then to avoid any interruption to your service.</p>"#,
                    name = name,
                    amount = format_gbp(*amount_pence),
                    retry = format_uk_date(*retry_date),
                );
                EmailContent {
                    subject: format!("Payment failed - {}", branding.app_name),
                    html: wrap(branding, "#dc2626", "Payment failed", &inner),
                }
            }

            Notification::AccountDeletion { name, org_name } => {
                let inner = format!(
                    r#"<p>Hi {name},</p>
    <p>The account for <strong>{org}</strong> has been permanently deleted, along with all of its data.</p>
    <p>This action is irreversible. If this wasn't you, contact support immediately.</p>"#,
                    name = name,
                    org = org_name,
                );
                EmailContent {
                    subject: format!("Account deleted - {}", branding.app_name),
                    html: wrap(branding, "#dc2626", "Account deleted", &inner),
                }
            }

            Notification::CancellationConfirmed { name, access_until } => {
                let inner = format!(
                    r#"<p>Hi {name},</p>
    <p>Your subscription has been cancelled. You keep full access until <strong>{until}</strong>.</p>
    <p>Changed your mind? You can resubscribe any time from the dashboard and pick up where you left off.</p>"#,
                    name = name,
                    until = format_uk_date(*access_until),
                );
                EmailContent {
                    subject: format!("Subscription cancelled - {}", branding.app_name),
                    html: wrap(branding, "#333", "Subscription cancelled", &inner),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn branding() -> Branding {
        Branding::default()
    }

    #[test]
    fn test_format_gbp() {
        assert_eq!(format_gbp(7_900), "£79.00");
        assert_eq!(format_gbp(2_950), "£29.50");
        assert_eq!(format_gbp(5), "£0.05");
    }

    #[test]
    fn test_format_uk_date() {
        assert_eq!(format_uk_date(datetime!(2025-03-14 09:00 UTC)), "14 March 2025");
        assert_eq!(format_uk_date(datetime!(2025-01-02 00:00 UTC)), "2 January 2025");
    }

    #[test]
    fn test_wrapper_contains_footer_links_and_year() {
        let content = Notification::Welcome {
            name: "Sam".to_string(),
        }
        .render(&branding());

        assert!(content.html.contains("support@fieldhq.app"));
        assert!(content.html.contains("https://app.fieldhq.app"));
        let year = OffsetDateTime::now_utc().year().to_string();
        assert!(content.html.contains(&year));
    }

    #[test]
    fn test_trial_reminder_urgency_switch() {
        let end = datetime!(2025-01-17 09:00 UTC);

        let three = Notification::TrialReminder {
            name: "Sam".to_string(),
            days_remaining: 3,
            trial_end: end,
        }
        .render(&branding());
        assert!(three.subject.contains("3 days left"));
        assert!(three.html.contains("#f59e0b"));
        assert!(three.html.contains("3 day"));

        let one = Notification::TrialReminder {
            name: "Sam".to_string(),
            days_remaining: 1,
            trial_end: end,
        }
        .render(&branding());
        assert!(one.subject.contains("ends tomorrow"));
        assert!(one.html.contains("#dc2626"));
        // Singular, no plural "1 days"
        assert!(one.html.contains("1 day<"));
    }

    #[test]
    fn test_plan_upgrade_email() {
        let content = Notification::PlanUpgraded {
            name: "Sam".to_string(),
            old_plan: fieldhq_shared::Plan::Starter,
            new_plan: fieldhq_shared::Plan::Pro,
            monthly_cost_pence: 7_900,
        }
        .render(&branding());

        assert!(content.subject.contains("Pro"));
        assert!(content.html.contains("Starter"));
        assert!(content.html.contains("£79.00"));
    }

    #[test]
    fn test_downgrade_email_names_effective_date() {
        let content = Notification::PlanDowngraded {
            name: "Sam".to_string(),
            old_plan: fieldhq_shared::Plan::Pro,
            new_plan: fieldhq_shared::Plan::Starter,
            effective_date: datetime!(2025-04-01 00:00 UTC),
        }
        .render(&branding());

        assert!(content.html.contains("1 April 2025"));
        assert!(content.html.contains("keep your current Pro features"));
    }

    #[test]
    fn test_payment_failed_email() {
        let content = Notification::PaymentFailed {
            name: "Sam".to_string(),
            amount_pence: 8_600,
            retry_date: datetime!(2025-02-10 00:00 UTC),
        }
        .render(&branding());

        assert!(content.html.contains("£86.00"));
        assert!(content.html.contains("10 February 2025"));
    }

    #[test]
    fn test_seats_pluralisation() {
        let one = Notification::SeatsAdded {
            name: "Sam".to_string(),
            seats_added: 1,
            total_seats: 11,
            monthly_cost_pence: 8_600,
        }
        .render(&branding());
        assert!(one.html.contains("1 seat<"));

        let many = Notification::SeatsAdded {
            name: "Sam".to_string(),
            seats_added: 3,
            total_seats: 13,
            monthly_cost_pence: 10_000,
        }
        .render(&branding());
        assert!(many.html.contains("3 seats"));
    }
}

//! 📬 Notification dispatcher: who hears about a finished report, and how.
//!
//! 🎬 *[the PDF is in the bucket. the link is signed. somewhere, an athlete
//! refreshes their inbox. somewhere else, a provider does not, because they
//! were never told. this module exists so that second part doesn't happen.]*
//!
//! 🧠 Knowledge graph:
//! - Recipients are planned per variant (respondent / providers / admin copy),
//!   see [`Dispatcher::plan`].
//! - Providers resolve through a static name → email directory from config,
//!   with a fallback address. [`DispatchConfig::resolve_provider_email`] never
//!   fails and never returns an empty string.
//! - All emails go out concurrently and are settled with `join_all`. One bounce
//!   doesn't cancel the others.
//! - Chat posts are broadcast to every sink the same way. Chat is best-effort:
//!   a failed post is logged and recorded, never raised.
//! - Outcomes land in [`DispatchResult`]. Partial success is a normal Tuesday.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::backends::{ChatSink, EmailMessage, Mailer};
use crate::common::{ReportVariant, SurveyResponseRecord};

pub mod templates;

use templates::{EmailContext, Role, delivered_message, email_failed_message, render_email};

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    #[serde(default = "default_from")]
    pub from: String,
    /// 🗂️ Staff and Mindset-Athlete reports copy this address. `None` disables the copy.
    #[serde(default = "default_admin_address")]
    pub admin_address: Option<String>,
    /// 🛟 Where provider emails go when the provider is unknown or missing.
    #[serde(default = "default_fallback_provider_address")]
    pub fallback_provider_address: String,
    /// 📇 Provider display name → email.
    #[serde(default)]
    pub providers: HashMap<String, String>,
}

fn default_from() -> String {
    "Premier Sport Psychology <mindset@premiersportpsychology.com>".to_string()
}

fn default_admin_address() -> Option<String> {
    Some("mindset@premiersportpsychology.com".to_string())
}

fn default_fallback_provider_address() -> String {
    "mindset@premiersportpsychology.com".to_string()
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            from: default_from(),
            admin_address: default_admin_address(),
            fallback_provider_address: default_fallback_provider_address(),
            providers: HashMap::new(),
        }
    }
}

impl DispatchConfig {
    /// 🔍 Trimmed, case-insensitive directory lookup. Unknown → fallback.
    pub fn resolve_provider_email(&self, name: &str) -> String {
        let wanted = name.trim();
        if !wanted.is_empty() {
            let hit = self
                .providers
                .iter()
                .find(|(known, _)| known.trim().eq_ignore_ascii_case(wanted))
                .map(|(_, email)| email.trim())
                .filter(|email| !email.is_empty());
            if let Some(email) = hit {
                return email.to_string();
            }
        }
        debug!("📇 provider '{wanted}' is not in the directory, using the fallback address");
        self.fallback_provider_address.clone()
    }
}

/// 🎯 How many providers a variant's report goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderPolicy {
    None,
    /// The first named provider, and only if there is one.
    Single,
    /// Every named provider, de-duplicated. Fallback when the list is empty.
    Every,
}

fn provider_policy(variant: ReportVariant) -> ProviderPolicy {
    match variant {
        ReportVariant::Adult | ReportVariant::Youth | ReportVariant::YouthGolf => {
            ProviderPolicy::Single
        }
        ReportVariant::Staff => ProviderPolicy::None,
        ReportVariant::MindsetAthlete | ReportVariant::MindsetAthleteAdult => ProviderPolicy::Every,
    }
}

fn copies_admin(variant: ReportVariant) -> bool {
    matches!(
        variant,
        ReportVariant::Staff | ReportVariant::MindsetAthlete | ReportVariant::MindsetAthleteAdult
    )
}

/// 📮 One planned email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub role: Role,
    pub address: String,
}

/// ✅/💀 What happened to one email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub role: Role,
    pub address: String,
    pub outcome: Result<(), String>,
}

impl Delivery {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// ✅/💀 What happened to one chat post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatDelivery {
    pub sink: String,
    pub outcome: Result<(), String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchResult {
    pub respondent: Option<Delivery>,
    pub providers: Vec<Delivery>,
    pub admin: Option<Delivery>,
    pub chat: Vec<ChatDelivery>,
}

impl DispatchResult {
    pub fn emails(&self) -> impl Iterator<Item = &Delivery> {
        self.respondent
            .iter()
            .chain(self.providers.iter())
            .chain(self.admin.iter())
    }

    pub fn any_email_sent(&self) -> bool {
        self.emails().any(Delivery::succeeded)
    }

    /// 💀 Nobody got the report: every attempted email failed, or there was nobody to send to.
    pub fn total_failure(&self) -> bool {
        !self.any_email_sent()
    }
}

/// 📣 Post `text` to every sink at once. Each sink's fate is recorded, none are raised.
pub async fn broadcast(sinks: &[Arc<dyn ChatSink>], text: &str) -> Vec<ChatDelivery> {
    join_all(sinks.iter().map(|sink| async move {
        let outcome = sink.post(text).await.map_err(|err| {
            warn!("⚠️ chat post to {} failed: {err:#}", sink.name());
            format!("{err:#}")
        });
        ChatDelivery {
            sink: sink.name().to_string(),
            outcome,
        }
    }))
    .await
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    mailer: Arc<dyn Mailer>,
    sinks: Vec<Arc<dyn ChatSink>>,
    config: DispatchConfig,
    link_valid_days: u64,
}

impl Dispatcher {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        sinks: Vec<Arc<dyn ChatSink>>,
        config: DispatchConfig,
        link_valid_days: u64,
    ) -> Self {
        Self {
            mailer,
            sinks,
            config,
            link_valid_days,
        }
    }

    /// 📣 Operational chat post, outside of any email flow.
    pub async fn announce(&self, text: &str) -> Vec<ChatDelivery> {
        broadcast(&self.sinks, text).await
    }

    /// 🗺️ Who gets an email for this record, in send order.
    pub fn plan(&self, record: &SurveyResponseRecord) -> Vec<Recipient> {
        let mut recipients = Vec::new();

        if let Some(email) = record.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            recipients.push(Recipient {
                role: Role::Respondent,
                address: email.to_string(),
            });
        }

        let named = || record.providers.iter().map(|name| name.trim()).filter(|name| !name.is_empty());
        let mut provider_addresses: Vec<String> = match provider_policy(record.variant) {
            ProviderPolicy::None => vec![],
            ProviderPolicy::Single => named()
                .next()
                .map(|name| self.config.resolve_provider_email(name))
                .into_iter()
                .collect(),
            ProviderPolicy::Every => {
                let resolved: Vec<String> =
                    named().map(|name| self.config.resolve_provider_email(name)).collect();
                if resolved.is_empty() {
                    vec![self.config.fallback_provider_address.clone()]
                } else {
                    resolved
                }
            }
        };
        let mut seen = Vec::new();
        provider_addresses.retain(|address| {
            let key = address.to_ascii_lowercase();
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        });
        recipients.extend(provider_addresses.into_iter().map(|address| Recipient {
            role: Role::Provider,
            address,
        }));

        if copies_admin(record.variant) {
            if let Some(admin) = self.config.admin_address.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
                // -- the mailbox already getting a provider copy doesn't need a second one
                let already_a_provider = recipients
                    .iter()
                    .any(|r| r.role == Role::Provider && r.address.eq_ignore_ascii_case(admin));
                if already_a_provider {
                    debug!("📇 admin address {admin} already receives a provider copy");
                } else {
                    recipients.push(Recipient {
                        role: Role::Admin,
                        address: admin.to_string(),
                    });
                }
            }
        }
        recipients
    }

    fn message_for(
        &self,
        record: &SurveyResponseRecord,
        signed_url: &str,
        recipient: &Recipient,
    ) -> anyhow::Result<EmailMessage> {
        let ctx = EmailContext {
            variant: record.variant,
            locale: record.effective_locale(),
            subject_name: &record.subject_name,
            report_url: signed_url,
            link_valid_days: self.link_valid_days,
        };
        let rendered = render_email(&ctx, recipient.role)?;
        Ok(EmailMessage {
            from: self.config.from.clone(),
            to: recipient.address.clone(),
            subject: rendered.subject,
            html: rendered.html,
            text: rendered.text,
        })
    }

    /// 📬 Send every planned email, then broadcast the milestone to chat.
    pub async fn notify(&self, record: &SurveyResponseRecord, signed_url: &str) -> DispatchResult {
        let recipients = self.plan(record);
        debug!(
            "📬 {} email(s) planned for response {}",
            recipients.len(),
            record.response_id
        );

        let deliveries = join_all(recipients.into_iter().map(|recipient| async move {
            let sent = match self.message_for(record, signed_url, &recipient) {
                Ok(message) => self.mailer.send(&message).await,
                Err(err) => Err(err),
            };
            let outcome = sent.map_err(|err| {
                warn!(
                    "⚠️ {} email to {} for response {} failed: {err:#}",
                    recipient.role.as_str(),
                    recipient.address,
                    record.response_id
                );
                format!("{err:#}")
            });
            Delivery {
                role: recipient.role,
                address: recipient.address,
                outcome,
            }
        }))
        .await;

        let mut result = DispatchResult::default();
        for delivery in deliveries {
            match delivery.role {
                Role::Respondent => result.respondent = Some(delivery),
                Role::Provider => result.providers.push(delivery),
                Role::Admin => result.admin = Some(delivery),
            }
        }

        let email = record.email.as_deref().unwrap_or("N/A");
        let milestone = if result.any_email_sent() {
            info!("✉️ report for response {} delivered", record.response_id);
            delivered_message(&record.response_id, email, signed_url)
        } else {
            warn!("💀 no email for response {} went out", record.response_id);
            email_failed_message(&record.response_id, email)
        };
        result.chat = broadcast(&self.sinks, &milestone).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::{InMemoryChatSink, InMemoryMailer};
    use crate::common::Locale;

    fn directory() -> DispatchConfig {
        DispatchConfig {
            admin_address: Some("admin@example.com".to_string()),
            fallback_provider_address: "frontdesk@example.com".to_string(),
            providers: HashMap::from([
                ("Dr. Jane Smith".to_string(), "jane@example.com".to_string()),
                ("Coach Bo".to_string(), "bo@example.com".to_string()),
            ]),
            ..DispatchConfig::default()
        }
    }

    fn record(variant: ReportVariant, providers: &[&str]) -> SurveyResponseRecord {
        SurveyResponseRecord {
            variant,
            response_id: "R_1".to_string(),
            subject_name: "Ruby".to_string(),
            email: Some("ruby@example.com".to_string()),
            recorded_date: "2024-01-01".to_string(),
            providers: providers.iter().map(|p| p.to_string()).collect(),
            locale: Some(Locale::En),
            params: vec![],
        }
    }

    fn dispatcher(mailer: &InMemoryMailer, sinks: &[InMemoryChatSink]) -> Dispatcher {
        Dispatcher::new(
            Arc::new(mailer.clone()),
            sinks
                .iter()
                .map(|s| Arc::new(s.clone()) as Arc<dyn ChatSink>)
                .collect(),
            directory(),
            7,
        )
    }

    fn addresses(plan: &[Recipient]) -> Vec<(Role, &str)> {
        plan.iter().map(|r| (r.role, r.address.as_str())).collect()
    }

    #[test]
    fn the_one_where_unknown_providers_land_at_the_front_desk() {
        let the_config = directory();
        assert_eq!(the_config.resolve_provider_email("  dr. jane SMITH "), "jane@example.com");
        assert_eq!(the_config.resolve_provider_email("Dr. Nobody"), "frontdesk@example.com");
        assert_eq!(the_config.resolve_provider_email(""), "frontdesk@example.com");
    }

    #[test]
    fn the_one_where_each_variant_gets_its_own_guest_list() {
        let the_dispatcher = dispatcher(&InMemoryMailer::default(), &[]);

        let the_adult = the_dispatcher.plan(&record(ReportVariant::Adult, &["Dr. Jane Smith"]));
        assert_eq!(
            addresses(&the_adult),
            vec![(Role::Respondent, "ruby@example.com"), (Role::Provider, "jane@example.com")]
        );

        let the_lonely_youth = the_dispatcher.plan(&record(ReportVariant::Youth, &[]));
        assert_eq!(addresses(&the_lonely_youth), vec![(Role::Respondent, "ruby@example.com")]);

        let the_staff = the_dispatcher.plan(&record(ReportVariant::Staff, &["Dr. Jane Smith"]));
        assert_eq!(
            addresses(&the_staff),
            vec![(Role::Respondent, "ruby@example.com"), (Role::Admin, "admin@example.com")]
        );

        let the_athlete = the_dispatcher.plan(&record(
            ReportVariant::MindsetAthlete,
            &["Dr. Jane Smith", "Coach Bo", "dr. jane smith", "Mystery Person", "Another Mystery"],
        ));
        assert_eq!(
            addresses(&the_athlete),
            vec![
                (Role::Respondent, "ruby@example.com"),
                (Role::Provider, "jane@example.com"),
                (Role::Provider, "bo@example.com"),
                (Role::Provider, "frontdesk@example.com"),
                (Role::Admin, "admin@example.com"),
            ]
        );

        let the_unattended = the_dispatcher.plan(&record(ReportVariant::MindsetAthleteAdult, &[]));
        assert_eq!(
            addresses(&the_unattended),
            vec![
                (Role::Respondent, "ruby@example.com"),
                (Role::Provider, "frontdesk@example.com"),
                (Role::Admin, "admin@example.com"),
            ]
        );
    }

    #[test]
    fn the_one_where_the_front_desk_is_also_the_admin_and_gets_one_copy() {
        let the_dispatcher = Dispatcher::new(
            Arc::new(InMemoryMailer::default()),
            vec![],
            DispatchConfig::default(),
            7,
        );

        let the_plan = the_dispatcher.plan(&record(ReportVariant::MindsetAthlete, &["Dr. Unknown"]));
        assert_eq!(
            addresses(&the_plan),
            vec![
                (Role::Respondent, "ruby@example.com"),
                (Role::Provider, "mindset@premiersportpsychology.com"),
            ]
        );
    }

    #[tokio::test]
    async fn the_one_where_one_bounce_does_not_sink_the_rest() {
        let the_mailer = InMemoryMailer::default().rejecting("ruby@example.com").await;
        let the_slack = InMemoryChatSink::new("slack");
        let the_webhook = InMemoryChatSink::new("webhook").failing();
        let the_dispatcher = dispatcher(&the_mailer, &[the_slack.clone(), the_webhook.clone()]);

        let the_result = the_dispatcher
            .notify(&record(ReportVariant::Adult, &["Dr. Jane Smith"]), "https://signed/url")
            .await;

        assert!(!the_result.respondent.as_ref().expect("💀 respondent attempted").succeeded());
        assert!(the_result.providers[0].succeeded());
        assert!(the_result.any_email_sent());
        assert_eq!(the_mailer.recipients().await, vec!["jane@example.com".to_string()]);

        assert_eq!(the_result.chat.len(), 2);
        assert_eq!(the_slack.posts_containing("*Email with report delivered:*").await.len(), 1);
        assert!(the_result.chat.iter().any(|c| c.sink == "webhook" && c.outcome.is_err()));
    }

    #[tokio::test]
    async fn the_one_where_every_email_bounces_and_chat_hears_about_it() {
        let the_mailer = InMemoryMailer::default().rejecting("ruby@example.com").await;
        let the_slack = InMemoryChatSink::new("slack");
        let the_dispatcher = dispatcher(&the_mailer, &[the_slack.clone()]);

        let the_result = the_dispatcher
            .notify(&record(ReportVariant::Youth, &[]), "https://signed/url")
            .await;

        assert!(the_result.total_failure());
        assert_eq!(the_slack.posts_containing("*Failed to send email:*").await.len(), 1);
    }

    #[tokio::test]
    async fn the_one_where_the_text_body_carries_the_link() {
        let the_mailer = InMemoryMailer::default();
        let the_dispatcher = dispatcher(&the_mailer, &[]);
        the_dispatcher
            .notify(&record(ReportVariant::Staff, &[]), "https://signed/url?sig=1")
            .await;

        let the_sent = the_mailer.sent.lock().await;
        assert_eq!(the_sent.len(), 2);
        for message in the_sent.iter() {
            assert_eq!(message.from, "Premier Sport Psychology <mindset@premiersportpsychology.com>");
            assert!(message.text.lines().any(|line| line == "https://signed/url?sig=1"));
        }
    }
}

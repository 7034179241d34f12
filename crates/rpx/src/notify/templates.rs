//! 📝 Email and chat copy.
//!
//! Emails are keyed by (variant, locale, role). Only the Adult report has a
//! Spanish edition; every other variant renders English whatever the locale
//! says. Every email has an HTML body and a plain-text body, and the
//! plain-text body carries the raw signed URL on a line of its own so even
//! the most hostile mail client can't mangle it. Bodies are minijinja
//! templates, and the HTML ones escape whatever the respondent typed.

use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};

use crate::common::{Locale, ReportVariant};

/// 🎭 Who the email is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Respondent,
    Provider,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Respondent => "respondent",
            Self::Provider => "provider",
            Self::Admin => "admin",
        }
    }
}

/// 📨 Everything a template needs. Borrowed, rendered, dropped.
#[derive(Debug, Clone, Copy)]
pub struct EmailContext<'a> {
    pub variant: ReportVariant,
    pub locale: Locale,
    pub subject_name: &'a str,
    pub report_url: &'a str,
    pub link_valid_days: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

// ===== Email templates =====
//
// One subject, one plain-text body and one HTML body per (locale, role).
// minijinja auto-escapes by extension: `.html` is escaped, `.txt` and
// `.subject` are not.

const EMAIL_TEMPLATES: &[(&str, &str)] = &[
    // 🇺🇸 respondent
    (
        "en/respondent.subject",
        "Your {{ assessment }} Results from Premier Sport Psychology",
    ),
    (
        "en/respondent.txt",
        "Hi {{ name }},

Thank you for completing the {{ assessment }}.

Your personalized report is ready.

Download your report:
{{ report_url }}

This link expires in {{ days }} days.

Premier Sport Psychology
",
    ),
    (
        "en/respondent.html",
        "<p>Hi {{ name }},</p>\
<p>Thank you for completing the {{ assessment }}.</p>\
<p>Your personalized report is ready.</p>\
<p>Download your report:<br><a href=\"{{ report_url }}\">{{ report_url }}</a></p>\
<p>This link expires in {{ days }} days.</p>\
<p>Premier Sport Psychology</p>",
    ),
    // 🇺🇸 provider
    ("en/provider.subject", "{{ name }}'s {{ assessment }} Results"),
    (
        "en/provider.txt",
        "Hello,

{{ name }} completed the {{ assessment }} and listed you as their provider.

Download the report:
{{ report_url }}

This link expires in {{ days }} days.

Premier Sport Psychology
",
    ),
    (
        "en/provider.html",
        "<p>Hello,</p>\
<p>{{ name }} completed the {{ assessment }} and listed you as their provider.</p>\
<p>Download the report:<br><a href=\"{{ report_url }}\">{{ report_url }}</a></p>\
<p>This link expires in {{ days }} days.</p>\
<p>Premier Sport Psychology</p>",
    ),
    // 🗂️ admin copy
    ("en/admin.subject", "New {{ assessment }} report: {{ name }}"),
    (
        "en/admin.txt",
        "Hello,

A new {{ assessment }} report was generated for {{ name }}.

Download the report:
{{ report_url }}

This link expires in {{ days }} days.

rpx
",
    ),
    (
        "en/admin.html",
        "<p>Hello,</p>\
<p>A new {{ assessment }} report was generated for {{ name }}.</p>\
<p>Download the report:<br><a href=\"{{ report_url }}\">{{ report_url }}</a></p>\
<p>This link expires in {{ days }} days.</p>\
<p>rpx</p>",
    ),
    // 🇪🇸 respondent
    (
        "es/respondent.subject",
        "Sus resultados de la Evaluación de Mentalidad de Premier Sport Psychology",
    ),
    (
        "es/respondent.txt",
        "Hola {{ name }},

Gracias por completar la Evaluación de Mentalidad.

Su informe personalizado está listo.

Descargue su informe:
{{ report_url }}

Este enlace caduca en {{ days }} días.

Premier Sport Psychology
",
    ),
    (
        "es/respondent.html",
        "<p>Hola {{ name }},</p>\
<p>Gracias por completar la Evaluación de Mentalidad.</p>\
<p>Su informe personalizado está listo.</p>\
<p>Descargue su informe:<br><a href=\"{{ report_url }}\">{{ report_url }}</a></p>\
<p>Este enlace caduca en {{ days }} días.</p>\
<p>Premier Sport Psychology</p>",
    ),
    // 🇪🇸 provider
    ("es/provider.subject", "Resultados de la Evaluación de Mentalidad de {{ name }}"),
    (
        "es/provider.txt",
        "Hola,

{{ name }} completó la Evaluación de Mentalidad y lo indicó a usted como su profesional.

Descargue el informe:
{{ report_url }}

Este enlace caduca en {{ days }} días.

Premier Sport Psychology
",
    ),
    (
        "es/provider.html",
        "<p>Hola,</p>\
<p>{{ name }} completó la Evaluación de Mentalidad y lo indicó a usted como su profesional.</p>\
<p>Descargue el informe:<br><a href=\"{{ report_url }}\">{{ report_url }}</a></p>\
<p>Este enlace caduca en {{ days }} días.</p>\
<p>Premier Sport Psychology</p>",
    ),
];

fn load_templates() -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    for &(name, source) in EMAIL_TEMPLATES {
        env.add_template(name, source)?;
    }
    Ok(env)
}

/// 📚 Parsed once, on first use.
static TEMPLATES: LazyLock<Result<Environment<'static>, minijinja::Error>> = LazyLock::new(load_templates);

/// 🌎 Spanish only exists for the Adult respondent and provider emails.
fn template_locale(variant: ReportVariant, locale: Locale, role: Role) -> Locale {
    match (variant, locale, role) {
        (ReportVariant::Adult, Locale::Es, Role::Respondent | Role::Provider) => Locale::Es,
        _ => Locale::En,
    }
}

/// 🖋️ Renders one email for one role.
pub fn render_email(ctx: &EmailContext<'_>, role: Role) -> Result<RenderedEmail> {
    let env = TEMPLATES
        .as_ref()
        .map_err(|err| anyhow!("💀 The email templates failed to load: {err:#}"))?;
    let prefix = format!(
        "{}/{}",
        template_locale(ctx.variant, ctx.locale, role).as_str(),
        role.as_str()
    );
    let values = context! {
        name => ctx.subject_name,
        assessment => ctx.variant.display_name(),
        report_url => ctx.report_url,
        days => ctx.link_valid_days,
    };
    let render = |extension: &str| -> Result<String> {
        let name = format!("{prefix}.{extension}");
        env.get_template(&name)
            .and_then(|template| template.render(&values))
            .with_context(|| format!("💀 Could not render the {name} email template"))
    };

    Ok(RenderedEmail {
        subject: render("subject")?,
        html: render("html")?,
        text: render("txt")?,
    })
}

// ===== Chat copy =====

/// 📣 "we got one" post, sent before anything else happens.
pub fn received_message(survey_id: &str, response_id: &str, timestamp: &str) -> String {
    format!(
        "*New Qualtrics response received:*\n\nSurvey ID: {survey_id}\nResponse ID: {response_id}\nTimestamp: {timestamp}"
    )
}

/// 💀 A stage failure. `email` is only known once the response was mapped.
pub fn failure_message(headline: &str, response_id: &str, email: Option<&str>, detail: &str) -> String {
    let mut message = format!("*{headline}:*\n\nResponse ID: {response_id}");
    if let Some(email) = email {
        message.push_str(&format!("\nEmail: {email}"));
    }
    message.push_str(&format!("\nError: {detail}"));
    message
}

pub fn delivered_message(response_id: &str, email: &str, report_url: &str) -> String {
    format!("*Email with report delivered:*\n\nResponse ID: {response_id}\nEmail: {email}\nReport URL: {report_url}")
}

pub fn email_failed_message(response_id: &str, email: &str) -> String {
    format!("*Failed to send email:*\n\nResponse ID: {response_id}\nEmail: {email}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(variant: ReportVariant, locale: Locale, name: &'static str) -> EmailContext<'static> {
        EmailContext {
            variant,
            locale,
            subject_name: name,
            report_url: "https://bucket.s3.example.test/report.pdf?X-Amz-Signature=abc&X-Amz-Expires=604800",
            link_valid_days: 7,
        }
    }

    #[test]
    fn the_one_where_the_adult_subject_is_the_one_people_already_know() {
        let the_email = render_email(&ctx(ReportVariant::Adult, Locale::En, "Ruby"), Role::Respondent).expect("💀 render");
        assert_eq!(the_email.subject, "Your Mindset Assessment Results from Premier Sport Psychology");
    }

    #[test]
    fn the_one_where_the_url_sits_alone_on_its_line() {
        for role in [Role::Respondent, Role::Provider, Role::Admin] {
            let the_email = render_email(&ctx(ReportVariant::Staff, Locale::En, "Ruby"), role).expect("💀 render");
            assert!(
                the_email.text.lines().any(|line| line
                    == "https://bucket.s3.example.test/report.pdf?X-Amz-Signature=abc&X-Amz-Expires=604800"),
                "{role:?} text body lost the raw URL"
            );
        }
    }

    #[test]
    fn the_one_where_a_name_with_markup_stays_text() {
        let the_email = render_email(
            &ctx(ReportVariant::Youth, Locale::En, "<script>alert('hi')</script>"),
            Role::Respondent,
        )
        .expect("💀 render");
        assert!(!the_email.html.contains("<script>"));
        assert!(!the_email.html.contains("alert('hi')"));
        assert!(the_email.html.contains("&lt;script&gt;alert("));
        assert!(the_email.html.contains("X-Amz-Signature=abc&amp;X-Amz-Expires=604800"));
        // 📄 plain text is plain: nothing to escape, nothing escaped
        assert!(the_email.text.starts_with("Hi <script>alert('hi')</script>,"));
    }

    #[test]
    fn the_one_where_only_adults_get_spanish() {
        let the_adult = render_email(&ctx(ReportVariant::Adult, Locale::Es, "Ana"), Role::Respondent).expect("💀 render");
        assert!(the_adult.text.starts_with("Hola Ana,"));
        assert!(the_adult.subject.starts_with("Sus resultados"));

        let the_youth = render_email(&ctx(ReportVariant::Youth, Locale::Es, "Ana"), Role::Respondent).expect("💀 render");
        assert!(the_youth.text.starts_with("Hi Ana,"));
    }

    #[test]
    fn the_one_where_every_role_and_locale_has_a_template() {
        for variant in ReportVariant::ALL {
            for locale in [Locale::En, Locale::Es] {
                for role in [Role::Respondent, Role::Provider, Role::Admin] {
                    let the_email = render_email(&ctx(variant, locale, "Ruby"), role)
                        .unwrap_or_else(|err| panic!("💀 {variant} {locale:?} {role:?}: {err:#}"));
                    assert!(!the_email.subject.is_empty());
                    assert!(the_email.html.contains("Ruby"));
                    assert!(the_email.text.contains("7"), "the expiry note names the days");
                }
            }
        }

        let the_provider = render_email(&ctx(ReportVariant::Adult, Locale::Es, "Ana"), Role::Provider).expect("💀 render");
        assert_eq!(the_provider.subject, "Resultados de la Evaluación de Mentalidad de Ana");
    }

    #[test]
    fn the_one_where_chat_posts_keep_their_familiar_shape() {
        assert_eq!(
            received_message("SV_1", "R_1", "2024-01-01T00:00:00Z"),
            "*New Qualtrics response received:*\n\nSurvey ID: SV_1\nResponse ID: R_1\nTimestamp: 2024-01-01T00:00:00Z"
        );
        assert_eq!(
            failure_message("Failed to generate report", "R_1", Some("ruby@example.com"), "boom"),
            "*Failed to generate report:*\n\nResponse ID: R_1\nEmail: ruby@example.com\nError: boom"
        );
        assert_eq!(
            failure_message("Failed to fetch survey response", "R_1", None, "404"),
            "*Failed to fetch survey response:*\n\nResponse ID: R_1\nError: 404"
        );
    }
}

use minijinja::{AutoEscape, Environment};
use shared::templates as keys;
use std::collections::{BTreeMap, HashMap};

use crate::error::DeliveryError;

const SUBJECT: &str = "subject";
const TEXT: &str = "text";
const HTML: &str = "html";

/// Subject, plain-text and HTML bodies as Jinja-style sources. Variables are
/// referenced as `{{ name }}`; unknown names render as the empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl Template {
    pub fn new(subject: impl Into<String>, text: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            text: text.into(),
            html: html.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Template>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every template the restaurant workflow sends, plus
    /// the password reset used by the auth service.
    pub fn builtin() -> Self {
        Self::new()
            .with(
                keys::RESERVATION_CONFIRMATION,
                Template::new(
                    "Your table is booked",
                    "Hi {{guest_name}},\n\nWe have reserved a table for {{party_size}} on {{reserved_for}}.\nReservation: {{reservation_id}}\n",
                    "<p>Hi {{guest_name}},</p><p>We have reserved a table for <strong>{{party_size}}</strong> on {{reserved_for}}.</p><p>Reservation: {{reservation_id}}</p>",
                ),
            )
            .with(
                keys::RESERVATION_CANCELLATION,
                Template::new(
                    "Your reservation was cancelled",
                    "Hi {{guest_name}},\n\nYour reservation for {{reserved_for}} has been cancelled.\nReservation: {{reservation_id}}\n",
                    "<p>Hi {{guest_name}},</p><p>Your reservation for {{reserved_for}} has been cancelled.</p><p>Reservation: {{reservation_id}}</p>",
                ),
            )
            .with(
                keys::TABLE_READY,
                Template::new(
                    "Your table is ready",
                    "Hi {{guest_name}},\n\nTable {{table_label}} is ready for your party of {{party_size}}.\n",
                    "<p>Hi {{guest_name}},</p><p>Table <strong>{{table_label}}</strong> is ready for your party of {{party_size}}.</p>",
                ),
            )
            .with(
                keys::BILL_READY,
                Template::new(
                    "Your bill {{bill_id}}",
                    "Hi {{guest_name}},\n\n{{items}}\n\nTotal due: {{total}}\n",
                    "<p>Hi {{guest_name}},</p><pre>{{items}}</pre><p>Total due: <strong>{{total}}</strong></p>",
                ),
            )
            .with(
                keys::PAYMENT_RECEIPT,
                Template::new(
                    "Payment receipt",
                    "Hi {{guest_name}},\n\nWe received {{amount}} by {{payment_method}} on {{paid_at}}.\nReceipt: {{reference}}\n",
                    "<p>Hi {{guest_name}},</p><p>We received <strong>{{amount}}</strong> by {{payment_method}} on {{paid_at}}.</p><p>Receipt: {{reference}}</p>",
                ),
            )
            .with(
                keys::PASSWORD_RESET,
                Template::new(
                    "Reset your password",
                    "Use this link to choose a new password:\n{{reset_link}}\n\nIt expires in {{expires_in}}.\n",
                    "<p>Use <a href=\"{{reset_link}}\">this link</a> to choose a new password.</p><p>It expires in {{expires_in}}.</p>",
                ),
            )
    }

    pub fn with(mut self, key: impl Into<String>, template: Template) -> Self {
        self.templates.insert(key.into(), template);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Template> {
        self.templates.get(key)
    }

    /// Renders all three parts of `key` with the job's variables. Values are
    /// inserted verbatim, the html part included.
    pub fn render(
        &self,
        key: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<Rendered, DeliveryError> {
        let template = self
            .get(key)
            .ok_or_else(|| DeliveryError::UnknownTemplate(key.to_string()))?;

        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_template(SUBJECT, &template.subject)?;
        env.add_template(TEXT, &template.text)?;
        env.add_template(HTML, &template.html)?;

        Ok(Rendered {
            subject: env.get_template(SUBJECT)?.render(variables)?,
            text: env.get_template(TEXT)?.render(variables)?,
            html: env.get_template(HTML)?.render(variables)?,
        })
    }
}

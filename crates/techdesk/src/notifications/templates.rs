use std::collections::BTreeMap;

use super::{NotificationEvent, TicketNotice};

const SIGNATURE: &str = "Sincerely,\n\nTechnical Support Team";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplate {
    pub subject: String,
    pub message: String,
}

/// Message templates keyed by event, one shape per channel.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    email: BTreeMap<NotificationEvent, EmailTemplate>,
    webhook: BTreeMap<NotificationEvent, String>,
}

impl TemplateCatalog {
    pub fn standard() -> Self {
        let ticket_lines = "- Centre: {centre}\n- Title: {title}\n- Category: {category}\n- Subcategory: {subcategory}";

        let email = BTreeMap::from([
            (
                NotificationEvent::TicketCreated,
                EmailTemplate {
                    subject: "Support Ticket #{ticket_number} Received".to_string(),
                    message: format!(
                        "Dear {{user_name}},\n\nWe have received your Support Ticket.\nSupport Ticket Number: {{ticket_number}}\n\n{ticket_lines}\n\nWe will review your request and assign it to a technician. You will hear from us again once that happens.\n\n{SIGNATURE}"
                    ),
                },
            ),
            (
                NotificationEvent::StatusChanged,
                EmailTemplate {
                    subject: "Support Ticket #{ticket_number} Status Change".to_string(),
                    message: format!(
                        "Dear {{user_name}},\n\nThe status of your Support Ticket #{{ticket_number}} is now {{status}}.\n\n{ticket_lines}\n\n{SIGNATURE}"
                    ),
                },
            ),
            (
                NotificationEvent::Resolved,
                EmailTemplate {
                    subject: "Support Ticket #{ticket_number} Resolved".to_string(),
                    message: format!(
                        "Dear {{user_name}},\n\nYour Support Ticket #{{ticket_number}} has been resolved.\n\n{ticket_lines}\n\n{SIGNATURE}"
                    ),
                },
            ),
            (
                NotificationEvent::Assigned,
                EmailTemplate {
                    subject: "Support Ticket #{ticket_number} Assigned".to_string(),
                    message: format!(
                        "Dear {{user_name}},\n\nYour Support Ticket #{{ticket_number}} has been assigned to {{assigned_to}}.\n\n{ticket_lines}\n\nYou will be notified once it is resolved.\n\n{SIGNATURE}"
                    ),
                },
            ),
        ]);

        let webhook = BTreeMap::from([
            (
                NotificationEvent::TicketCreated,
                "A Support Ticket has been created at *{centre}*\n*Title:* {title}\n*Category:* {category}\n*Subcategory:* {subcategory}\n*Priority:* {priority}\n*Ticket Number:* {ticket_number}\n*by:* {user}".to_string(),
            ),
            (
                NotificationEvent::StatusChanged,
                "The status of Support Ticket *#{ticket_number}* has been changed to *{status}*.\n*Title:* {title}\n*Centre:* {centre}\n*by:* {user}".to_string(),
            ),
            (
                NotificationEvent::Resolved,
                "Support Ticket *#{ticket_number}* has been resolved.\n*Title:* {title}\n*Centre:* {centre}\n*by:* {user}".to_string(),
            ),
            (
                NotificationEvent::Assigned,
                "A Support Ticket *Title:* \"{title}\" at *{centre}* has been assigned to {assigned_to}.\n*by:* {user}".to_string(),
            ),
        ]);

        Self { email, webhook }
    }

    pub fn email(&self, notice: &TicketNotice) -> Option<EmailTemplate> {
        self.email.get(&notice.event).map(|template| EmailTemplate {
            subject: render(&template.subject, notice),
            message: render(&template.message, notice),
        })
    }

    pub fn webhook_text(&self, notice: &TicketNotice) -> Option<String> {
        self.webhook
            .get(&notice.event)
            .map(|template| render(template, notice))
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// Fills `{key}` slots in one left-to-right pass over the template. Substituted
/// values are copied verbatim, so braces inside a title are never expanded; unknown
/// keys stay as written.
fn render(template: &str, notice: &TicketNotice) -> String {
    let values = notice.placeholders();
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let slot = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (value, close))
        });
        match slot {
            Some((value, close)) => {
                rendered.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                rendered.push('{');
                rest = after;
            }
        }
    }
    rendered.push_str(rest);
    rendered
}

//! `{{placeholder}}` substitution for reminder templates.

use crate::models::{Customer, Debt, Template, TenantProfile};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::fmt::Write;
use tracing::warn;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("placeholder pattern is valid"));

/// Used for `{{dueDate}}` when the configured format is unusable.
pub const FALLBACK_DATE_FORMAT: &str = "%Y-%m-%d";

/// Placeholder names stored templates may use.
pub const PLACEHOLDER_KEYS: [&str; 7] = [
    "customerName",
    "amount",
    "currency",
    "invoiceNumber",
    "dueDate",
    "userName",
    "companyName",
];

/// Pre-formatted substitution values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateContext {
    pub customer_name: String,
    pub amount: String,
    pub currency: String,
    pub invoice_number: String,
    pub due_date: String,
    pub user_name: String,
    pub company_name: String,
}

impl TemplateContext {
    pub fn new(
        debt: &Debt,
        customer: &Customer,
        profile: &TenantProfile,
        date_format: &str,
    ) -> Self {
        Self {
            customer_name: customer.name.clone(),
            amount: debt.amount.normalize().to_string(),
            currency: debt.currency.clone(),
            invoice_number: debt.invoice_number.clone(),
            due_date: format_date(debt.due_date, date_format),
            user_name: profile.user_name.clone(),
            company_name: profile.company_name.clone(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let value = match key {
            "customerName" => &self.customer_name,
            "amount" => &self.amount,
            "currency" => &self.currency,
            "invoiceNumber" => &self.invoice_number,
            "dueDate" => &self.due_date,
            "userName" => &self.user_name,
            "companyName" => &self.company_name,
            _ => return None,
        };
        Some(value.as_str())
    }
}

/// Formats `date` with `format`, falling back to ISO 8601 when the pattern
/// contains an unknown specifier.
pub fn format_date(date: NaiveDate, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", date.format(format)).is_err() {
        warn!(format = %format, "Invalid date format, using {}", FALLBACK_DATE_FORMAT);
        return date.format(FALLBACK_DATE_FORMAT).to_string();
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub subject: Option<String>,
    pub body: String,
}

/// Replaces every known `{{key}}`. Unknown keys are left verbatim.
pub fn render(text: &str, context: &TemplateContext) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| match context.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

pub fn render_template(template: &Template, context: &TemplateContext) -> RenderedMessage {
    RenderedMessage {
        subject: template.subject.as_deref().map(|s| render(s, context)),
        body: render(&template.body, context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TemplateContext {
        TemplateContext {
            customer_name: "Dana Levi".into(),
            amount: "1500".into(),
            currency: "ILS".into(),
            invoice_number: "INV-0042".into(),
            due_date: "01/04/2024".into(),
            user_name: "Noa".into(),
            company_name: "Acme Ltd".into(),
        }
    }

    #[test]
    fn replaces_all_seven_placeholders() {
        let text = PLACEHOLDER_KEYS
            .iter()
            .map(|k| format!("{{{{{}}}}}", k))
            .collect::<Vec<_>>()
            .join(" ");

        let rendered = render(&text, &context());

        assert_eq!(
            rendered,
            "Dana Levi 1500 ILS INV-0042 01/04/2024 Noa Acme Ltd"
        );
        assert!(!rendered.contains("{{"));
        assert!(!rendered.contains("}}"));
    }

    #[test]
    fn unknown_placeholder_is_left_verbatim() {
        let rendered = render("Hi {{customerName}}, ref {{orderId}}", &context());
        assert_eq!(rendered, "Hi Dana Levi, ref {{orderId}}");
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let text = "Please pay { soon } }} {{ not a key";
        assert_eq!(render(text, &context()), text);
        assert_eq!(render(&render(text, &context()), &context()), text);
    }

    #[test]
    fn repeated_placeholders_are_all_replaced() {
        let rendered = render("{{amount}} {{currency}} / {{amount}}", &context());
        assert_eq!(rendered, "1500 ILS / 1500");
    }

    #[test]
    fn context_formats_due_date_and_amount() {
        use crate::models::{CreateCustomer, CreateDebt};
        use chrono::NaiveDate;
        use rust_decimal::Decimal;
        use uuid::Uuid;

        let user = Uuid::new_v4();
        let customer = Customer::new(
            user,
            CreateCustomer {
                name: "Dana".into(),
                ..Default::default()
            },
        );
        let debt = Debt::new(
            user,
            CreateDebt {
                customer_id: customer.customer_id,
                amount: Decimal::new(150050, 2),
                currency: "USD".into(),
                invoice_number: "INV-7".into(),
                invoice_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                due_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
                notes: None,
            },
        );

        let ctx = TemplateContext::new(&debt, &customer, &TenantProfile::default(), "%d/%m/%Y");
        assert_eq!(ctx.amount, "1500.5");
        assert_eq!(ctx.due_date, "01/04/2024");
        assert_eq!(ctx.get("userName"), Some(""));
        assert_eq!(ctx.get("nope"), None);
    }

    #[test]
    fn invalid_date_format_falls_back_to_iso() {
        let due = chrono::NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_eq!(format_date(due, "%d/%m/%Y"), "10/03/2024");
        assert_eq!(format_date(due, "%Q"), "2024-03-10");
    }
}

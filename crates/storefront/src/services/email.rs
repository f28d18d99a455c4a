//! Order confirmation emails.
//!
//! Uses SMTP via lettre for delivery with Askama templates. Without SMTP
//! settings the storefront falls back to [`LogNotifier`], which only records
//! that a confirmation would have been sent.

use std::future::Future;

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::{info, instrument};

use kestrel_core::CurrencyCode;

use crate::config::EmailConfig;
use crate::models::{Order, OrderLineItem};

/// A line of the confirmation email.
struct ConfirmationLine {
    name: String,
    size: Option<String>,
    quantity: u32,
    total: String,
}

/// Values shared by both confirmation bodies.
struct Confirmation<'a> {
    order: &'a Order,
    lines: Vec<ConfirmationLine>,
    date: String,
    order_total: String,
    delivery: String,
    grand_total: String,
    contact_email: &'a str,
}

impl<'a> Confirmation<'a> {
    fn new(
        order: &'a Order,
        items: &[OrderLineItem],
        currency: CurrencyCode,
        contact_email: &'a str,
    ) -> Self {
        Self {
            order,
            lines: items
                .iter()
                .map(|item| ConfirmationLine {
                    name: item.product_name.clone(),
                    size: item.product_size.as_ref().map(|s| s.to_uppercase()),
                    quantity: item.quantity,
                    total: currency.format(item.lineitem_total),
                })
                .collect(),
            date: order.date.format("%d %b %Y, %H:%M UTC").to_string(),
            order_total: currency.format(order.order_total),
            delivery: currency.format(order.delivery_cost),
            grand_total: currency.format(order.grand_total),
            contact_email,
        }
    }
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct ConfirmationText<'a> {
    c: &'a Confirmation<'a>,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct ConfirmationHtml<'a> {
    c: &'a Confirmation<'a>,
}

/// Subject line for an order confirmation.
#[must_use]
pub fn confirmation_subject(order: &Order) -> String {
    format!("Kestrel confirmation for Order Number {}", order.order_number)
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailerError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Sends order confirmations.
pub trait OrderNotifier: Send + Sync {
    /// Tell the customer their order has been recorded.
    fn send_confirmation(
        &self,
        order: &Order,
        items: &[OrderLineItem],
    ) -> impl Future<Output = Result<(), MailerError>> + Send;
}

/// SMTP email service.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    currency: CurrencyCode,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig, currency: CurrencyCode) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            currency,
        })
    }

    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: String,
        html_body: String,
    ) -> Result<(), MailerError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| MailerError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| MailerError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )?;

        self.mailer.send(email).await?;

        info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

impl OrderNotifier for EmailService {
    #[instrument(skip_all, fields(order_number = %order.order_number))]
    async fn send_confirmation(
        &self,
        order: &Order,
        items: &[OrderLineItem],
    ) -> Result<(), MailerError> {
        let confirmation = Confirmation::new(order, items, self.currency, &self.from_address);
        let text = ConfirmationText { c: &confirmation }.render()?;
        let html = ConfirmationHtml { c: &confirmation }.render()?;

        self.send_multipart_email(
            order.shipping.email.as_str(),
            &confirmation_subject(order),
            text,
            html,
        )
        .await
    }
}

/// Notifier used when SMTP is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl OrderNotifier for LogNotifier {
    async fn send_confirmation(
        &self,
        order: &Order,
        items: &[OrderLineItem],
    ) -> Result<(), MailerError> {
        info!(
            order_number = %order.order_number,
            to = %order.shipping.email,
            line_items = items.len(),
            "SMTP not configured; skipping confirmation email"
        );
        Ok(())
    }
}

/// The notifier chosen at startup.
#[derive(Clone)]
pub enum Notifier {
    Smtp(EmailService),
    Log(LogNotifier),
}

impl Notifier {
    /// SMTP when configured, logging otherwise.
    ///
    /// # Errors
    ///
    /// Returns error if SMTP settings are present but unusable.
    pub fn from_config(
        config: Option<&EmailConfig>,
        currency: CurrencyCode,
    ) -> Result<Self, SmtpError> {
        match config {
            Some(config) => Ok(Self::Smtp(EmailService::new(config, currency)?)),
            None => Ok(Self::Log(LogNotifier)),
        }
    }
}

impl OrderNotifier for Notifier {
    async fn send_confirmation(
        &self,
        order: &Order,
        items: &[OrderLineItem],
    ) -> Result<(), MailerError> {
        match self {
            Self::Smtp(service) => service.send_confirmation(order, items).await,
            Self::Log(log) => log.send_confirmation(order, items).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use kestrel_core::{
        Email, LineItemId, OrderId, OrderNumber, OrderOrigin, ProductId, ShippingDetails,
    };

    use super::*;

    fn order() -> Order {
        Order {
            id: OrderId::new(1),
            order_number: OrderNumber::new("0A1B2C3D4E5F60718293A4B5C6D7E8F9"),
            user_profile_id: None,
            shipping: ShippingDetails {
                full_name: "Ada Lovelace".into(),
                email: Email::parse("ada@example.com").unwrap(),
                phone_number: "0123456789".into(),
                country: "IE".into(),
                postcode: None,
                town_or_city: "Dublin".into(),
                street_address1: "1 Main Street".into(),
                street_address2: None,
                county: None,
            },
            date: Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap(),
            delivery_cost: Decimal::new(200, 2),
            order_total: Decimal::new(2000, 2),
            grand_total: Decimal::new(2200, 2),
            original_bag: r#"{"1":2}"#.into(),
            stripe_pid: "pi_1".into(),
            origin: OrderOrigin::Checkout,
        }
    }

    #[test]
    fn test_subject() {
        assert_eq!(
            confirmation_subject(&order()),
            "Kestrel confirmation for Order Number 0A1B2C3D4E5F60718293A4B5C6D7E8F9"
        );
    }

    #[test]
    fn test_text_body_lists_order() {
        let order = order();
        let items = vec![OrderLineItem {
            id: LineItemId::new(1),
            order_id: order.id,
            product_id: ProductId::new(7),
            product_name: "Slim Jeans".into(),
            product_size: Some("m".into()),
            quantity: 2,
            lineitem_total: Decimal::new(2000, 2),
        }];
        let confirmation =
            Confirmation::new(&order, &items, CurrencyCode::Usd, "orders@kestrel.test");
        let text = ConfirmationText { c: &confirmation }.render().unwrap();

        assert!(text.contains("Hello Ada Lovelace!"));
        assert!(text.contains("0A1B2C3D4E5F60718293A4B5C6D7E8F9"));
        assert!(text.contains("Slim Jeans (M) x 2"));
        assert!(text.contains("$22.00"));
        assert!(text.contains("1 Main Street in Dublin, IE"));
        assert!(text.contains("orders@kestrel.test"));
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        assert!(LogNotifier.send_confirmation(&order(), &[]).await.is_ok());
    }
}

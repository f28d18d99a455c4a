//! Business logic services for storefront.
//!
//! # Services
//!
//! - `bag` - Session-held bag loading, saving and status messages
//! - `flash` - One-shot status messages
//! - `checkout` - Order materialization from a bag snapshot
//! - `checkout_form` - Checkout form validation
//! - `webhook` - Payment webhook reconciliation
//! - `email` - Order confirmation notifications

pub mod bag;
pub mod checkout;
pub mod checkout_form;
pub mod email;
pub mod flash;
pub mod webhook;

pub use checkout::{CheckoutError, MaterializeOutcome, OrderMaterializer};
pub use checkout_form::{CheckoutForm, CheckoutFormError, FieldError};
pub use email::{EmailService, LogNotifier, MailerError, Notifier, OrderNotifier};
pub use webhook::{PaymentNotification, ReconcileError, ReconcileOutcome, WebhookReconciler};

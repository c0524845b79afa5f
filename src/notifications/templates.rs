//! Mail Template Definitions
//!
//! Askama templates under `templates/`, bound to the contexts the task
//! handlers build. Each template's variables are checked at compile time.

use askama::Template;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Data for the email-verification mail
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VerifyEmailContext {
    pub full_name: String,
    pub username: String,
    pub verify_url: String,
    pub expires_in_minutes: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrderLineView {
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ShippingView {
    pub recipient: String,
    pub line: String,
    pub city: String,
    pub phone: String,
}

/// Data for the order-confirmation mail
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrderConfirmationContext {
    pub full_name: String,
    pub order_id: i64,
    pub status: String,
    pub lines: Vec<OrderLineView>,
    pub total: Decimal,
    pub payment_method: String,
    pub cash_on_delivery: bool,
    pub shipping: Option<ShippingView>,
}

/// A mail template together with its data
#[derive(Debug, Clone, PartialEq)]
pub enum MailTemplate {
    VerifyEmail(VerifyEmailContext),
    OrderConfirmation(OrderConfirmationContext),
}

impl MailTemplate {
    /// Template file under `templates/`
    pub fn path(&self) -> &'static str {
        match self {
            Self::VerifyEmail(_) => "verify_email.html",
            Self::OrderConfirmation(_) => "order_confirmation.html",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Self::VerifyEmail(_) => "Verify your email address".to_string(),
            Self::OrderConfirmation(ctx) => format!("Order #{} received", ctx.order_id),
        }
    }
}

/// Rendering failed; `partial_body` holds whatever was produced before the error
#[derive(Debug, Error)]
#[error("Failed to render template {template}: {message}")]
pub struct RenderError {
    pub template: &'static str,
    pub message: String,
    pub partial_body: String,
}

pub trait TemplateRenderer: Send + Sync + 'static {
    fn render(&self, template: &MailTemplate) -> Result<String, RenderError>;
}

#[derive(Template, Debug)]
#[template(path = "verify_email.html")]
struct VerifyEmailPage<'a> {
    ctx: &'a VerifyEmailContext,
}

#[derive(Template, Debug)]
#[template(path = "order_confirmation.html")]
struct OrderConfirmationPage<'a> {
    ctx: &'a OrderConfirmationContext,
}

/// Renders the compiled askama templates
#[derive(Debug, Clone, Copy, Default)]
pub struct AskamaRenderer;

impl AskamaRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateRenderer for AskamaRenderer {
    fn render(&self, template: &MailTemplate) -> Result<String, RenderError> {
        let mut body = String::new();
        let result = match template {
            MailTemplate::VerifyEmail(ctx) => VerifyEmailPage { ctx }.render_into(&mut body),
            MailTemplate::OrderConfirmation(ctx) => {
                OrderConfirmationPage { ctx }.render_into(&mut body)
            }
        };

        match result {
            Ok(()) => Ok(body),
            Err(e) => Err(RenderError {
                template: template.path(),
                message: e.to_string(),
                partial_body: body,
            }),
        }
    }
}

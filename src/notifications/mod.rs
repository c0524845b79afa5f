//! # Notifications
//!
//! Template rendering and mail delivery collaborators for the task handlers.

pub mod mail;
pub mod templates;

pub use mail::{Attachment, HttpMailSender, MailError, MailSender, OutgoingMail, RecordingMailSender};
pub use templates::{
    AskamaRenderer, MailTemplate, OrderConfirmationContext, OrderLineView, RenderError,
    ShippingView, TemplateRenderer, VerifyEmailContext,
};

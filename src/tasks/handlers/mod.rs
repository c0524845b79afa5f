//! Built-in task handlers.

pub mod order_confirmation;
pub mod verify_email;

pub use order_confirmation::OrderConfirmationHandler;
pub use verify_email::VerifyEmailHandler;

use tracing::error;

use crate::notifications::{MailTemplate, TemplateRenderer};

/// Render `template`, falling back to whatever was produced before a render error
///
/// A broken template must not block delivery, so the partial body is sent.
pub(crate) fn render_or_partial(renderer: &dyn TemplateRenderer, template: &MailTemplate) -> String {
    match renderer.render(template) {
        Ok(body) => body,
        Err(err) => {
            error!(
                template = err.template,
                error = %err.message,
                partial_len = err.partial_body.len(),
                "Template rendering failed; sending partial body"
            );
            err.partial_body
        }
    }
}

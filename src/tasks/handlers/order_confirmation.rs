use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::render_or_partial;
use crate::constants::task_types;
use crate::database::CommerceStore;
use crate::notifications::{
    MailSender, MailTemplate, OrderConfirmationContext, OrderLineView, OutgoingMail, ShippingView,
    TemplateRenderer,
};
use crate::tasks::envelope::{decode_payload, OrderConfirmationPayload};
use crate::tasks::errors::TaskError;
use crate::tasks::handler::TaskHandler;

/// Mails the order summary after checkout: payment → order → lines → user
pub struct OrderConfirmationHandler<S: CommerceStore> {
    store: Arc<S>,
    renderer: Arc<dyn TemplateRenderer>,
    mailer: Arc<dyn MailSender>,
}

impl<S: CommerceStore> OrderConfirmationHandler<S> {
    pub fn new(
        store: Arc<S>,
        renderer: Arc<dyn TemplateRenderer>,
        mailer: Arc<dyn MailSender>,
    ) -> Self {
        Self {
            store,
            renderer,
            mailer,
        }
    }

    async fn build_context(
        &self,
        payment_id: i64,
    ) -> Result<(OrderConfirmationContext, String), TaskError> {
        let payment = self
            .store
            .find_payment(payment_id)
            .await?
            .ok_or_else(|| TaskError::skip_retry(format!("payment {payment_id} does not exist")))?;
        let order = self
            .store
            .find_order(payment.order_id)
            .await?
            .ok_or_else(|| {
                TaskError::skip_retry(format!("order {} does not exist", payment.order_id))
            })?;
        let user = self
            .store
            .find_user(order.user_id)
            .await?
            .ok_or_else(|| TaskError::skip_retry(format!("user {} does not exist", order.user_id)))?;

        let lines: Vec<OrderLineView> = self
            .store
            .order_lines(order.id)
            .await?
            .into_iter()
            .map(|line| OrderLineView {
                line_total: line.line_total(),
                product_name: line.product_name,
                quantity: line.quantity,
                unit_price: line.price,
            })
            .collect();

        // A missing address only drops the shipping block
        let shipping = match self.store.find_address(order.address_id).await? {
            Some(address) => Some(ShippingView {
                recipient: address.recipient,
                line: address.line,
                city: address.city,
                phone: address.phone,
            }),
            None => {
                warn!(order_id = order.id, address_id = order.address_id, "Order address missing");
                None
            }
        };

        let context = OrderConfirmationContext {
            full_name: user.full_name,
            order_id: order.id,
            status: order.status,
            lines,
            total: order.total_price,
            payment_method: payment.method,
            cash_on_delivery: payment.cash_on_delivery,
            shipping,
        };
        Ok((context, user.email))
    }
}

#[async_trait]
impl<S: CommerceStore> TaskHandler for OrderConfirmationHandler<S> {
    fn task_type(&self) -> &'static str {
        task_types::SEND_ORDER_CONFIRMATION
    }

    async fn handle(&self, payload: &serde_json::Value) -> Result<(), TaskError> {
        let OrderConfirmationPayload { payment_id } = decode_payload(payload)?;

        let (context, email) = self.build_context(payment_id).await?;
        let order_id = context.order_id;
        let template = MailTemplate::OrderConfirmation(context);
        let body = render_or_partial(self.renderer.as_ref(), &template);

        self.mailer
            .send(&OutgoingMail::new(template.subject(), body, vec![email]))
            .await?;

        info!(payment_id = payment_id, order_id = order_id, "Order confirmation sent");
        Ok(())
    }
}

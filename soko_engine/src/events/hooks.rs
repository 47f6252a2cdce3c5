use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    DisputeMessageEvent,
    DisputeOpenedEvent,
    DisputeSettledEvent,
    EventHandler,
    EventProducer,
    Handler,
    OrderDeliveredEvent,
    OtpIssuedEvent,
    PayoutUpdatedEvent,
};

/// The send halves the API objects publish into. Cloned into each API object at startup.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_delivered_producer: Vec<EventProducer<OrderDeliveredEvent>>,
    pub dispute_opened_producer: Vec<EventProducer<DisputeOpenedEvent>>,
    pub dispute_message_producer: Vec<EventProducer<DisputeMessageEvent>>,
    pub dispute_settled_producer: Vec<EventProducer<DisputeSettledEvent>>,
    pub payout_updated_producer: Vec<EventProducer<PayoutUpdatedEvent>>,
    pub otp_issued_producer: Vec<EventProducer<OtpIssuedEvent>>,
}

pub struct EventHandlers {
    pub on_order_delivered: Option<EventHandler<OrderDeliveredEvent>>,
    pub on_dispute_opened: Option<EventHandler<DisputeOpenedEvent>>,
    pub on_dispute_message: Option<EventHandler<DisputeMessageEvent>>,
    pub on_dispute_settled: Option<EventHandler<DisputeSettledEvent>>,
    pub on_payout_updated: Option<EventHandler<PayoutUpdatedEvent>>,
    pub on_otp_issued: Option<EventHandler<OtpIssuedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_order_delivered: hooks.on_order_delivered.map(|f| EventHandler::new(buffer_size, f)),
            on_dispute_opened: hooks.on_dispute_opened.map(|f| EventHandler::new(buffer_size, f)),
            on_dispute_message: hooks.on_dispute_message.map(|f| EventHandler::new(buffer_size, f)),
            on_dispute_settled: hooks.on_dispute_settled.map(|f| EventHandler::new(buffer_size, f)),
            on_payout_updated: hooks.on_payout_updated.map(|f| EventHandler::new(buffer_size, f)),
            on_otp_issued: hooks.on_otp_issued.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_delivered {
            result.order_delivered_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_dispute_opened {
            result.dispute_opened_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_dispute_message {
            result.dispute_message_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_dispute_settled {
            result.dispute_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payout_updated {
            result.payout_updated_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_otp_issued {
            result.otp_issued_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_delivered {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_dispute_opened {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_dispute_message {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_dispute_settled {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_payout_updated {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_otp_issued {
            tokio::spawn(handler.start_handler());
        }
    }
}

/// Builder for wiring handlers in before the server starts. Each setter accepts an async
/// closure; see the server crate for the canonical wiring.
#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_delivered: Option<Handler<OrderDeliveredEvent>>,
    pub on_dispute_opened: Option<Handler<DisputeOpenedEvent>>,
    pub on_dispute_message: Option<Handler<DisputeMessageEvent>>,
    pub on_dispute_settled: Option<Handler<DisputeSettledEvent>>,
    pub on_payout_updated: Option<Handler<PayoutUpdatedEvent>>,
    pub on_otp_issued: Option<Handler<OtpIssuedEvent>>,
}

impl EventHooks {
    pub fn on_order_delivered<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderDeliveredEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_delivered = Some(Arc::new(f));
        self
    }

    pub fn on_dispute_opened<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DisputeOpenedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_dispute_opened = Some(Arc::new(f));
        self
    }

    pub fn on_dispute_message<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DisputeMessageEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_dispute_message = Some(Arc::new(f));
        self
    }

    pub fn on_dispute_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DisputeSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_dispute_settled = Some(Arc::new(f));
        self
    }

    pub fn on_payout_updated<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PayoutUpdatedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payout_updated = Some(Arc::new(f));
        self
    }

    pub fn on_otp_issued<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OtpIssuedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_otp_issued = Some(Arc::new(f));
        self
    }
}

//! Delivery to the downstream message broker
//!
//! [`DeliveryClient`] wraps a [`BrokerTransport`] and keeps the cumulative
//! delivery counters; [`MqttTransport`] is the production transport on
//! rumqttc's synchronous client. The trait seam exists so the pipeline and
//! its tests never care which broker sits downstream.

mod client;
mod mqtt;
mod transport;

pub use client::{DeliveryClient, StatsSnapshot};
pub use mqtt::MqttTransport;
pub use transport::{BrokerTransport, PublishError};

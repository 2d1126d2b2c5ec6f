//! # Post Office
//!
//! The sending surface callers use. Validates parcels, performs topic
//! envelope injection for topic-affecting sends, and hands the prepared
//! parcel to the courier. Convenience methods wrap a single message into
//! a one-envelope parcel.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::courier::{Courier, SendError};
use crate::dispatch::handler::BusMessage;
use crate::model::{Channel, Envelope, Parcel, ScheduleSpec, TrackingCode};
use crate::topics::injection::prepare_topic_parcel;
use crate::topics::messages::RecurringHeaderMessage;

/// Entry point for queueing work onto the bus.
pub struct PostOffice {
    courier: Arc<dyn Courier>,
}

impl PostOffice {
    pub fn new(courier: Arc<dyn Courier>) -> Self {
        Self { courier }
    }

    /// Queue a single message to a channel.
    pub async fn send_message<M>(
        &self,
        message: &M,
        channel: &Channel,
    ) -> Result<TrackingCode, SendError>
    where
        M: BusMessage + Serialize,
    {
        let parcel = Parcel::for_single_message(message, channel)?;
        self.send(parcel).await
    }

    /// Queue a parcel, validating it and injecting the topic coordination
    /// envelopes when it declares an affected topic.
    #[instrument(skip(self, parcel), fields(parcel_id = %parcel.id, parcel_name = %parcel.name))]
    pub async fn send(&self, parcel: Parcel) -> Result<TrackingCode, SendError> {
        let prepared = prepare_topic_parcel(parcel)?;
        debug!(
            envelopes = prepared.envelopes.len(),
            "submitting parcel to courier"
        );
        self.courier.send(&prepared).await
    }

    /// Queue a parcel on a recurring schedule. A throwaway recurring
    /// header envelope is prepended so the schedule trigger never
    /// pollutes delivery history; the dispatcher strips it without
    /// tracking.
    #[instrument(skip(self, parcel, schedule), fields(parcel_id = %parcel.id))]
    pub async fn send_recurring(
        &self,
        parcel: Parcel,
        schedule: ScheduleSpec,
    ) -> Result<TrackingCode, SendError> {
        let prepared = prepare_topic_parcel(parcel)?;
        let address = prepared
            .first_envelope()
            .map(|envelope| envelope.address.clone())
            .unwrap_or(Channel::Null);
        let header = Envelope::for_message(&RecurringHeaderMessage, &address)?;
        let prepared = prepared.with_leading_envelope(header);
        debug!(
            envelopes = prepared.envelopes.len(),
            cron = %schedule.cron_expression,
            "submitting recurring parcel to courier"
        );
        self.courier.send_recurring(&prepared, &schedule).await
    }
}

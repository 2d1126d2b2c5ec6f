//! # Topic Envelope Injection
//!
//! Parcel-construction rules for topic-affecting sends: well-formedness
//! checks on caller-supplied marker envelopes, and injection of the
//! coordination envelopes around the caller's sequence. Runs at send
//! time; parcels that fail here are never queued.

use crate::model::{
    DependencyTopic, Envelope, Parcel, SimultaneousRunsStrategy, TopicCheckStrategy, TopicStatus,
    TypeDescription, TypeMatchStrategy, ValidationError,
};
use crate::postal::courier::SendError;

use super::messages::{
    AbortIfNoNewDependencyTopicDataMessage, AbortIfTopicsHaveSpecificStatusesMessage,
    FetchAndShareLatestTopicStatusReportsMessage, TopicBeingAffectedMessage,
    TopicWasAffectedMessage,
};

fn marker_positions(parcel: &Parcel, marker: &TypeDescription) -> Vec<usize> {
    parcel
        .envelopes
        .iter()
        .enumerate()
        .filter(|(_, envelope)| envelope.carries(marker, TypeMatchStrategy::NamespaceAndName))
        .map(|(index, _)| index)
        .collect()
}

fn check_marker_topic(parcel: &Parcel, marker_topic: &str) -> Result<(), ValidationError> {
    match &parcel.topic {
        None => Err(ValidationError::MarkerWithoutTopic),
        Some(topic) if topic.0 != marker_topic => Err(ValidationError::MarkerTopicMismatch {
            marker_topic: marker_topic.to_string(),
            parcel_topic: topic.0.clone(),
        }),
        Some(_) => Ok(()),
    }
}

/// Well-formedness of caller-supplied topic marker envelopes: at most one
/// of each marker, marker topics equal to the parcel topic, and the
/// being-affected marker never after the was-affected marker.
pub fn validate_topic_markers(parcel: &Parcel) -> Result<(), ValidationError> {
    let being = marker_positions(parcel, &TypeDescription::of::<TopicBeingAffectedMessage>());
    let was = marker_positions(parcel, &TypeDescription::of::<TopicWasAffectedMessage>());

    if being.len() > 1 {
        return Err(ValidationError::MultipleBeingAffected);
    }
    if was.len() > 1 {
        return Err(ValidationError::MultipleWasAffected);
    }

    for index in &being {
        let envelope = &parcel.envelopes[*index];
        let message: TopicBeingAffectedMessage =
            serde_json::from_str(&envelope.serialized_payload).map_err(|err| {
                ValidationError::UnreadableMarkerPayload {
                    envelope_id: envelope.id.clone(),
                    message: err.to_string(),
                }
            })?;
        check_marker_topic(parcel, &message.topic.0)?;
    }
    for index in &was {
        let envelope = &parcel.envelopes[*index];
        let message: TopicWasAffectedMessage = serde_json::from_str(&envelope.serialized_payload)
            .map_err(|err| ValidationError::UnreadableMarkerPayload {
                envelope_id: envelope.id.clone(),
                message: err.to_string(),
            })?;
        check_marker_topic(parcel, &message.topic.0)?;
    }

    if let (Some(being_at), Some(was_at)) = (being.first(), was.first()) {
        if being_at > was_at {
            return Err(ValidationError::BeingAffectedAfterWasAffected);
        }
    }
    Ok(())
}

/// Validate a parcel and, when it declares an affected topic, inject the
/// coordination envelopes around the caller's sequence.
///
/// Injection order: fetch-and-share status reports, the overlapping-run
/// gate, the dependency recency gate (only with dependency topics), the
/// being-affected marker, the caller's envelopes unmodified and in
/// order, the was-affected marker. Any step whose envelope the caller
/// already supplied is skipped. Injected envelopes are addressed to the
/// first caller envelope's channel.
pub fn prepare_topic_parcel(parcel: Parcel) -> Result<Parcel, SendError> {
    parcel.validate()?;
    validate_topic_markers(&parcel)?;

    let Some(topic) = parcel.topic.clone() else {
        return Ok(parcel);
    };
    let address = parcel.envelopes[0].address.clone();
    let strategy = TypeMatchStrategy::NamespaceAndName;
    let supplied = |marker: &TypeDescription| {
        parcel
            .envelopes
            .iter()
            .any(|envelope| envelope.carries(marker, strategy))
    };

    let mut envelopes = Vec::with_capacity(parcel.envelopes.len() + 5);

    if !supplied(&TypeDescription::of::<FetchAndShareLatestTopicStatusReportsMessage>()) {
        let mut topics = vec![topic.to_named()];
        topics.extend(parcel.dependency_topics.iter().map(DependencyTopic::to_named));
        envelopes.push(Envelope::for_message(
            &FetchAndShareLatestTopicStatusReportsMessage { topics },
            &address,
        )?);
    }

    if parcel.simultaneous_runs_strategy
        == SimultaneousRunsStrategy::AbortSubsequentRunsWhenOneIsRunning
        && !supplied(&TypeDescription::of::<AbortIfTopicsHaveSpecificStatusesMessage>())
    {
        envelopes.push(Envelope::for_message(
            &AbortIfTopicsHaveSpecificStatusesMessage {
                topics: vec![topic.to_named()],
                statuses_to_abort_on: vec![TopicStatus::BeingAffected],
                strategy: TopicCheckStrategy::Any,
                topic_status_reports: Vec::new(),
            },
            &address,
        )?);
    }

    if !parcel.dependency_topics.is_empty()
        && !supplied(&TypeDescription::of::<AbortIfNoNewDependencyTopicDataMessage>())
    {
        envelopes.push(Envelope::for_message(
            &AbortIfNoNewDependencyTopicDataMessage {
                impacting_topic: topic.clone(),
                dependency_topics: parcel.dependency_topics.clone(),
                strategy: parcel.dependency_topic_check_strategy,
                topic_status_reports: Vec::new(),
            },
            &address,
        )?);
    }

    if !supplied(&TypeDescription::of::<TopicBeingAffectedMessage>()) {
        envelopes.push(Envelope::for_message(
            &TopicBeingAffectedMessage {
                topic: topic.clone(),
                topic_status_reports: Vec::new(),
            },
            &address,
        )?);
    }

    envelopes.extend(parcel.envelopes.iter().cloned());

    if !supplied(&TypeDescription::of::<TopicWasAffectedMessage>()) {
        envelopes.push(Envelope::for_message(
            &TopicWasAffectedMessage {
                topic,
                topic_status_reports: Vec::new(),
            },
            &address,
        )?);
    }

    Ok(parcel.with_envelopes(envelopes))
}

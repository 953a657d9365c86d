use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use error_stack::ResultExt;
use parking_lot::Mutex;
use ripple_batch::{BatchPool, DataBatch, EventKind, StreamEvent, StreamProperties};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::process::ProcessState;
use crate::reshape::{Reshaper, ReshapingPolicy};
use crate::Error;

enum Sink {
    Events(Box<dyn FnMut(&StreamEvent) + Send>),
    Batches(Box<dyn FnMut(&DataBatch) + Send>),
    Channel(tokio::sync::mpsc::UnboundedSender<StreamEvent>),
}

struct Subscriber {
    sink: Sink,
    disposed: Arc<AtomicBool>,
}

impl Subscriber {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// A registered consumer of an output.
///
/// Delivery stops when the subscription is disposed or dropped. Disposing
/// does not wait for the process, so it may be called from within the
/// subscriber's own callback.
#[must_use = "dropping a subscription stops delivery"]
#[derive(Debug)]
pub struct Subscription {
    disposed: Arc<AtomicBool>,
}

impl Subscription {
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Delivery state of a single registered output.
pub(crate) struct OutputState {
    properties: StreamProperties,
    pool: BatchPool,
    pub reshaper: Reshaper,
    subscribers: Vec<Subscriber>,
}

impl std::fmt::Debug for OutputState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputState")
            .field("properties", &self.properties)
            .field("reshaper", &self.reshaper)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl OutputState {
    pub fn new(properties: StreamProperties, policy: ReshapingPolicy, pool: &BatchPool) -> Self {
        Self {
            properties,
            pool: pool.clone(),
            reshaper: Reshaper::new(policy),
            subscribers: Vec::new(),
        }
    }

    pub fn deliver(&mut self, batch: &DataBatch) -> error_stack::Result<(), Error> {
        let events = batch.events().change_context(Error::StreamProcessing)?;
        let mut reshaped = Vec::with_capacity(events.len());
        for event in events {
            self.reshaper.push(event, &mut reshaped);
        }
        self.deliver_events(reshaped, Some(batch))
    }

    /// Deliver any event held back by reshaping.
    pub fn flush(&mut self) -> error_stack::Result<(), Error> {
        let mut reshaped = Vec::new();
        self.reshaper.flush(&mut reshaped);
        if reshaped.is_empty() {
            return Ok(());
        }
        self.deliver_events(reshaped, None)
    }

    fn deliver_events(
        &mut self,
        events: Vec<StreamEvent>,
        original: Option<&DataBatch>,
    ) -> error_stack::Result<(), Error> {
        self.subscribers.retain(|subscriber| !subscriber.is_disposed());
        if self.subscribers.is_empty() {
            tracing::trace!("Discarding {} events without subscribers", events.len());
            return Ok(());
        }

        let wants_batches = self
            .subscribers
            .iter()
            .any(|subscriber| matches!(subscriber.sink, Sink::Batches(_)));
        let batches = match original {
            _ if !wants_batches => Vec::new(),
            Some(batch) if self.reshaper.policy() == ReshapingPolicy::None => vec![batch.clone()],
            _ => self.build_batches(&events)?,
        };

        for subscriber in &mut self.subscribers {
            match &mut subscriber.sink {
                Sink::Events(callback) => {
                    for event in &events {
                        if subscriber.disposed.load(Ordering::Acquire) {
                            break;
                        }
                        callback(event);
                    }
                }
                Sink::Batches(callback) => {
                    for batch in &batches {
                        if subscriber.disposed.load(Ordering::Acquire) {
                            break;
                        }
                        callback(batch);
                    }
                }
                Sink::Channel(sender) => {
                    for event in &events {
                        if sender.send(event.clone()).is_err() {
                            tracing::warn!("Output channel closed by receiver");
                            subscriber.disposed.store(true, Ordering::Release);
                            break;
                        }
                    }
                }
            }
        }

        // Channels end with the stream.
        if events.iter().any(|event| self.is_end_of_stream(event)) {
            for subscriber in &self.subscribers {
                if matches!(subscriber.sink, Sink::Channel(_)) {
                    subscriber.disposed.store(true, Ordering::Release);
                }
            }
            self.subscribers.retain(|subscriber| !subscriber.is_disposed());
        }
        Ok(())
    }

    fn is_end_of_stream(&self, event: &StreamEvent) -> bool {
        let whole_stream = match event.kind {
            EventKind::LowWatermark => true,
            EventKind::Punctuation => !self.properties.partitioned,
            _ => false,
        };
        whole_stream && event.sync_time.is_infinite()
    }

    fn build_batches(&self, events: &[StreamEvent]) -> error_stack::Result<Vec<DataBatch>, Error> {
        let mut builder = self.pool.builder(self.properties.payload_type.clone());
        let mut batches = Vec::new();
        for event in events {
            if builder.is_full() {
                batches.extend(builder.finish().change_context(Error::StreamProcessing)?);
            }
            builder.push(event.clone());
        }
        batches.extend(builder.finish().change_context(Error::StreamProcessing)?);
        Ok(batches)
    }

    fn subscribe(&mut self, sink: Sink) -> Arc<AtomicBool> {
        let disposed = Arc::new(AtomicBool::new(false));
        self.subscribers.push(Subscriber {
            sink,
            disposed: disposed.clone(),
        });
        disposed
    }
}

/// The egress point of a registered output within a running process.
///
/// Subscribers registered here see the output produced after they
/// subscribe. Callbacks run on the thread that pushed the input and must
/// not call back into the process.
#[derive(Clone)]
pub struct EgressHandle {
    output: usize,
    properties: StreamProperties,
    state: Arc<Mutex<ProcessState>>,
}

impl std::fmt::Debug for EgressHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EgressHandle")
            .field("output", &self.output)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

impl EgressHandle {
    pub(crate) fn new(
        output: usize,
        properties: StreamProperties,
        state: Arc<Mutex<ProcessState>>,
    ) -> Self {
        Self {
            output,
            properties,
            state,
        }
    }

    pub fn properties(&self) -> &StreamProperties {
        &self.properties
    }

    /// Call `callback` with each output event.
    pub fn subscribe(
        &self,
        callback: impl FnMut(&StreamEvent) + Send + 'static,
    ) -> error_stack::Result<Subscription, Error> {
        self.add(Sink::Events(Box::new(callback)))
            .map(|disposed| Subscription { disposed })
    }

    /// Call `callback` with each output batch.
    pub fn subscribe_batches(
        &self,
        callback: impl FnMut(&DataBatch) + Send + 'static,
    ) -> error_stack::Result<Subscription, Error> {
        self.add(Sink::Batches(Box::new(callback)))
            .map(|disposed| Subscription { disposed })
    }

    /// A stream of the output events for async consumers.
    ///
    /// The stream ends after the final marker at infinity. Dropping it
    /// unsubscribes.
    pub fn channel(&self) -> error_stack::Result<UnboundedReceiverStream<StreamEvent>, Error> {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        self.add(Sink::Channel(sender))?;
        Ok(UnboundedReceiverStream::new(receiver))
    }

    fn add(&self, sink: Sink) -> error_stack::Result<Arc<AtomicBool>, Error> {
        let mut state = self.state.lock();
        error_stack::ensure!(!state.failed, Error::ProcessFailed);
        let output = state
            .outputs
            .get_mut(self.output)
            .ok_or(Error::Internal("unknown output"))?;
        Ok(output.subscribe(sink))
    }
}

use ripple_batch::{EventKind, StreamEvent};
use ripple_state::{Checkpointable, CheckpointReader, CheckpointWriter};

/// Post-processing applied to a stream before it is delivered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReshapingPolicy {
    /// Deliver events as produced.
    #[default]
    None,
    /// Deliver a start edge immediately followed by its end edge as a single
    /// interval.
    CoalesceEndEdges,
}

/// Applies a [ReshapingPolicy] to the events of one output.
#[derive(Debug)]
pub(crate) struct Reshaper {
    policy: ReshapingPolicy,
    /// A start edge waiting to see whether the next event closes it.
    pending: Option<StreamEvent>,
}

impl Reshaper {
    pub fn new(policy: ReshapingPolicy) -> Self {
        Self {
            policy,
            pending: None,
        }
    }

    pub fn policy(&self) -> ReshapingPolicy {
        self.policy
    }

    pub fn push(&mut self, event: StreamEvent, output: &mut Vec<StreamEvent>) {
        if self.policy == ReshapingPolicy::None {
            output.push(event);
            return;
        }

        if let Some(start) = self.pending.take() {
            let closes = event.kind == EventKind::End
                && event.key == start.key
                && event.other_time == start.sync_time
                && event.payload == start.payload;
            if closes {
                output.push(StreamEvent {
                    sync_time: start.sync_time,
                    other_time: event.sync_time,
                    kind: EventKind::Interval,
                    key: start.key,
                    payload: start.payload,
                });
                return;
            }
            output.push(start);
        }

        if event.kind == EventKind::Start {
            self.pending = Some(event);
        } else {
            output.push(event);
        }
    }

    /// Release a start edge held back for coalescing.
    pub fn flush(&mut self, output: &mut Vec<StreamEvent>) {
        output.extend(self.pending.take());
    }
}

impl Checkpointable for Reshaper {
    fn checkpoint(
        &self,
        section: &str,
        writer: &mut CheckpointWriter<'_>,
    ) -> error_stack::Result<(), ripple_state::Error> {
        writer.write_section(section, &self.pending)
    }

    fn restore(
        &mut self,
        section: &str,
        reader: &mut CheckpointReader<'_>,
    ) -> error_stack::Result<(), ripple_state::Error> {
        self.pending = reader.read_section(section)?;
        Ok(())
    }
}

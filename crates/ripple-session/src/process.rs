use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;

use error_stack::ResultExt;
use parking_lot::Mutex;
use ripple_batch::{BatchPool, DataBatch, StreamEvent};
use ripple_ingress::Ingress;
use ripple_operators::{Operator, Side};
use ripple_state::{Checkpointable, CheckpointReader, CheckpointWriter};

use crate::container::{Input, Output, Stream};
use crate::egress::{EgressHandle, OutputState};
use crate::Error;

pub(crate) enum Node {
    Ingress(Ingress),
    Operator(Box<dyn Operator>),
}

impl Node {
    fn checkpoint(
        &self,
        section: &str,
        writer: &mut CheckpointWriter<'_>,
    ) -> error_stack::Result<(), ripple_state::Error> {
        match self {
            Node::Ingress(ingress) => ingress.checkpoint(section, writer),
            Node::Operator(operator) => operator.checkpoint(section, writer),
        }
    }

    pub fn restore(
        &mut self,
        section: &str,
        reader: &mut CheckpointReader<'_>,
    ) -> error_stack::Result<(), ripple_state::Error> {
        match self {
            Node::Ingress(ingress) => ingress.restore(section, reader),
            Node::Operator(operator) => operator.restore(section, reader),
        }
    }
}

/// Where the output of a node goes.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Consumer {
    Operator { node: usize, side: Side },
    Output(usize),
}

/// The mutable state of a process, guarded by a single lock.
pub(crate) struct ProcessState {
    pub nodes: Vec<Node>,
    /// Checkpoint section of each node.
    pub sections: Vec<String>,
    pub consumers: Vec<Vec<Consumer>>,
    pub outputs: Vec<OutputState>,
    pub failed: bool,
}

impl ProcessState {
    /// Run `f`, poisoning the process if it fails.
    fn run(
        &mut self,
        f: impl FnOnce(&mut Self) -> error_stack::Result<(), Error>,
    ) -> error_stack::Result<(), Error> {
        error_stack::ensure!(!self.failed, Error::ProcessFailed);
        let result = f(self);
        if let Err(error) = &result {
            tracing::error!("Process failed: {error:?}");
            self.failed = true;
        }
        result
    }

    fn ingest(
        &mut self,
        node: usize,
        f: impl FnOnce(&mut Ingress) -> error_stack::Result<(), ripple_ingress::Error>,
    ) -> error_stack::Result<(), Error> {
        let Some(Node::Ingress(ingress)) = self.nodes.get_mut(node) else {
            error_stack::bail!(Error::Internal("expected ingress node"));
        };
        f(ingress).change_context(Error::StreamProcessing)?;
        let batches = ingress.take_output();
        self.propagate(node, batches)
    }

    /// Push batches produced by `node` through everything downstream of it.
    fn propagate(
        &mut self,
        node: usize,
        batches: Vec<DataBatch>,
    ) -> error_stack::Result<(), Error> {
        let mut pending: VecDeque<(usize, DataBatch)> =
            batches.into_iter().map(|batch| (node, batch)).collect();
        let mut produced = Vec::new();
        while let Some((source, batch)) = pending.pop_front() {
            for consumer in &self.consumers[source] {
                match *consumer {
                    Consumer::Operator { node: target, side } => {
                        let Some(Node::Operator(operator)) = self.nodes.get_mut(target) else {
                            error_stack::bail!(Error::Internal("expected operator node"));
                        };
                        operator
                            .push(side, &batch, &mut produced)
                            .change_context(Error::StreamProcessing)?;
                        pending.extend(produced.drain(..).map(|batch| (target, batch)));
                    }
                    Consumer::Output(output) => {
                        self.outputs[output].deliver(&batch)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> error_stack::Result<(), Error> {
        for node in 0..self.nodes.len() {
            if matches!(self.nodes[node], Node::Ingress(_)) {
                self.ingest(node, Ingress::flush)?;
            }
        }
        for output in &mut self.outputs {
            output.flush()?;
        }
        Ok(())
    }

    fn checkpoint(&self, writer: &mut dyn Write) -> error_stack::Result<(), Error> {
        let mut writer = CheckpointWriter::try_new(writer).change_context(Error::Checkpoint)?;
        for (node, section) in self.nodes.iter().zip(&self.sections) {
            node.checkpoint(section, &mut writer)
                .change_context(Error::Checkpoint)?;
        }
        for (index, output) in self.outputs.iter().enumerate() {
            output
                .reshaper
                .checkpoint(&format!("output/{index}"), &mut writer)
                .change_context(Error::Checkpoint)?;
        }
        let sections = writer.num_sections();
        writer.finish().change_context(Error::Checkpoint)?;
        tracing::info!("Wrote checkpoint with {sections} sections");
        Ok(())
    }
}

/// A running query.
///
/// Created by [QueryContainer::restore](crate::QueryContainer::restore).
/// Input is pushed through [IngressHandle]s and processed synchronously on
/// the pushing thread; output is delivered to the subscribers of each
/// [EgressHandle] before the push returns.
///
/// A failure while processing poisons the process: every later call fails
/// with [Error::ProcessFailed].
pub struct Process {
    container: u64,
    state: Arc<Mutex<ProcessState>>,
    pool: BatchPool,
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("container", &self.container)
            .field("outstanding_batches", &self.pool.outstanding())
            .finish_non_exhaustive()
    }
}

impl Process {
    pub(crate) fn new(container: u64, state: ProcessState, pool: BatchPool) -> Self {
        Self {
            container,
            state: Arc::new(Mutex::new(state)),
            pool,
        }
    }

    pub fn ingress(&self, input: &Input) -> error_stack::Result<IngressHandle, Error> {
        error_stack::ensure!(
            input.stream().container == self.container,
            Error::ForeignStream
        );
        Ok(IngressHandle {
            node: input.stream().node,
            state: self.state.clone(),
        })
    }

    pub fn egress(&self, output: &Output) -> error_stack::Result<EgressHandle, Error> {
        error_stack::ensure!(output.container == self.container, Error::ForeignStream);
        Ok(EgressHandle::new(
            output.index,
            output.properties.clone(),
            self.state.clone(),
        ))
    }

    /// Process everything ingested so far.
    ///
    /// Every ingress releases the events in its reorder window, so when this
    /// returns all ingested events have been pushed through the operators
    /// and the output they allow has been delivered to the subscribers.
    /// Events that later arrive within the released window are late.
    pub fn flush(&self) -> error_stack::Result<(), Error> {
        self.state.lock().run(ProcessState::flush)
    }

    /// Write the state of every ingress, operator and output.
    pub fn checkpoint(&self, writer: &mut dyn Write) -> error_stack::Result<(), Error> {
        let state = self.state.lock();
        error_stack::ensure!(!state.failed, Error::ProcessFailed);
        state.checkpoint(writer)
    }

    pub fn is_failed(&self) -> bool {
        self.state.lock().failed
    }

    /// Number of partitions with resident state in the node producing
    /// `stream`.
    pub fn num_partitions(&self, stream: &Stream) -> error_stack::Result<usize, Error> {
        error_stack::ensure!(stream.container == self.container, Error::ForeignStream);
        let state = self.state.lock();
        match state.nodes.get(stream.node) {
            Some(Node::Ingress(ingress)) => Ok(ingress.num_partitions()),
            Some(Node::Operator(operator)) => Ok(operator.num_partitions()),
            None => error_stack::bail!(Error::Internal("unknown stream")),
        }
    }

    /// Number of batches that have not been freed.
    pub fn outstanding_batches(&self) -> usize {
        self.pool.outstanding()
    }
}

/// The ingress point of a registered input within a running process.
///
/// Handles are cheap to clone and may be used from any thread.
#[derive(Clone)]
pub struct IngressHandle {
    node: usize,
    state: Arc<Mutex<ProcessState>>,
}

impl std::fmt::Debug for IngressHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngressHandle")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}

impl IngressHandle {
    pub fn on_next(&self, event: StreamEvent) -> error_stack::Result<(), Error> {
        let node = self.node;
        self.state
            .lock()
            .run(|state| state.ingest(node, |ingress| ingress.on_next(event)))
    }

    pub fn on_next_batch(
        &self,
        events: impl IntoIterator<Item = StreamEvent>,
    ) -> error_stack::Result<(), Error> {
        let node = self.node;
        self.state
            .lock()
            .run(|state| state.ingest(node, |ingress| ingress.on_next_batch(events)))
    }

    pub fn on_completed(&self) -> error_stack::Result<(), Error> {
        let node = self.node;
        self.state
            .lock()
            .run(|state| state.ingest(node, Ingress::on_completed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Process>();
        assert_send::<IngressHandle>();
        assert_send::<EgressHandle>();
    }
}

use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};

use error_stack::ResultExt;
use ripple_batch::{BatchPool, StreamProperties};
use ripple_ingress::{Ingress, IngressOptions};
use ripple_operators::{create_operator, JoinKind, OperatorKind, OperatorOptions, Side};
use ripple_state::{Checkpointable, CheckpointReader};

use crate::egress::OutputState;
use crate::process::{Consumer, Node, Process, ProcessState};
use crate::{Config, Error, ReshapingPolicy};

static NEXT_CONTAINER: AtomicU64 = AtomicU64::new(0);

/// A stream within a query container.
#[derive(Clone, Debug)]
pub struct Stream {
    pub(crate) container: u64,
    pub(crate) node: usize,
    properties: StreamProperties,
}

impl Stream {
    pub fn properties(&self) -> &StreamProperties {
        &self.properties
    }
}

/// A registered input.
#[derive(Clone, Debug)]
pub struct Input {
    index: usize,
    stream: Stream,
}

impl Input {
    pub fn index(&self) -> usize {
        self.index
    }

    /// The stream of events produced by this input.
    pub fn stream(&self) -> &Stream {
        &self.stream
    }
}

/// A registered output.
#[derive(Clone, Debug)]
pub struct Output {
    pub(crate) container: u64,
    pub(crate) index: usize,
    pub(crate) properties: StreamProperties,
}

enum NodeSpec {
    Ingress {
        options: IngressOptions,
        properties: StreamProperties,
    },
    Operator {
        kind: OperatorKind,
        inputs: [usize; 2],
        options: OperatorOptions,
        properties: StreamProperties,
    },
}

struct OutputSpec {
    node: usize,
    policy: ReshapingPolicy,
}

/// Describes a query: its inputs, the operators between them and its
/// outputs.
///
/// A container is a template. Each call to [QueryContainer::restore]
/// instantiates a new [Process] with fresh state, or with the state read
/// from a checkpoint.
pub struct QueryContainer {
    id: u64,
    config: Config,
    pool: BatchPool,
    nodes: Vec<NodeSpec>,
    /// Node of each input.
    inputs: Vec<usize>,
    outputs: Vec<OutputSpec>,
}

impl std::fmt::Debug for QueryContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryContainer")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("nodes", &self.nodes.len())
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish_non_exhaustive()
    }
}

impl QueryContainer {
    pub fn new(config: Config) -> Self {
        let pool = BatchPool::new(config.data_batch_size);
        Self {
            id: NEXT_CONTAINER.fetch_add(1, Ordering::Relaxed),
            config,
            pool,
            nodes: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of batches created by processes of this container that have
    /// not been freed.
    pub fn outstanding_batches(&self) -> usize {
        self.pool.outstanding()
    }

    pub fn register_input(
        &mut self,
        properties: StreamProperties,
        options: IngressOptions,
    ) -> error_stack::Result<Input, Error> {
        // Validates the options against the stream.
        Ingress::try_new(
            options,
            properties.clone(),
            &self.pool,
            self.config.partition_grace,
        )
        .change_context(Error::RegisterInput)?;

        let index = self.inputs.len();
        let node = self.add_node(NodeSpec::Ingress {
            options,
            properties: properties.clone(),
        });
        self.inputs.push(node);
        Ok(Input {
            index,
            stream: Stream {
                container: self.id,
                node,
                properties,
            },
        })
    }

    pub fn join(
        &mut self,
        left: &Stream,
        right: &Stream,
        options: OperatorOptions,
    ) -> error_stack::Result<Stream, Error> {
        self.add_operator(OperatorKind::Join(JoinKind::Inner), left, right, options)
    }

    /// Join that also produces the left intervals without a match, paired
    /// with a null right payload.
    pub fn left_outer_join(
        &mut self,
        left: &Stream,
        right: &Stream,
        options: OperatorOptions,
    ) -> error_stack::Result<Stream, Error> {
        self.add_operator(OperatorKind::Join(JoinKind::LeftOuter), left, right, options)
    }

    /// Truncate each left interval at the first right event with the same
    /// key that starts inside it.
    pub fn clip(
        &mut self,
        left: &Stream,
        right: &Stream,
        options: OperatorOptions,
    ) -> error_stack::Result<Stream, Error> {
        self.add_operator(OperatorKind::Clip, left, right, options)
    }

    pub fn union(&mut self, left: &Stream, right: &Stream) -> error_stack::Result<Stream, Error> {
        self.add_operator(
            OperatorKind::Union,
            left,
            right,
            OperatorOptions::default(),
        )
    }

    /// The left intervals that no right interval with the same key overlaps.
    pub fn where_not_exists(
        &mut self,
        left: &Stream,
        right: &Stream,
        options: OperatorOptions,
    ) -> error_stack::Result<Stream, Error> {
        self.add_operator(OperatorKind::WhereNotExists, left, right, options)
    }

    pub fn register_output(
        &mut self,
        stream: &Stream,
        policy: ReshapingPolicy,
    ) -> error_stack::Result<Output, Error> {
        error_stack::ensure!(stream.container == self.id, Error::ForeignStream);
        let index = self.outputs.len();
        self.outputs.push(OutputSpec {
            node: stream.node,
            policy,
        });
        Ok(Output {
            container: self.id,
            index,
            properties: stream.properties.clone(),
        })
    }

    /// Instantiate a process, with state read from `checkpoint` if present.
    ///
    /// The checkpoint must have been written by a process of a container
    /// with the same inputs, operators and outputs. It may have been written
    /// with a different execution mode.
    pub fn restore(&self, checkpoint: Option<&mut dyn Read>) -> error_stack::Result<Process, Error> {
        let mode = self.config.execution_mode();
        let grace = self.config.partition_grace;

        let mut nodes = Vec::with_capacity(self.nodes.len());
        let mut sections = Vec::with_capacity(self.nodes.len());
        let mut consumers = vec![Vec::new(); self.nodes.len()];
        let mut num_inputs = 0;
        let mut num_operators = 0;
        for (index, spec) in self.nodes.iter().enumerate() {
            match spec {
                NodeSpec::Ingress {
                    options,
                    properties,
                } => {
                    let ingress = Ingress::try_new(*options, properties.clone(), &self.pool, grace)
                        .change_context(Error::RegisterInput)?;
                    sections.push(format!("ingress/{num_inputs}"));
                    num_inputs += 1;
                    nodes.push(Node::Ingress(ingress));
                }
                NodeSpec::Operator {
                    kind,
                    inputs,
                    options,
                    ..
                } => {
                    let operator = create_operator(
                        *kind,
                        self.properties(inputs[0]),
                        self.properties(inputs[1]),
                        options,
                        mode,
                        &self.pool,
                        grace,
                    )
                    .change_context(Error::StreamProcessing)?;
                    consumers[inputs[0]].push(Consumer::Operator {
                        node: index,
                        side: Side::Left,
                    });
                    consumers[inputs[1]].push(Consumer::Operator {
                        node: index,
                        side: Side::Right,
                    });
                    sections.push(format!("operator/{num_operators}"));
                    num_operators += 1;
                    nodes.push(Node::Operator(operator));
                }
            }
        }

        let mut outputs = Vec::with_capacity(self.outputs.len());
        for (index, spec) in self.outputs.iter().enumerate() {
            consumers[spec.node].push(Consumer::Output(index));
            outputs.push(OutputState::new(
                self.properties(spec.node).clone(),
                spec.policy,
                &self.pool,
            ));
        }

        let mut state = ProcessState {
            nodes,
            sections,
            consumers,
            outputs,
            failed: false,
        };

        if let Some(checkpoint) = checkpoint {
            let mut reader = CheckpointReader::try_new(checkpoint).change_context(Error::Restore)?;
            for (node, section) in state.nodes.iter_mut().zip(&state.sections) {
                node.restore(section, &mut reader)
                    .change_context(Error::Restore)?;
            }
            for (index, output) in state.outputs.iter_mut().enumerate() {
                output
                    .reshaper
                    .restore(&format!("output/{index}"), &mut reader)
                    .change_context(Error::Restore)?;
            }
            reader.finish().change_context(Error::Restore)?;
            tracing::info!(
                "Restored process with {} nodes from checkpoint",
                state.nodes.len()
            );
        }

        Ok(Process::new(self.id, state, self.pool.clone()))
    }

    fn add_node(&mut self, spec: NodeSpec) -> usize {
        self.nodes.push(spec);
        self.nodes.len() - 1
    }

    fn properties(&self, node: usize) -> &StreamProperties {
        match &self.nodes[node] {
            NodeSpec::Ingress { properties, .. } => properties,
            NodeSpec::Operator { properties, .. } => properties,
        }
    }

    fn add_operator(
        &mut self,
        kind: OperatorKind,
        left: &Stream,
        right: &Stream,
        options: OperatorOptions,
    ) -> error_stack::Result<Stream, Error> {
        error_stack::ensure!(
            left.container == self.id && right.container == self.id,
            Error::ForeignStream
        );

        // Building the operator validates the inputs and the options in the
        // configured execution mode.
        let operator = create_operator(
            kind,
            &left.properties,
            &right.properties,
            &options,
            self.config.execution_mode(),
            &self.pool,
            self.config.partition_grace,
        )
        .map_err(|report| {
            let context = match report.current_context() {
                ripple_operators::Error::InvalidComparer => Error::StreamProcessing,
                _ => Error::InvalidOperator(kind.to_string()),
            };
            report.change_context(context)
        })?;
        let properties = operator.properties().clone();

        let node = self.add_node(NodeSpec::Operator {
            kind,
            inputs: [left.node, right.node],
            options,
            properties: properties.clone(),
        });
        tracing::debug!("Registered {kind} as node {node} producing {properties:?}");
        Ok(Stream {
            container: self.id,
            node,
            properties,
        })
    }
}

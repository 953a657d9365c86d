use std::io::Read;

use arrow_schema::DataType;
use ripple_batch::{StreamEvent, StreamProperties};
use ripple_ingress::IngressOptions;
use ripple_session::{
    Config, Error, IngressHandle, Input, Output, Process, QueryContainer, ReshapingPolicy, Stream,
    Subscription,
};
use ripple_testing::{init_test_logging, Recorder};

/// Both execution modes. Every scenario runs under each of them.
pub(crate) fn configs() -> [Config; 2] {
    [
        Config::default(),
        Config::default().with_force_row_based_execution(true),
    ]
}

pub(crate) fn int64(partitioned: bool) -> StreamProperties {
    StreamProperties::new(partitioned, DataType::Int64)
}

/// Render events one per line, for snapshots.
pub(crate) fn render<T: ToString>(events: impl IntoIterator<Item = T>) -> String {
    events
        .into_iter()
        .map(|event| event.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A query with two inputs, a binary operator over them and one output.
#[derive(Debug)]
pub(crate) struct QueryFixture {
    pub container: QueryContainer,
    pub left: Input,
    pub right: Input,
    pub stream: Stream,
    pub output: Output,
}

impl QueryFixture {
    pub fn new(
        config: Config,
        partitioned: bool,
        operator: impl FnOnce(&mut QueryContainer, &Stream, &Stream) -> error_stack::Result<Stream, Error>,
    ) -> Self {
        Self::try_new(
            config,
            [int64(partitioned), int64(partitioned)],
            IngressOptions::default(),
            ReshapingPolicy::None,
            operator,
        )
        .unwrap()
    }

    pub fn try_new(
        config: Config,
        inputs: [StreamProperties; 2],
        ingress: IngressOptions,
        reshaping: ReshapingPolicy,
        operator: impl FnOnce(&mut QueryContainer, &Stream, &Stream) -> error_stack::Result<Stream, Error>,
    ) -> error_stack::Result<Self, Error> {
        init_test_logging();
        let [left, right] = inputs;
        let mut container = QueryContainer::new(config);
        let left = container.register_input(left, ingress)?;
        let right = container.register_input(right, ingress)?;
        let stream = operator(&mut container, left.stream(), right.stream())?;
        let output = container.register_output(&stream, reshaping)?;
        Ok(Self {
            container,
            left,
            right,
            stream,
            output,
        })
    }

    pub fn run(&self) -> RunningQuery {
        self.start(self.container.restore(None).unwrap())
    }

    pub fn restore(&self, checkpoint: &[u8]) -> RunningQuery {
        let mut checkpoint = checkpoint;
        let process = self
            .container
            .restore(Some(&mut checkpoint as &mut dyn Read))
            .unwrap();
        self.start(process)
    }

    fn start(&self, process: Process) -> RunningQuery {
        let left = process.ingress(&self.left).unwrap();
        let right = process.ingress(&self.right).unwrap();
        let recorder = Recorder::new();
        let subscription = process
            .egress(&self.output)
            .unwrap()
            .subscribe(recorder.callback())
            .unwrap();
        RunningQuery {
            process,
            left,
            right,
            recorder,
            _subscription: subscription,
        }
    }
}

pub(crate) struct RunningQuery {
    pub process: Process,
    pub left: IngressHandle,
    pub right: IngressHandle,
    recorder: Recorder<StreamEvent>,
    _subscription: Subscription,
}

impl RunningQuery {
    pub fn push_left(&self, events: impl IntoIterator<Item = StreamEvent>) {
        for event in events {
            self.left.on_next(event).unwrap();
        }
    }

    pub fn push_right(&self, events: impl IntoIterator<Item = StreamEvent>) {
        for event in events {
            self.right.on_next(event).unwrap();
        }
    }

    pub fn complete(&self) {
        self.left.on_completed().unwrap();
        self.right.on_completed().unwrap();
    }

    /// Remove the events delivered so far.
    pub fn take_events(&self) -> Vec<StreamEvent> {
        self.recorder.take()
    }

    /// Remove the events delivered so far, rendered one per line.
    pub fn take_output(&self) -> String {
        render(self.take_events())
    }

    /// Flush, then checkpoint.
    pub fn checkpoint(&self) -> Vec<u8> {
        self.process.flush().unwrap();
        let mut checkpoint = Vec::new();
        self.process.checkpoint(&mut checkpoint).unwrap();
        checkpoint
    }

    pub fn assert_no_leaks(&self) {
        assert_eq!(self.process.outstanding_batches(), 0);
    }
}

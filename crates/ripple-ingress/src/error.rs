use ripple_batch::SyncTime;

#[derive(derive_more::Display, Debug)]
pub enum Error {
    #[display(fmt = "event at {time} arrived after the earliest acceptable time {bound}")]
    OutOfOrder { time: SyncTime, bound: SyncTime },
    #[display(fmt = "low watermark {time} does not advance past {current}")]
    LowWatermarkRegression { time: SyncTime, current: SyncTime },
    #[display(fmt = "low watermarks are only valid on partitioned streams")]
    LowWatermarkOnUnpartitioned,
    #[display(fmt = "invalid event {_0}")]
    InvalidEvent(String),
    #[display(fmt = "invalid ingress options: {_0}")]
    InvalidOptions(&'static str),
    #[display(fmt = "ingress already completed")]
    Completed,
    #[display(fmt = "failed to produce output batch")]
    Batch,
}

impl error_stack::Context for Error {}

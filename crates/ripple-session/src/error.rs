#[derive(derive_more::Display, Debug)]
pub enum Error {
    #[display(fmt = "stream does not belong to this query container")]
    ForeignStream,
    #[display(fmt = "invalid {_0}")]
    InvalidOperator(String),
    #[display(fmt = "failed to register input")]
    RegisterInput,
    #[display(fmt = "stream processing failed")]
    StreamProcessing,
    #[display(fmt = "process failed earlier and can no longer be used")]
    ProcessFailed,
    #[display(fmt = "failed to write checkpoint")]
    Checkpoint,
    #[display(fmt = "failed to restore from checkpoint")]
    Restore,
    #[display(fmt = "internal error: {_0}")]
    Internal(&'static str),
}

impl error_stack::Context for Error {}

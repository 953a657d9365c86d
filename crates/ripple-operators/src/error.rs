#[derive(derive_more::Display, Debug)]
pub enum Error {
    #[display(
        fmt = "custom payload equality is not supported by columnar execution; compare declared fields or force row-based execution"
    )]
    InvalidComparer,
    #[display(fmt = "invalid payload equality: {_0}")]
    InvalidEquality(String),
    #[display(fmt = "incompatible operator inputs: {_0}")]
    IncompatibleInputs(String),
    #[display(fmt = "failed to read input payload")]
    Payload,
    #[display(fmt = "failed to produce output batch")]
    Output,
    #[display(fmt = "internal error: {_0}")]
    Internal(&'static str),
}

impl error_stack::Context for Error {}

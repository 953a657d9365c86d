#[derive(derive_more::Display, Debug)]
pub enum Error {
    #[display(fmt = "failed to write checkpoint")]
    Write,
    #[display(fmt = "failed to read checkpoint")]
    Read,
    #[display(fmt = "not a checkpoint stream")]
    InvalidHeader,
    #[display(fmt = "unsupported checkpoint version {_0}")]
    UnsupportedVersion(u32),
    #[display(fmt = "expected checkpoint section '{expected}', but found '{actual}'")]
    UnexpectedSection { expected: String, actual: String },
    #[display(fmt = "checkpoint ended before section '{_0}'")]
    MissingSection(String),
    #[display(fmt = "checkpoint has unread section '{_0}'")]
    TrailingSection(String),
    #[display(fmt = "failed to serialize section '{_0}'")]
    Serialize(String),
    #[display(fmt = "failed to deserialize section '{_0}'")]
    Deserialize(String),
    #[display(fmt = "invalid state in section '{_0}'")]
    InvalidState(String),
}

impl error_stack::Context for Error {}

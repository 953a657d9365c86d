#[derive(derive_more::Display, Debug)]
pub enum Error {
    #[display(fmt = "internal error: {}", _0)]
    Internal(String),
    #[display(fmt = "batch with {len} rows exceeds the capacity of {capacity}")]
    ExceedsCapacity { len: usize, capacity: usize },
    #[display(fmt = "invalid event kind {_0}")]
    InvalidKind(u8),
    #[display(fmt = "unrecognized batch stream header")]
    InvalidHeader,
    #[display(
        fmt = "stream properties were {}written, but the reader {}expected them",
        "if *written { \"\" } else { \"not \" }",
        "if *expected { \"\" } else { \"not \" }"
    )]
    PropertiesMismatch { written: bool, expected: bool },
    #[display(fmt = "failed to write batch stream")]
    Write,
    #[display(fmt = "failed to read batch stream")]
    Read,
}

impl error_stack::Context for Error {}

impl Error {
    pub fn internal() -> Self {
        Error::Internal("no additional context".to_owned())
    }

    pub fn internal_msg(msg: String) -> Self {
        Error::Internal(msg)
    }
}

//! Named checkpoint sections.
//!
//! A checkpoint is a magic header and version, followed by a sequence of
//! sections, and terminated by an end tag. Each section has a name and a
//! length-prefixed `bincode` body. Sections are read back in the order they
//! were written, and the reader verifies the names so a checkpoint can't be
//! restored into a differently shaped graph.

use std::io::{Read, Write};

use error_stack::{IntoReport, ResultExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Error;

const MAGIC: &[u8; 8] = b"RIPPLECK";
const VERSION: u32 = 1;

const TAG_SECTION: u8 = 1;
const TAG_END: u8 = 0;

/// Implemented by each component whose state is part of a checkpoint.
pub trait Checkpointable {
    /// Write the state of this component as the section `section`.
    fn checkpoint(&self, section: &str, writer: &mut CheckpointWriter<'_>)
        -> error_stack::Result<(), Error>;

    /// Replace the state of this component with the section `section`.
    fn restore(&mut self, section: &str, reader: &mut CheckpointReader<'_>)
        -> error_stack::Result<(), Error>;
}

pub struct CheckpointWriter<'a> {
    writer: &'a mut dyn Write,
    sections: usize,
}

impl<'a> CheckpointWriter<'a> {
    pub fn try_new(writer: &'a mut dyn Write) -> error_stack::Result<Self, Error> {
        writer
            .write_all(MAGIC)
            .and_then(|_| writer.write_all(&VERSION.to_le_bytes()))
            .into_report()
            .change_context(Error::Write)?;
        Ok(Self {
            writer,
            sections: 0,
        })
    }

    pub fn write_section<T: Serialize>(
        &mut self,
        name: &str,
        state: &T,
    ) -> error_stack::Result<(), Error> {
        let body = bincode::serialize(state)
            .into_report()
            .change_context_lazy(|| Error::Serialize(name.to_owned()))?;

        write_tag(self.writer, TAG_SECTION)?;
        write_bytes(self.writer, name.as_bytes())?;
        write_bytes(self.writer, &body)?;
        self.sections += 1;
        tracing::trace!("Wrote checkpoint section '{name}' ({} bytes)", body.len());
        Ok(())
    }

    /// Number of sections written so far.
    pub fn num_sections(&self) -> usize {
        self.sections
    }

    pub fn finish(self) -> error_stack::Result<(), Error> {
        write_tag(self.writer, TAG_END)?;
        self.writer
            .flush()
            .into_report()
            .change_context(Error::Write)
    }
}

pub struct CheckpointReader<'a> {
    reader: &'a mut dyn Read,
    /// Set once the end tag has been read.
    ended: bool,
}

impl<'a> CheckpointReader<'a> {
    pub fn try_new(reader: &'a mut dyn Read) -> error_stack::Result<Self, Error> {
        let mut magic = [0u8; 8];
        reader
            .read_exact(&mut magic)
            .into_report()
            .change_context(Error::Read)?;
        error_stack::ensure!(&magic == MAGIC, Error::InvalidHeader);

        let mut version = [0u8; 4];
        reader
            .read_exact(&mut version)
            .into_report()
            .change_context(Error::Read)?;
        let version = u32::from_le_bytes(version);
        error_stack::ensure!(version == VERSION, Error::UnsupportedVersion(version));

        Ok(Self {
            reader,
            ended: false,
        })
    }

    /// Read the next section, which must be named `expected`.
    pub fn read_section<T: DeserializeOwned>(
        &mut self,
        expected: &str,
    ) -> error_stack::Result<T, Error> {
        let name = self
            .next_section_name()?
            .ok_or_else(|| Error::MissingSection(expected.to_owned()))?;
        error_stack::ensure!(
            name == expected,
            Error::UnexpectedSection {
                expected: expected.to_owned(),
                actual: name,
            }
        );

        let body = read_bytes(self.reader)?;
        bincode::deserialize(&body)
            .into_report()
            .change_context_lazy(|| Error::Deserialize(expected.to_owned()))
    }

    /// Verify that every section has been read.
    pub fn finish(mut self) -> error_stack::Result<(), Error> {
        match self.next_section_name()? {
            None => Ok(()),
            Some(name) => error_stack::bail!(Error::TrailingSection(name)),
        }
    }

    fn next_section_name(&mut self) -> error_stack::Result<Option<String>, Error> {
        if self.ended {
            return Ok(None);
        }
        let mut tag = [0u8; 1];
        self.reader
            .read_exact(&mut tag)
            .into_report()
            .change_context(Error::Read)?;
        match tag[0] {
            TAG_END => {
                self.ended = true;
                Ok(None)
            }
            TAG_SECTION => {
                let name = read_bytes(self.reader)?;
                let name = String::from_utf8(name)
                    .into_report()
                    .change_context(Error::Read)?;
                Ok(Some(name))
            }
            _ => error_stack::bail!(Error::Read),
        }
    }
}

fn write_tag(writer: &mut dyn Write, tag: u8) -> error_stack::Result<(), Error> {
    writer
        .write_all(&[tag])
        .into_report()
        .change_context(Error::Write)
}

fn write_bytes(writer: &mut dyn Write, bytes: &[u8]) -> error_stack::Result<(), Error> {
    let len = u64::try_from(bytes.len())
        .into_report()
        .change_context(Error::Write)?;
    writer
        .write_all(&len.to_le_bytes())
        .and_then(|_| writer.write_all(bytes))
        .into_report()
        .change_context(Error::Write)
}

fn read_bytes(reader: &mut dyn Read) -> error_stack::Result<Vec<u8>, Error> {
    let mut len = [0u8; 8];
    reader
        .read_exact(&mut len)
        .into_report()
        .change_context(Error::Read)?;
    let len = usize::try_from(u64::from_le_bytes(len))
        .into_report()
        .change_context(Error::Read)?;
    let mut bytes = Vec::new();
    reader
        .take(len as u64)
        .read_to_end(&mut bytes)
        .into_report()
        .change_context(Error::Read)?;
    error_stack::ensure!(bytes.len() == len, Error::Read);
    Ok(bytes)
}

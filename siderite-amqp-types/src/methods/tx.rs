//! Methods of the Tx class
//!
//! After `tx.select`, publishes and acks on the channel join a standing
//! transaction released by `tx.commit` or discarded by `tx.rollback`.

use bytes::BytesMut;

use crate::codec::{Cursor, Decode, Encode};
use crate::Error;

/// Puts the channel in transactional mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Select;

impl Encode for Select {
    fn size(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

impl Decode for Select {
    fn decode(_cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self)
    }
}

/// Confirms transactional mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectOk;

impl Encode for SelectOk {
    fn size(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

impl Decode for SelectOk {
    fn decode(_cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self)
    }
}

/// Commits the current transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Commit;

impl Encode for Commit {
    fn size(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

impl Decode for Commit {
    fn decode(_cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self)
    }
}

/// Confirms a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOk;

impl Encode for CommitOk {
    fn size(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

impl Decode for CommitOk {
    fn decode(_cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self)
    }
}

/// Abandons the current transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rollback;

impl Encode for Rollback {
    fn size(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

impl Decode for Rollback {
    fn decode(_cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self)
    }
}

/// Confirms a rollback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackOk;

impl Encode for RollbackOk {
    fn size(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut BytesMut) {}
}

impl Decode for RollbackOk {
    fn decode(_cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        Ok(Self)
    }
}

//! Shared types for the write pipeline

pub mod error;
pub mod operation;

pub use error::{Result, WeirError};
pub use operation::{
    AcceptedResponse, EntityTable, OpStatus, OpType, Operation, StatusResponse, WriteRequest,
};

// Request records and their transition graphs.

pub mod graph;
pub mod types;

pub use types::{
    DataTransferRequest, DataType, NotificationId, RequestId, RequestKind, RequestedRole, RoleRequest,
    RoleRequestStatus, RoleRequestSubmission, StatusChange, StudentId, TransferStatus,
    TransferSubmission, WorkflowAction,
};

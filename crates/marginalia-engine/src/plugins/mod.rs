//! Plugins built on the state reducer: async upload placeholders and
//! trigger-character suggestions.

pub mod suggestion;
pub mod upload;

pub use suggestion::{
    DismissReason, SUGGESTION_KEY, SuggestionConfig, SuggestionEvent, SuggestionMeta, SuggestionPlugin,
    SuggestionState, SuggestionView,
};
pub use upload::{
    CancelReason, OperationEvent, OperationId, OperationStatus, PendingOperation, RejectReason, UPLOAD_KEY,
    UploadConfig, UploadMeta, UploadPlugin, UploadRejection, UploadState,
};

/// Utility functions for the Solargraph LSP server.
///
/// This module contains helper methods for logging to the editor, access
/// to the Solargraph connection, and conversion of transport failures into
/// JSON-RPC errors.
use std::sync::Arc;

use tower_lsp::jsonrpc::{Error, ErrorCode};
use tower_lsp::lsp_types::*;

use crate::error::TransportError;
use crate::transport::SuggestionTransport;
use crate::{Backend, Connection};

impl Backend {
    pub(crate) async fn log(&self, typ: MessageType, message: String) {
        if let Some(client) = &self.client {
            client.log_message(typ, message).await;
        }
    }

    pub(crate) fn connection(&self) -> Option<Connection> {
        self.connection.read().clone()
    }

    /// The transport, or [`TransportError::NotReady`] before `initialize`
    /// has set one up.
    pub(crate) fn transport(&self) -> Result<Arc<dyn SuggestionTransport>, TransportError> {
        self.connection()
            .map(|c| c.transport)
            .ok_or(TransportError::NotReady)
    }
}

/// Report a transport failure to the editor as a JSON-RPC error.
pub(crate) fn rpc_error(err: TransportError) -> Error {
    let code = match err {
        TransportError::Cancelled => ErrorCode::RequestCancelled,
        _ => ErrorCode::InternalError,
    };
    Error {
        code,
        message: err.to_string().into(),
        data: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_codes() {
        let err = rpc_error(TransportError::Cancelled);
        assert_eq!(err.code, ErrorCode::RequestCancelled);

        let err = rpc_error(TransportError::NotReady);
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.message.contains("not ready"));
    }
}

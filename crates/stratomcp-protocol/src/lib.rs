//! # stratomcp-protocol
//!
//! JSON-RPC 2.0 envelope types and MCP wire types shared by every
//! stratomcp transport and feature service.
//!
//! The crate is deliberately small: it defines the messages that cross
//! process boundaries and nothing else. Transports parse bytes into
//! [`jsonrpc::JsonRpcMessage`], the protocol engine dispatches on the
//! method constants in [`methods`], and feature services exchange the
//! typed payloads in [`types`].

pub mod jsonrpc;
pub mod methods;
pub mod types;

pub use jsonrpc::{
    JsonRpcError, JsonRpcErrorCode, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId, ResponseId,
};
pub use methods::PROTOCOL_VERSION;

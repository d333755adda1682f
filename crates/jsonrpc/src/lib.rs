//! Transport-agnostic JSON-RPC 2.0 client and server runtime.
//!
//! A `ServiceHost` dispatches requests arriving on any [`transport::Reader`]
//! to services registered through a [`registry::ServiceBuilder`], applying
//! middleware and the standard error taxonomy along the way. A [`client::Client`]
//! issues requests over any [`transport::Writer`] and correlates their
//! responses back out of a `Reader`, independently of the server side.

#![forbid(unsafe_code)]

pub mod binder;
pub mod client;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod features;
pub mod host;
pub mod message;
pub mod naming;
pub mod param;
pub mod registry;
pub mod transport;

pub use client::{Client, ClientOptions, Handler};
pub use context::{IncomingRequest, RequestContext};
pub use dispatcher::{Dispatcher, Middleware, Next};
pub use error::{ClientError, ContractError, JsonRpcError, ReaderError, RemoteError, RpcException, WriterError};
pub use features::FeatureCollection;
pub use host::{HostBuilder, ServiceHost};
pub use message::{ErrorObject, Message, MessageId, Params};
pub use naming::NamingStrategy;
pub use param::{Args, ParamSpec, ValueKind};
pub use registry::{MethodDef, MethodRegistry, MethodRegistryBuilder, ServiceBuilder, ServiceFactory, SharedServiceFactory};
pub use transport::{LineDelimitedReader, LineDelimitedWriter, Reader, Writer};

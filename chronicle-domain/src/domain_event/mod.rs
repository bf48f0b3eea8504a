//! 领域事件（domain_event）
//!
//! - `EventSchema`/`EventType`：事件种类的身份常量；
//! - `EventPayload`：可序列化负载与生命周期钩子；
//! - `DomainEvent`：类型擦除的事件实例，可按具体负载类型读取；
//! - `SerializedDomainEvent`：持久化/传输用的扁平形态。
//!
mod event;
mod schema;
mod serialized;

pub(crate) use event::{CommitStamp, ErasedPayload, Typed};
pub use event::DomainEvent;
pub use schema::{EventPayload, EventSchema, EventType};
pub use serialized::SerializedDomainEvent;

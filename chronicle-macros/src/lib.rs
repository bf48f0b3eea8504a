//! 过程宏（chronicle-macros）
//!
//! - `#[aggregate_root]`：注入根状态字段并实现 `AggregateRoot`；
//! - `#[domain_event(...)]`：为事件负载实现 `EventType`（及默认的 `EventPayload`）。
//!
use proc_macro::TokenStream;

mod aggregate_root;
mod domain_event;
mod utils;

/// 聚合根宏
/// - 在字段最前注入 `root: ::chronicle_domain::aggregate::AggregateState`
/// - 默认派生 `Debug, Clone, Default, Serialize, Deserialize`
/// - 参数：`#[aggregate_root(debug = false)]` 关闭 Debug 派生
#[proc_macro_attribute]
pub fn aggregate_root(attr: TokenStream, item: TokenStream) -> TokenStream {
    aggregate_root::expand(attr, item)
}

/// 领域事件宏
/// - 参数：`origin`、`aggregate_type` 必填；`event_type` 默认结构体名；`version` 默认 1
/// - `hooks = true` 时不生成空的 `EventPayload` 实现，由调用方自行实现钩子
#[proc_macro_attribute]
pub fn domain_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    domain_event::expand(attr, item)
}

//! 事件溯源领域引擎（chronicle-domain）
//!
//! 以事件溯源为核心的聚合建模与持久化构件：
//! - 领域事件（`domain_event`）与事件/聚合注册表（`registry`）
//! - 聚合根与暂存（`aggregate`、`command`）
//! - 事件应用（`applier`）与快照转换（`snapshot_transformer`）
//! - 聚合工厂（`factory`）与聚合管理器（`manager`）
//! - 事务协调（`transaction`）与存储/查询端口（`persist`）
//! - 消息端口（`messaging`）与事件消费管线（`eventing`）
//!
//! 存储与传输只通过端口抽象接入；`persist::InMemoryStorage` 与
//! `eventing::InMemoryMessageBus` 是用于测试与本地开发的进程内实现。
//!
//! 典型用法：
//! 1. 用 `#[aggregate_root]`、`#[domain_event]` 定义聚合与事件，并在 `Aggregate::describe` 中声明应用函数；
//! 2. 构造 `Registry` 并注册聚合；
//! 3. 在命令中通过 `process`/`process_creation` 暂存事件，交给 `AggregateManager` 提交；
//! 4. 通过 `AggregateFactory` 重建聚合，通过 `DomainEventConsumer` 订阅其它服务的事件。
//!
pub mod aggregate;
pub mod applier;
pub mod command;
pub mod config;
pub mod domain_event;
pub mod error;
pub mod event_store;
#[cfg(feature = "eventing")]
pub mod eventing;
pub mod factory;
pub mod manager;
pub mod messaging;
pub mod persist;
pub mod registry;
pub mod snapshot_transformer;
pub mod transaction;

// 过程宏生成 ::chronicle_domain 路径，本 crate 的单元测试也需要能解析
extern crate self as chronicle_domain;

//! 聚合（aggregate）
//!
//! - `AggregateState`：所有聚合共享的根状态（ID、当前序号、删除标记、暂存事件）；
//! - `AggregateRoot`：访问根状态的最小协议，通常由 `#[aggregate_root]` 生成；
//! - `Aggregate`：聚合类型的元信息入口（类型名、`describe` 注册应用器与快照策略），
//!   并提供进入命令上下文的 `process`/`process_creation`。
//!
use crate::command::CommandScope;
use crate::domain_event::DomainEvent;
use crate::error::DomainResult;
use crate::registry::AggregateDescriptor;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::fmt;

/// 聚合根状态
///
/// - `id` 只写一次；
/// - `sequence_number` 等于已应用事件的最大序号，无空洞；
/// - `deleted` 只会从 false 变为 true；
/// - 暂存区不进入快照，也不参与相等比较。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateState {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    sequence_number: u64,
    #[serde(default)]
    deleted: bool,
    #[serde(skip)]
    staged: BTreeMap<u64, DomainEvent>,
}

impl PartialEq for AggregateState {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.sequence_number == other.sequence_number
            && self.deleted == other.deleted
    }
}

impl AggregateState {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn current_sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// 标记为已删除（通常在删除事件的应用器中调用）
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    /// 暂存区中的事件，按序号升序
    pub fn staged_domain_events(&self) -> impl Iterator<Item = &DomainEvent> {
        self.staged.values()
    }

    pub fn has_staged_domain_events(&self) -> bool {
        !self.staged.is_empty()
    }

    /// 已暂存但尚未应用到状态上的事件（序号大于当前序号）
    pub fn staged_domain_events_not_applied(&self) -> Vec<DomainEvent> {
        self.staged
            .range(self.sequence_number.saturating_add(1)..)
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub(crate) fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub(crate) fn set_sequence_number(&mut self, sequence_number: u64) {
        self.sequence_number = sequence_number;
    }

    pub(crate) fn highest_staged_sequence_number(&self) -> Option<u64> {
        self.staged.keys().next_back().copied()
    }

    pub(crate) fn stage(&mut self, event: DomainEvent) {
        self.staged.insert(event.sequence_number(), event);
    }

    pub(crate) fn clear_staged(&mut self) {
        self.staged.clear();
    }
}

/// 聚合根协议
pub trait AggregateRoot {
    fn root(&self) -> &AggregateState;

    fn root_mut(&mut self) -> &mut AggregateState;

    fn id(&self) -> Option<&str> {
        self.root().id()
    }

    fn current_sequence_number(&self) -> u64 {
        self.root().current_sequence_number()
    }

    fn is_deleted(&self) -> bool {
        self.root().is_deleted()
    }
}

/// 聚合类型
///
/// `describe` 在注册时调用一次，用于声明外部来源、快照策略与事件应用器；
/// 命令只能在 `process`/`process_creation` 提供的 `CommandScope` 中暂存事件。
pub trait Aggregate:
    AggregateRoot + Default + Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static
{
    const TYPE: &'static str;

    fn describe(descriptor: &mut AggregateDescriptor<Self>);

    /// 在已有聚合上执行命令
    fn process<R, F>(&mut self, command: F) -> DomainResult<R>
    where
        F: FnOnce(&mut CommandScope<'_, Self>) -> DomainResult<R>,
    {
        command(&mut CommandScope::new(self, false))
    }

    /// 执行创建类命令；只有在此上下文中才允许为聚合分配 ID
    fn process_creation<R, F>(&mut self, command: F) -> DomainResult<R>
    where
        F: FnOnce(&mut CommandScope<'_, Self>) -> DomainResult<R>,
    {
        command(&mut CommandScope::new(self, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_equality_ignores_staged_events() {
        let mut a = AggregateState::default();
        a.set_id("a-1");
        a.set_sequence_number(2);
        let b = serde_json::from_value::<AggregateState>(serde_json::to_value(&a).unwrap())
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(b.id(), Some("a-1"));
        assert_eq!(b.current_sequence_number(), 2);
    }

    #[test]
    fn deletion_is_monotonic() {
        let mut state = AggregateState::default();
        assert!(!state.is_deleted());
        state.mark_deleted();
        state.mark_deleted();
        assert!(state.is_deleted());
    }
}

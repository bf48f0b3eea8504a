use crate::error::DomainResult;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 不透明的事务句柄，具体形态由存储适配器决定
#[derive(Clone)]
pub struct TransactionContext {
    inner: Arc<dyn Any + Send + Sync>,
}

impl TransactionContext {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// 适配器取回自身的事务类型；不属于该适配器时返回 `None`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn same_as(&self, other: &TransactionContext) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("ptr", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

/// 事务管理端口
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> DomainResult<TransactionContext>;

    async fn commit(&self, tx: TransactionContext) -> DomainResult<()>;

    async fn rollback(&self, tx: TransactionContext) -> DomainResult<()>;
}

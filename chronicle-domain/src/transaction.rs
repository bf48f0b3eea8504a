//! 事务协调（TransactionCoordinator）
//!
//! - `run`：显式传入事务时直接复用（不提交也不回滚），否则开启新事务，
//!   成功提交、失败回滚；
//! - `transaction`：同一协调器实例上的可重入语法糖，嵌套调用复用已绑定的事务，
//!   最外层结束（成功、失败或 future 被丢弃）时解除绑定。
//!
use crate::error::DomainResult;
use crate::persist::{TransactionContext, TransactionManager, lock};
use std::future::Future;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct TransactionCoordinator {
    manager: Arc<dyn TransactionManager>,
    bound: Arc<Mutex<Option<TransactionContext>>>,
}

impl TransactionCoordinator {
    pub fn new(manager: Arc<dyn TransactionManager>) -> Self {
        Self {
            manager,
            bound: Arc::new(Mutex::new(None)),
        }
    }

    pub fn manager(&self) -> &Arc<dyn TransactionManager> {
        &self.manager
    }

    pub async fn run<T, F, Fut>(&self, existing: Option<&TransactionContext>, f: F) -> DomainResult<T>
    where
        F: FnOnce(TransactionContext) -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        if let Some(tx) = existing {
            return f(tx.clone()).await;
        }

        let tx = self.manager.begin().await?;
        self.complete(tx.clone(), f(tx).await).await
    }

    pub async fn transaction<T, F, Fut>(&self, f: F) -> DomainResult<T>
    where
        F: FnOnce(TransactionContext) -> Fut,
        Fut: Future<Output = DomainResult<T>>,
    {
        let bound = lock(&self.bound).clone();
        if let Some(tx) = bound {
            return f(tx).await;
        }

        let tx = self.manager.begin().await?;
        *lock(&self.bound) = Some(tx.clone());
        let _binding = Binding { slot: &self.bound };
        let result = f(tx.clone()).await;
        self.complete(tx, result).await
    }

    /// 当前实例上绑定的事务（仅在 `transaction` 执行期间存在）
    pub fn current(&self) -> Option<TransactionContext> {
        lock(&self.bound).clone()
    }

    async fn complete<T>(&self, tx: TransactionContext, result: DomainResult<T>) -> DomainResult<T> {
        match result {
            Ok(value) => {
                self.manager.commit(tx).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.manager.rollback(tx).await {
                    tracing::warn!(error = %rollback_err, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }
}

struct Binding<'a> {
    slot: &'a Mutex<Option<TransactionContext>>,
}

impl Drop for Binding<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

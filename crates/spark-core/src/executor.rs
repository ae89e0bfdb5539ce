use core::fmt;
use std::sync::Arc;

/// 交给执行资源运行的一个工作单元。
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// `Executor` 定义事件循环委托工作单元时使用的执行资源。
///
/// # 设计背景（Why）
/// - 事件循环只负责“在哪个工作线程上处理”，“如何运行”交给执行资源，便于宿主替换为带审计、
///   带隔离或带统计的实现；
/// - 执行资源由外部拥有并共享，引导器与事件循环都只持有 `Arc` 引用，从不启动或停止它。
///
/// # 契约说明（What）
/// - `execute` 必须最终运行（或显式丢弃并自行记录）传入的任务，不得无声吞没；
/// - 实现需满足 `Send + Sync + 'static`，因为同一实例会被多个工作线程同时调用。
///
/// # 风险提示（Trade-offs）
/// - `execute` 是同步接口；若实现内部再投递到其他线程池，回调的执行顺序保证将随之弱化。
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, task: Task);

    /// 执行资源的名称，出现在日志与 `Debug` 输出中。
    fn name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

impl fmt::Debug for dyn Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Executor").field(&self.name()).finish()
    }
}

/// 在调用线程上立即运行任务的执行资源，引导器默认使用它。
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicExecutor;

impl BasicExecutor {
    /// 以共享引用形式返回，便于直接交给引导器。
    pub fn shared() -> Arc<dyn Executor> {
        Arc::new(BasicExecutor)
    }
}

impl Executor for BasicExecutor {
    fn execute(&self, task: Task) {
        task();
    }

    fn name(&self) -> &'static str {
        "basic"
    }
}

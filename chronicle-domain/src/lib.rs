//! 事件溯源聚合持久化引擎（chronicle-domain）
//!
//! 以聚合实例为单位，把状态变化记录为不可变、按序号严格递增的事件序列，并提供：
//! - 聚合建模（`aggregate`/`entity`）与领域事件（`domain_event`）约束；
//! - 事件日志与快照存储协议及内存实现（`persist`）；
//! - 工作单元（`UnitOfWork`）：暂存事件、观察者写入与提交回调，提交后才对外可见；
//! - 聚合仓储：快照感知的加载、带乐观并发检测的保存、事件重放；
//! - 提交后通知（`eventing`）：至少一次的后台投递，可取消。
//!
//! 典型用法：
//! 1. 用 `#[entity]`/`#[domain_event]` 定义聚合与事件，实现 `Aggregate::apply`；
//! 2. 组装 `EventSourcedRepository`：事件日志、可选快照、观察者、可选通知队列；
//! 3. 加载聚合、调用领域方法记录事件，然后 `save`（或在共享工作单元中 `save_in`）。
//!
pub mod aggregate;
pub mod domain_event;
pub mod entity;
pub mod error;
pub mod eventing;
pub mod persist;
pub mod worker;

// 允许在本 crate 内部通过 ::chronicle_domain 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::chronicle_domain 路径。
extern crate self as chronicle_domain;

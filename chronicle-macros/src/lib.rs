//! chronicle 过程宏
//!
//! - `#[entity]`：为聚合结构体注入 `AggregateState` 并实现 `Entity`；
//! - `#[entity_id]`：为单字段 tuple struct 形式的标识类型补齐派生与转换；
//! - `#[domain_event]`：为事件枚举实现 `DomainEvent`（事件类型与版本）。
//!
use proc_macro::TokenStream;

mod domain_event;
mod entity;
mod entity_id;
mod utils;

/// 聚合实体宏
///
/// 用法：`#[entity(id = IdType, event = EventType)]`，`event` 必填，`id` 默认 `String`。
#[proc_macro_attribute]
pub fn entity(attr: TokenStream, item: TokenStream) -> TokenStream {
    entity::expand(attr, item)
}

/// 实体 ID 宏
#[proc_macro_attribute]
pub fn entity_id(attr: TokenStream, item: TokenStream) -> TokenStream {
    entity_id::expand(attr, item)
}

/// 领域事件宏
///
/// 用法：`#[domain_event(version = N)]`，变体可用 `#[event(event_type = "...", event_version = N)]` 覆写。
#[proc_macro_attribute]
pub fn domain_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    domain_event::expand(attr, item)
}

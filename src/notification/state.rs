//! 通知收件箱状态 - 纯内存数据结构，不做任何 IO
//!
//! 所有不变式都在这里维护：
//! - 列表按 id 降序，且 id 唯一（去重集合是唯一判据）
//! - 状态只允许 UNREAD → READ
//! - 未读计数永不为负
//! - 去重集合与保留列表同步收缩，被裁剪的 id 通过 `evicted_floor` 拦截重复推送
//! - 身份与代数在同一把锁下变化，读到的 (身份, 代数) 总是一致的

use std::collections::HashSet;
use tracing::debug;

use super::event::NotificationEvent;
use crate::identity::Identity;

/// 推送合并结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// 新插入；`unread` 表示是否为未读
    Inserted { unread: bool },
    /// 已见过的 id
    Duplicate,
    /// 低于裁剪水位的旧 id
    BelowFloor,
    /// 未绑定身份，丢弃
    Unbound,
}

impl AppendOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted { .. })
    }
}

/// 分页合并结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOutcome {
    /// 实际新增的条数
    pub added: usize,
    /// 是否还有更多
    pub has_more: bool,
}

/// 对外只读快照
#[derive(Debug, Clone, PartialEq)]
pub struct InboxSnapshot {
    pub items: Vec<NotificationEvent>,
    pub unread: u64,
    pub has_more: bool,
    pub next_page: usize,
}

/// 收件箱状态
#[derive(Debug)]
pub struct InboxState {
    /// 当前绑定的身份
    identity: Option<Identity>,
    /// 通知列表（id 降序）
    items: Vec<NotificationEvent>,
    /// 未读计数
    unread: u64,
    /// 已物化的 id
    seen: HashSet<u64>,
    /// 已被裁剪的最大 id
    evicted_floor: Option<u64>,
    /// 下一次 load_more 要取的页
    next_page: usize,
    /// 是否还有更多分页
    has_more: bool,
    /// 代数：身份变化或清空时递增，用于丢弃过期的请求结果
    generation: u64,
    /// 保留上限
    max_retained: usize,
    /// 分页大小
    page_size: usize,
}

impl InboxState {
    pub fn new(max_retained: usize, page_size: usize) -> Self {
        Self {
            identity: None,
            items: Vec::new(),
            unread: 0,
            seen: HashSet::new(),
            evicted_floor: None,
            next_page: 0,
            has_more: true,
            generation: 0,
            max_retained: max_retained.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// 绑定 / 解绑身份，变化时清空工作集并递增代数，返回是否发生了变化
    pub fn bind(&mut self, identity: Option<Identity>) -> bool {
        if self.identity == identity {
            return false;
        }
        self.identity = identity;
        self.reset();
        true
    }

    pub fn items(&self) -> &[NotificationEvent] {
        &self.items
    }

    pub fn unread(&self) -> u64 {
        self.unread
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn next_page(&self) -> usize {
        self.next_page
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn is_seen(&self, id: u64) -> bool {
        self.seen.contains(&id)
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    /// 本地持有的未读条数
    pub fn local_unread(&self) -> usize {
        self.items.iter().filter(|n| n.is_unread()).count()
    }

    pub fn snapshot(&self) -> InboxSnapshot {
        InboxSnapshot {
            items: self.items.clone(),
            unread: self.unread,
            has_more: self.has_more,
            next_page: self.next_page,
        }
    }

    /// 合并一条推送
    pub fn append_from_stream(&mut self, event: NotificationEvent) -> AppendOutcome {
        if self.seen.contains(&event.id) {
            debug!(id = event.id, "Duplicate notification dropped");
            return AppendOutcome::Duplicate;
        }
        if self.evicted_floor.is_some_and(|floor| event.id <= floor) {
            debug!(id = event.id, "Notification below eviction floor dropped");
            return AppendOutcome::BelowFloor;
        }

        let unread = event.is_unread();
        self.seen.insert(event.id);
        let pos = self.items.partition_point(|n| n.id > event.id);
        self.items.insert(pos, event);
        if unread {
            self.unread += 1;
        }
        if self.trim() {
            // 裁掉的条目需要能重新分页取回
            self.next_page = self.items.len() / self.page_size;
            self.has_more = true;
        }

        AppendOutcome::Inserted { unread }
    }

    /// 合并一页 REST 结果，返回条数不足一页即视为已到末尾。
    /// 合并后超出保留上限会裁剪，并停止继续分页。
    pub fn apply_page(
        &mut self,
        index: usize,
        items: Vec<NotificationEvent>,
        server_unread: u64,
    ) -> PageOutcome {
        let returned = items.len();
        let full_page = returned >= self.page_size;

        let added = if index == 0 {
            self.apply_first_page(items, server_unread)
        } else {
            let mut added = 0;
            for item in items {
                if self.seen.insert(item.id) {
                    self.items.push(item);
                    added += 1;
                }
            }
            self.items.sort_by(|a, b| b.id.cmp(&a.id));
            self.next_page = self.next_page.max(index + 1);
            added
        };

        let capped = self.trim();
        if capped {
            debug!(page = index, retained = self.items.len(), "Retention cap reached while paging");
        }
        let has_more = full_page && !capped;
        self.has_more = has_more;
        PageOutcome { added, has_more }
    }

    /// 第 0 页：以服务端为准重建列表、计数与去重集合。
    /// 比该页最大 id 更新的本地推送保留下来。
    fn apply_first_page(&mut self, items: Vec<NotificationEvent>, server_unread: u64) -> usize {
        let newest_fetched = items.iter().map(|n| n.id).max();
        let preserved: Vec<NotificationEvent> = match newest_fetched {
            Some(max_id) => self.items.drain(..).filter(|n| n.id > max_id).collect(),
            None => Vec::new(),
        };

        self.items.clear();
        self.seen.clear();
        self.evicted_floor = None;

        for item in preserved {
            self.seen.insert(item.id);
            self.items.push(item);
        }
        let mut added = 0;
        for item in items {
            if self.seen.insert(item.id) {
                self.items.push(item);
                added += 1;
            }
        }
        self.items.sort_by(|a, b| b.id.cmp(&a.id));
        self.unread = server_unread;
        self.next_page = 1;
        added
    }

    /// 标记已读，返回实际从 UNREAD 翻转的条数
    pub fn mark_read(&mut self, ids: &[u64], now_ms: i64) -> usize {
        let targets: HashSet<u64> = ids.iter().copied().collect();
        let flipped = self
            .items
            .iter_mut()
            .filter(|n| targets.contains(&n.id))
            .map(|n| n.mark_read(now_ms))
            .filter(|flipped| *flipped)
            .count();
        self.unread = self.unread.saturating_sub(flipped as u64);
        flipped
    }

    /// 全部标记已读
    pub fn mark_all(&mut self, now_ms: i64) -> usize {
        let flipped = self
            .items
            .iter_mut()
            .map(|n| n.mark_read(now_ms))
            .filter(|flipped| *flipped)
            .count();
        self.unread = 0;
        flipped
    }

    /// 用权威计数重新锚定
    pub fn set_unread(&mut self, count: u64) {
        self.unread = count;
    }

    /// 清空工作集并递增代数（clear-all 与身份变化共用）
    pub fn reset(&mut self) {
        self.items.clear();
        self.seen.clear();
        self.unread = 0;
        self.evicted_floor = None;
        self.next_page = 0;
        self.has_more = true;
        self.generation += 1;
    }

    /// 超出上限时裁剪最旧的条目，并同步收缩去重集合，返回是否发生了裁剪
    fn trim(&mut self) -> bool {
        if self.items.len() <= self.max_retained {
            return false;
        }
        for evicted in self.items.drain(self.max_retained..) {
            self.seen.remove(&evicted.id);
            self.evicted_floor = Some(self.evicted_floor.map_or(evicted.id, |f| f.max(evicted.id)));
        }
        true
    }
}

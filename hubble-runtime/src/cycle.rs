//! 循環参照の検出
//!
//! 整形処理が子へ降りるたびに「子 → 親」の辺を記録し、
//! 親チェーンを上限の深さまでさかのぼって子に戻れるかを調べます。
//! アドレスは呼び出しごとの連番IDに割り当て、親リンクはID同士で保持します。

use std::collections::HashMap;

/// 1回の表示処理の中で振られるノードID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

#[derive(Debug, Clone)]
struct Node {
    address: u64,
    parent: Option<NodeId>,
    in_cycle: bool,
}

/// 循環検出器
#[derive(Debug, Default)]
pub struct CycleDetector {
    ids: HashMap<u64, NodeId>,
    nodes: Vec<Node>,
}

impl CycleDetector {
    /// 空の循環検出器を作成する
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, address: u64) -> NodeId {
        if let Some(id) = self.ids.get(&address) {
            return *id;
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            address,
            parent: None,
            in_cycle: false,
        });
        self.ids.insert(address, id);
        id
    }

    /// 子を親の下に登録する
    ///
    /// 親から親チェーンを `depth_limit` 段までさかのぼって子のアドレスに戻れる場合、
    /// 子を循環のメンバーとして記録し `true` を返します。
    /// 上限に達しても決着しない場合も循環とみなします。
    /// それ以外は子の親リンクを更新して `false` を返します。
    pub fn register(&mut self, parent: u64, child: u64, depth_limit: usize) -> bool {
        if self.reachable(child, parent, depth_limit) {
            let id = self.intern(child);
            self.nodes[id.0 as usize].in_cycle = true;
            true
        } else {
            let parent_id = self.intern(parent);
            let child_id = self.intern(child);
            self.nodes[child_id.0 as usize].parent = Some(parent_id);
            false
        }
    }

    /// `start` から親チェーンをさかのぼって `target` に到達できるか
    fn reachable(&self, target: u64, start: u64, depth_limit: usize) -> bool {
        if target == start {
            return true;
        }

        let mut current = start;
        let mut depth = 0;
        loop {
            if depth >= depth_limit {
                return true;
            }
            let parent = match self.parent_of(current) {
                Some(parent) => parent,
                None => return false,
            };
            if parent == target {
                return true;
            }
            current = parent;
            depth += 1;
        }
    }

    /// 親のアドレスを取得する
    pub fn parent_of(&self, address: u64) -> Option<u64> {
        let id = self.ids.get(&address)?;
        let parent = self.nodes[id.0 as usize].parent?;
        Some(self.nodes[parent.0 as usize].address)
    }

    /// 循環のメンバーとして記録されているか
    pub fn is_cycle(&self, address: u64) -> bool {
        self.ids
            .get(&address)
            .map(|id| self.nodes[id.0 as usize].in_cycle)
            .unwrap_or(false)
    }

    /// 記録されているアドレスの数
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 何も記録されていないか
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// すべての記録を消す
    pub fn reset(&mut self) {
        self.ids.clear();
        self.nodes.clear();
    }
}

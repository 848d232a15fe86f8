//! 会话步骤图谱：Session → Step* / SummaryStep*，节点之间以 NEXT 串成单链
//!
//! 节点按 `(session_id, NodeKey)` 存放，后继以 key 保存而不是引用：合并窗口时只是「删几个 key、改一条 NEXT」。
//! 不变量：每个会话恰有一个无后继的节点（head）；从链首沿 NEXT 走到 head 覆盖全部节点，无分叉、无环。
//!
//! 边的含义：
//! - `HAS_STEP` / `HAS_SUMMARY`：会话拥有该节点（由节点所属的 session_id 表达）
//! - `NEXT`：节点的 `next` 字段

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::AgentError;

/// 节点 key：单步按步号，摘要按覆盖区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum NodeKey {
    Step(u64),
    Summary { start: u64, end: u64 },
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Step(n) => write!(f, "step:{}", n),
            NodeKey::Summary { start, end } => write!(f, "summary:{}-{}", start, end),
        }
    }
}

impl FromStr for NodeKey {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || AgentError::GraphWriteFailure(format!("malformed node key '{}'", s));
        if let Some(n) = s.strip_prefix("step:") {
            return n.parse().map(NodeKey::Step).map_err(|_| bad());
        }
        if let Some(range) = s.strip_prefix("summary:") {
            let (start, end) = range.split_once('-').ok_or_else(bad)?;
            return Ok(NodeKey::Summary {
                start: start.parse().map_err(|_| bad())?,
                end: end.parse().map_err(|_| bad())?,
            });
        }
        Err(bad())
    }
}

/// 单步记录（创建后不可变）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub step_number: u64,
    pub action_type: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl StepRecord {
    pub fn new(step_number: u64, action_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            step_number,
            action_type: action_type.into(),
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

/// 摘要节点：替代 `[start_step, end_step]` 的一段连续步骤
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRecord {
    pub summary: String,
    pub start_step: u64,
    pub end_step: u64,
    pub timestamp: DateTime<Utc>,
}

impl SummaryRecord {
    pub fn covers(&self, step_number: u64) -> bool {
        (self.start_step..=self.end_step).contains(&step_number)
    }
}

/// 链上的一个节点
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChainNode {
    Step(StepRecord),
    Summary(SummaryRecord),
}

impl ChainNode {
    pub fn key(&self) -> NodeKey {
        match self {
            ChainNode::Step(s) => NodeKey::Step(s.step_number),
            ChainNode::Summary(s) => NodeKey::Summary {
                start: s.start_step,
                end: s.end_step,
            },
        }
    }

    /// 单行文本（用于时间线展示）
    pub fn describe(&self) -> String {
        match self {
            ChainNode::Step(s) => format!("[{}] {}: {}", s.step_number, s.action_type, s.description),
            ChainNode::Summary(s) => format!("[{}-{}] summary: {}", s.start_step, s.end_step, s.summary),
        }
    }
}

/// 节点数 / 关系数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub node_count: u64,
    pub relationship_count: u64,
}

/// 统计范围
#[derive(Debug, Clone, Copy)]
pub enum StatsScope<'a> {
    Session(&'a str),
    Global,
}

/// 会话图谱存储 trait：每个方法对应后端的一次原子事务
pub trait SessionGraphStore: Send + Sync {
    /// 写入一步：会话不存在则创建，挂 HAS_STEP，并从当前 head 连 NEXT
    fn append_step(&self, session_id: &str, step: &StepRecord) -> Result<(), AgentError>;

    /// 按步号升序返回区间内仍存在的 Step
    fn steps_in_range(&self, session_id: &str, start: u64, end: u64) -> Result<Vec<StepRecord>, AgentError>;

    /// 原子替换窗口：建 SummaryStep + HAS_SUMMARY，把指向窗口首步的 NEXT 改指摘要，删除窗口内 Step。
    /// 提交时窗口已空则返回 Ok(false)，不做任何修改。
    fn replace_window(&self, session_id: &str, summary: &SummaryRecord) -> Result<bool, AgentError>;

    /// 从链首沿 NEXT 到 head 的节点序列
    fn chain(&self, session_id: &str) -> Result<Vec<ChainNode>, AgentError>;

    fn summaries(&self, session_id: &str) -> Result<Vec<SummaryRecord>, AgentError>;

    fn stats(&self, scope: StatsScope<'_>) -> Result<GraphStats, AgentError>;
}

/// 从「节点 + 后继 key」集合还原单链；发现分叉、环或断链时报错
pub fn walk_chain(nodes: Vec<(ChainNode, Option<NodeKey>)>) -> Result<Vec<ChainNode>, AgentError> {
    if nodes.is_empty() {
        return Ok(Vec::new());
    }
    let targets: HashSet<NodeKey> = nodes.iter().filter_map(|(_, next)| *next).collect();
    let mut by_key: HashMap<NodeKey, (ChainNode, Option<NodeKey>)> =
        nodes.into_iter().map(|(n, next)| (n.key(), (n, next))).collect();

    let roots: Vec<NodeKey> = by_key.keys().filter(|k| !targets.contains(k)).copied().collect();
    let root = match roots.as_slice() {
        [only] => *only,
        _ => {
            return Err(AgentError::GraphWriteFailure(format!(
                "chain is not linear: {} root candidates",
                roots.len()
            )))
        }
    };

    let total = by_key.len();
    let mut out = Vec::with_capacity(total);
    let mut cursor = Some(root);
    while let Some(key) = cursor {
        let (node, next) = by_key.remove(&key).ok_or_else(|| {
            AgentError::GraphWriteFailure(format!("NEXT points to missing or revisited node {}", key))
        })?;
        out.push(node);
        cursor = next;
    }
    if out.len() != total {
        return Err(AgentError::GraphWriteFailure(format!(
            "chain visits {} of {} nodes",
            out.len(),
            total
        )));
    }
    Ok(out)
}

struct ArenaNode {
    node: ChainNode,
    next: Option<NodeKey>,
}

#[derive(Default)]
struct SessionArena {
    nodes: BTreeMap<NodeKey, ArenaNode>,
}

impl SessionArena {
    fn head(&self) -> Option<NodeKey> {
        self.nodes
            .iter()
            .find(|(_, n)| n.next.is_none())
            .map(|(k, _)| *k)
    }

    fn predecessor_of(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes
            .iter()
            .find(|(_, n)| n.next == Some(key))
            .map(|(k, _)| *k)
    }

    fn window_keys(&self, start: u64, end: u64) -> Vec<NodeKey> {
        if start > end {
            return Vec::new();
        }
        self.nodes
            .range(NodeKey::Step(start)..=NodeKey::Step(end))
            .map(|(k, _)| *k)
            .collect()
    }
}

/// 进程内图谱：会话 → 节点 arena。写锁内先校验再修改，修改本身不会失败，因此每个操作整体可见或整体不可见。
#[derive(Default)]
pub struct InMemoryGraphStore {
    sessions: RwLock<HashMap<String, SessionArena>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> AgentError {
        AgentError::GraphWriteFailure("in-memory graph lock poisoned".to_string())
    }
}

impl SessionGraphStore for InMemoryGraphStore {
    fn append_step(&self, session_id: &str, step: &StepRecord) -> Result<(), AgentError> {
        let mut sessions = self.sessions.write().map_err(|_| Self::poisoned())?;
        let arena = sessions.entry(session_id.to_string()).or_default();
        let key = NodeKey::Step(step.step_number);
        if arena.nodes.contains_key(&key) {
            return Err(AgentError::GraphWriteFailure(format!(
                "step {} already exists in session {}",
                step.step_number, session_id
            )));
        }
        let head = arena.head();
        arena.nodes.insert(
            key,
            ArenaNode {
                node: ChainNode::Step(step.clone()),
                next: None,
            },
        );
        if let Some(h) = head.and_then(|h| arena.nodes.get_mut(&h)) {
            h.next = Some(key);
        }
        Ok(())
    }

    fn steps_in_range(&self, session_id: &str, start: u64, end: u64) -> Result<Vec<StepRecord>, AgentError> {
        let sessions = self.sessions.read().map_err(|_| Self::poisoned())?;
        let Some(arena) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        if start > end {
            return Ok(Vec::new());
        }
        Ok(arena
            .nodes
            .range(NodeKey::Step(start)..=NodeKey::Step(end))
            .filter_map(|(_, n)| match &n.node {
                ChainNode::Step(s) => Some(s.clone()),
                ChainNode::Summary(_) => None,
            })
            .collect())
    }

    fn replace_window(&self, session_id: &str, summary: &SummaryRecord) -> Result<bool, AgentError> {
        let mut sessions = self.sessions.write().map_err(|_| Self::poisoned())?;
        let Some(arena) = sessions.get_mut(session_id) else {
            return Ok(false);
        };
        let window = arena.window_keys(summary.start_step, summary.end_step);
        let (Some(first), Some(last)) = (window.first().copied(), window.last().copied()) else {
            return Ok(false);
        };
        let summary_key = NodeKey::Summary {
            start: summary.start_step,
            end: summary.end_step,
        };
        if arena.nodes.contains_key(&summary_key) {
            return Err(AgentError::GraphWriteFailure(format!(
                "summary {} already exists in session {}",
                summary_key, session_id
            )));
        }

        let successor = arena.nodes.get(&last).and_then(|n| n.next);
        let predecessor = arena.predecessor_of(first);

        for key in &window {
            arena.nodes.remove(key);
        }
        arena.nodes.insert(
            summary_key,
            ArenaNode {
                node: ChainNode::Summary(summary.clone()),
                next: successor,
            },
        );
        if let Some(p) = predecessor.and_then(|p| arena.nodes.get_mut(&p)) {
            p.next = Some(summary_key);
        }
        Ok(true)
    }

    fn chain(&self, session_id: &str) -> Result<Vec<ChainNode>, AgentError> {
        let sessions = self.sessions.read().map_err(|_| Self::poisoned())?;
        let Some(arena) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        walk_chain(
            arena
                .nodes
                .values()
                .map(|n| (n.node.clone(), n.next))
                .collect(),
        )
    }

    fn summaries(&self, session_id: &str) -> Result<Vec<SummaryRecord>, AgentError> {
        let sessions = self.sessions.read().map_err(|_| Self::poisoned())?;
        let Some(arena) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<SummaryRecord> = arena
            .nodes
            .values()
            .filter_map(|n| match &n.node {
                ChainNode::Summary(s) => Some(s.clone()),
                ChainNode::Step(_) => None,
            })
            .collect();
        out.sort_by_key(|s| s.start_step);
        Ok(out)
    }

    fn stats(&self, scope: StatsScope<'_>) -> Result<GraphStats, AgentError> {
        let sessions = self.sessions.read().map_err(|_| Self::poisoned())?;
        let count = |arena: &SessionArena| {
            let nodes = arena.nodes.len() as u64;
            let next_edges = arena.nodes.values().filter(|n| n.next.is_some()).count() as u64;
            // 会话节点 + 成员节点；HAS_STEP/HAS_SUMMARY 每个成员一条，另加 NEXT
            GraphStats {
                node_count: 1 + nodes,
                relationship_count: nodes + next_edges,
            }
        };
        Ok(match scope {
            StatsScope::Session(id) => sessions.get(id).map(count).unwrap_or_default(),
            StatsScope::Global => sessions.values().map(count).fold(GraphStats::default(), |acc, s| {
                GraphStats {
                    node_count: acc.node_count + s.node_count,
                    relationship_count: acc.relationship_count + s.relationship_count,
                }
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(start: u64, end: u64) -> SummaryRecord {
        SummaryRecord {
            summary: format!("steps {}-{}", start, end),
            start_step: start,
            end_step: end,
            timestamp: Utc::now(),
        }
    }

    fn keys(store: &InMemoryGraphStore, sid: &str) -> Vec<String> {
        store
            .chain(sid)
            .unwrap()
            .iter()
            .map(|n| n.key().to_string())
            .collect()
    }

    #[test]
    fn test_node_key_roundtrip() {
        for key in [NodeKey::Step(7), NodeKey::Summary { start: 1, end: 5 }] {
            assert_eq!(key.to_string().parse::<NodeKey>().unwrap(), key);
        }
        assert!("node:1".parse::<NodeKey>().is_err());
        assert!("summary:3".parse::<NodeKey>().is_err());
    }

    #[test]
    fn test_append_links_from_head() {
        let store = InMemoryGraphStore::new();
        for n in 1..=3 {
            store.append_step("s", &StepRecord::new(n, "thought", format!("t{}", n))).unwrap();
        }
        assert_eq!(keys(&store, "s"), vec!["step:1", "step:2", "step:3"]);
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let store = InMemoryGraphStore::new();
        store.append_step("s", &StepRecord::new(1, "thought", "a")).unwrap();
        let err = store.append_step("s", &StepRecord::new(1, "thought", "b")).unwrap_err();
        assert!(matches!(err, AgentError::GraphWriteFailure(_)));
    }

    #[test]
    fn test_replace_window_in_middle() {
        let store = InMemoryGraphStore::new();
        for n in 1..=12 {
            store.append_step("s", &StepRecord::new(n, "thought", "x")).unwrap();
        }
        assert!(store.replace_window("s", &summary(6, 10)).unwrap());
        assert_eq!(
            keys(&store, "s"),
            vec!["step:1", "step:2", "step:3", "step:4", "step:5", "summary:6-10", "step:11", "step:12"]
        );
        assert!(store.steps_in_range("s", 6, 10).unwrap().is_empty());
    }

    #[test]
    fn test_replace_empty_window_is_noop() {
        let store = InMemoryGraphStore::new();
        store.append_step("s", &StepRecord::new(1, "thought", "x")).unwrap();
        assert!(!store.replace_window("s", &summary(6, 10)).unwrap());
        assert!(!store.replace_window("missing", &summary(1, 5)).unwrap());
        assert_eq!(keys(&store, "s"), vec!["step:1"]);
    }

    #[test]
    fn test_stats_counts_edges() {
        let store = InMemoryGraphStore::new();
        for n in 1..=3 {
            store.append_step("a", &StepRecord::new(n, "thought", "x")).unwrap();
        }
        store.append_step("b", &StepRecord::new(1, "thought", "x")).unwrap();
        // a: 1 session + 3 steps; 3 HAS_STEP + 2 NEXT
        assert_eq!(
            store.stats(StatsScope::Session("a")).unwrap(),
            GraphStats { node_count: 4, relationship_count: 5 }
        );
        assert_eq!(
            store.stats(StatsScope::Global).unwrap(),
            GraphStats { node_count: 6, relationship_count: 6 }
        );
        assert_eq!(store.stats(StatsScope::Session("zzz")).unwrap(), GraphStats::default());
    }

    #[test]
    fn test_walk_chain_rejects_branch() {
        let a = ChainNode::Step(StepRecord::new(1, "t", "a"));
        let b = ChainNode::Step(StepRecord::new(2, "t", "b"));
        let c = ChainNode::Step(StepRecord::new(3, "t", "c"));
        // 1 -> 3, 2 -> 3：两个链首
        let err = walk_chain(vec![
            (a, Some(NodeKey::Step(3))),
            (b, Some(NodeKey::Step(3))),
            (c, None),
        ])
        .unwrap_err();
        assert!(matches!(err, AgentError::GraphWriteFailure(_)));
    }
}

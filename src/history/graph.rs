//! コミットの有向非巡回グラフ（DAG）を管理するモジュール
//!
//! ノードはベクターに格納し、親子関係はその添字で表現します。ログを流し読みしながら
//! 辺を追加できるよう、まだ現れていないハッシュを参照すると仮のノードが作られます。
//!
//! 最小共通祖先（LCA）の問い合わせには、根からの深さ優先探索で得たオイラーツアーと
//! 深さのスパーステーブルを使います。この前計算はグラフが変更されるたびに破棄され、
//! 次の問い合わせで再計算されます。

use super::error::HistoryError;
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};
use std::sync::OnceLock;

/// グラフ内のノードを指す添字
pub type NodeIndex = usize;

#[derive(Debug, Clone)]
pub struct CommitNode {
    hash: String,
    /// 先頭はマージ時にチェックアウトされていたブランチ、残りはマージされたブランチ
    parents: Vec<NodeIndex>,
    children: Vec<NodeIndex>,
}

impl CommitNode {
    fn new(hash: &str) -> Self {
        Self {
            hash: hash.to_string(),
            parents: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn parents(&self) -> &[NodeIndex] {
        &self.parents
    }

    pub fn children(&self) -> &[NodeIndex] {
        &self.children
    }
}

/// コミットグラフ
///
/// 辺の追加には `&mut self` が必要です。複数のスレッドから追加する場合は
/// `Mutex<CommitGraph>` で包んでください。LCAの問い合わせは `&self` で行えますが、
/// 変更と問い合わせを同時に行うことは借用規則により不可能です。
#[derive(Debug, Clone, Default)]
pub struct CommitGraph {
    nodes: Vec<CommitNode>,
    index: IndexMap<String, NodeIndex>,
    euler: OnceLock<EulerTour>,
}

impl CommitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 全ノードの親子の辺の数
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|node| node.parents.len()).sum()
    }

    pub fn exists(&self, hash: &str) -> bool {
        self.index.contains_key(hash)
    }

    pub fn try_get(&self, hash: &str) -> Option<&CommitNode> {
        self.index.get(hash).map(|&i| &self.nodes[i])
    }

    pub fn node(&self, index: NodeIndex) -> &CommitNode {
        &self.nodes[index]
    }

    pub fn index_of(&self, hash: &str) -> Option<NodeIndex> {
        self.index.get(hash).copied()
    }

    /// 指定したコミットの親のハッシュを返します
    pub fn parent_hashes(&self, hash: &str) -> Vec<&str> {
        self.try_get(hash)
            .map(|node| {
                node.parents
                    .iter()
                    .map(|&p| self.nodes[p].hash.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// ハッシュに対応するノードを返します。存在しない場合は新しく作成します
    pub fn get_or_create(&mut self, hash: &str) -> NodeIndex {
        if let Some(&i) = self.index.get(hash) {
            return i;
        }
        let i = self.nodes.len();
        self.nodes.push(CommitNode::new(hash));
        self.index.insert(hash.to_string(), i);
        self.invalidate();
        i
    }

    /// コミットと親コミットの間に双方向の辺を張ります
    ///
    /// 同じ引数で何度呼び出してもグラフは変化しません。親の順序は最初に
    /// 追加された順序が保たれます。
    pub fn add_edge<S: AsRef<str>>(&mut self, hash: &str, parent_hashes: &[S]) {
        let child = self.get_or_create(hash);
        for parent_hash in parent_hashes {
            let parent = self.get_or_create(parent_hash.as_ref());
            if self.nodes[child].parents.contains(&parent) {
                continue;
            }
            self.nodes[child].parents.push(parent);
            self.nodes[parent].children.push(child);
            self.invalidate();
        }
    }

    /// 親を持たないノード（根）のハッシュ
    pub fn roots(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| node.parents.is_empty())
            .map(|node| node.hash.as_str())
            .collect()
    }

    /// 指定したコミットとその祖先の添字を幅優先で列挙します
    ///
    /// 複数の起点を渡した場合、共通の祖先は一度だけ返されます。存在しない
    /// ハッシュは無視されます。
    pub fn ancestors<'a, I>(&self, start: I) -> Vec<NodeIndex>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = start
            .into_iter()
            .filter_map(|hash| self.index_of(hash))
            .filter(|&i| visited.insert(i))
            .collect();

        let mut order = Vec::new();
        while let Some(current) = queue.pop_front() {
            order.push(current);
            for &parent in &self.nodes[current].parents {
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        order
    }

    /// 指定したコミットの祖先以外のノードをすべて削除します
    ///
    /// 対象のコミットは子を持たない新しい先頭になります。表示やデバッグ用の操作で、
    /// 履歴の再構築では使用しません。
    ///
    /// # エラー
    ///
    /// ハッシュがグラフに存在しない場合は `UnknownCommit` を返します。
    pub fn minimize_to(&mut self, hash: &str) -> Result<(), HistoryError> {
        if !self.exists(hash) {
            return Err(HistoryError::UnknownCommit(hash.to_string()));
        }

        let keep = self.ancestors([hash]);
        let mut remap = vec![None; self.nodes.len()];
        for (new_index, &old_index) in keep.iter().enumerate() {
            remap[old_index] = Some(new_index);
        }

        let translate = |edges: &[NodeIndex]| -> Vec<NodeIndex> {
            edges.iter().filter_map(|&old| remap[old]).collect()
        };

        let mut nodes: Vec<CommitNode> = keep
            .iter()
            .map(|&old| {
                let node = &self.nodes[old];
                CommitNode {
                    hash: node.hash.clone(),
                    parents: translate(&node.parents),
                    children: translate(&node.children),
                }
            })
            .collect();
        // 祖先の探索は対象から始まるので、対象は常に先頭に置かれる
        nodes[0].children.clear();

        self.index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.hash.clone(), i))
            .collect();
        self.nodes = nodes;
        self.invalidate();
        Ok(())
    }

    /// 2つのコミットの最小共通祖先を返します
    ///
    /// グラフは木とは限らないため、複数の経路で到達できるノードは最初に発見した
    /// 経路でのみ展開します。そのため、同じ深さに候補が複数ある場合はそのうちの
    /// 1つを返します。根が複数ある場合は仮想的な共通の根を置いて計算し、共通祖先が
    /// 存在しなければ `None` を返します。
    ///
    /// # エラー
    ///
    /// どちらかのハッシュがグラフに存在しない場合は `UnknownCommit` を返します。
    pub fn least_common_ancestor(
        &self,
        hash1: &str,
        hash2: &str,
    ) -> Result<Option<&str>, HistoryError> {
        let a = self
            .index_of(hash1)
            .ok_or_else(|| HistoryError::UnknownCommit(hash1.to_string()))?;
        let b = self
            .index_of(hash2)
            .ok_or_else(|| HistoryError::UnknownCommit(hash2.to_string()))?;

        let tour = self.euler.get_or_init(|| EulerTour::build(&self.nodes));
        Ok(tour.lca(a, b).map(|i| self.nodes[i].hash.as_str()))
    }

    fn invalidate(&mut self) {
        if self.euler.get().is_some() {
            self.euler = OnceLock::new();
        }
    }
}

/// オイラーツアー上の1訪問。`node` が `None` のものは仮想的な根
#[derive(Debug, Clone, Copy)]
struct Visit {
    node: Option<NodeIndex>,
    depth: usize,
}

#[derive(Debug, Clone)]
struct EulerTour {
    visits: Vec<Visit>,
    first: Vec<Option<usize>>,
    /// `sparse[k][i]` は visits[i..i + 2^k] で最も浅い訪問の位置
    sparse: Vec<Vec<usize>>,
}

impl EulerTour {
    fn build(nodes: &[CommitNode]) -> Self {
        let mut visits = vec![Visit {
            node: None,
            depth: 0,
        }];
        let mut first = vec![None; nodes.len()];
        let mut visited = vec![false; nodes.len()];

        let roots = (0..nodes.len()).filter(|&i| nodes[i].parents.is_empty());
        for root in roots {
            // (ノード, 次に調べる子の位置, 深さ)
            let mut stack = vec![(root, 0usize, 1usize)];
            visited[root] = true;
            first[root] = Some(visits.len());
            visits.push(Visit {
                node: Some(root),
                depth: 1,
            });

            while let Some(frame) = stack.last_mut() {
                let (current, next_child, depth) = *frame;
                if let Some(&child) = nodes[current].children.get(next_child) {
                    frame.1 += 1;
                    if visited[child] {
                        continue;
                    }
                    visited[child] = true;
                    first[child] = Some(visits.len());
                    visits.push(Visit {
                        node: Some(child),
                        depth: depth + 1,
                    });
                    stack.push((child, 0, depth + 1));
                } else {
                    stack.pop();
                    if let Some(&(parent, _, parent_depth)) = stack.last() {
                        visits.push(Visit {
                            node: Some(parent),
                            depth: parent_depth,
                        });
                    }
                }
            }

            visits.push(Visit {
                node: None,
                depth: 0,
            });
        }

        let sparse = Self::build_sparse(&visits);
        Self {
            visits,
            first,
            sparse,
        }
    }

    fn build_sparse(visits: &[Visit]) -> Vec<Vec<usize>> {
        let mut sparse = vec![(0..visits.len()).collect::<Vec<_>>()];
        let mut width = 1;
        while width * 2 <= visits.len() {
            let Some(previous) = sparse.last() else { break };
            let level = (0..=visits.len() - width * 2)
                .map(|i| {
                    let (left, right) = (previous[i], previous[i + width]);
                    if visits[right].depth < visits[left].depth {
                        right
                    } else {
                        left
                    }
                })
                .collect();
            sparse.push(level);
            width *= 2;
        }
        sparse
    }

    fn lca(&self, a: NodeIndex, b: NodeIndex) -> Option<NodeIndex> {
        // 根から到達できないノード（閉路の一部など）には祖先を定義しない
        let (fa, fb) = (self.first[a]?, self.first[b]?);
        let (lo, hi) = if fa <= fb { (fa, fb) } else { (fb, fa) };

        let len = hi - lo + 1;
        let level = usize::BITS as usize - 1 - len.leading_zeros() as usize;
        let left = self.sparse[level][lo];
        let right = self.sparse[level][hi + 1 - (1 << level)];
        let best = if self.visits[right].depth < self.visits[left].depth {
            right
        } else {
            left
        };
        self.visits[best].node
    }
}

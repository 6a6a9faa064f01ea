//! パス式の補完
//!
//! 補完は解決用スコープ（制限なし・循環検出なし）の中で呼び出す前提です。

use crate::expr_eval::ExpressionResolver;
use tracing::trace;

/// 配列添字の補完で列挙する先頭の添字数
const LEADING_INDICES: u64 = 3;

/// 静的変数名のトライ木
///
/// 完全修飾名を `.` で区切って登録します。子の並びは登録順です。
#[derive(Debug, Default)]
pub struct StaticVarTrie {
    root: TrieNode,
}

#[derive(Debug, Default)]
struct TrieNode {
    name: String,
    children: Vec<TrieNode>,
}

impl TrieNode {
    fn child_mut(&mut self, name: &str) -> &mut TrieNode {
        let position = match self.children.iter().position(|c| c.name == name) {
            Some(position) => position,
            None => {
                self.children.push(TrieNode {
                    name: name.to_string(),
                    children: Vec::new(),
                });
                self.children.len() - 1
            }
        };
        &mut self.children[position]
    }
}

impl StaticVarTrie {
    /// 静的変数名の一覧からトライ木を作る
    pub fn build<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut trie = Self::default();
        for name in names {
            let mut node = &mut trie.root;
            for part in name.as_ref().split('.') {
                node = node.child_mut(part);
            }
        }
        trie
    }

    /// トライ木が空か
    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// 静的変数名を補完する
    ///
    /// 入力の各部分を先頭から辿り、一意に決まる間は先へ進みます。
    /// 入力を使い切った後も一意に決まる限り名前を伸ばします。
    /// 他の候補がある場合は一意でも進まず、その階層の一致を返します。
    pub fn complete(&self, text: &str, other_candidates: &[String]) -> Vec<String> {
        let mut parts: Vec<String> = text.split('.').map(String::from).collect();
        let mut current = &self.root;
        let mut index = 0;
        let mut used = 0;
        let mut appending = false;
        let mut last_findings: Vec<&str> = Vec::new();

        while index < parts.len() {
            let part = parts[index].clone();
            let is_last = index + 1 == parts.len();
            let findings: Vec<&TrieNode> = current
                .children
                .iter()
                .filter(|child| {
                    if is_last || appending {
                        child.name.starts_with(part.as_str())
                    } else {
                        child.name == part
                    }
                })
                .collect();

            if findings.len() == 1 && other_candidates.is_empty() {
                current = findings[0];
                parts[index] = current.name.clone();
                index += 1;
                if index >= parts.len() {
                    parts.push(String::new());
                    appending = true;
                } else {
                    used += 1;
                }
            } else {
                last_findings = findings.iter().map(|node| node.name.as_str()).collect();
                break;
            }
        }

        let result_parts = &parts[used..index];
        let candidates = if last_findings.is_empty() {
            if result_parts.is_empty() {
                Vec::new()
            } else {
                vec![result_parts.join(".")]
            }
        } else {
            last_findings
                .iter()
                .map(|finding| {
                    let mut joined: Vec<&str> = result_parts.iter().map(String::as_str).collect();
                    joined.push(finding);
                    joined.join(".")
                })
                .collect()
        };
        trace!("Static variable candidates for '{}': {:?}", text, candidates);
        candidates
    }
}

/// パス式の補完候補を返す
///
/// - `[` が最後の `.` より後にあれば、配列の添字（先頭3つと最後の添字）
/// - `.` を含まなければ、可視な変数名
/// - 末尾が `.` なら、解決した値の全フィールド名
/// - それ以外は、最後の `.` より前を解決した値のフィールド名のうち前方一致するもの
///
/// 添字以外の場合は静的変数の候補を後ろに加えます。
pub fn complete(
    resolver: &ExpressionResolver<'_>,
    variable_names: impl FnOnce() -> Vec<String>,
    statics: Option<&StaticVarTrie>,
    text: &str,
) -> Vec<String> {
    let bracket = text.rfind('[');
    let dot = text.rfind('.');
    let in_index = match (bracket, dot) {
        (Some(bracket), Some(dot)) => bracket > dot,
        (Some(_), None) => true,
        _ => false,
    };
    if in_index {
        return complete_index(resolver, text);
    }

    let mut candidates = match text.rsplit_once('.') {
        None => variable_names()
            .into_iter()
            .filter(|name| name.starts_with(text))
            .collect(),
        Some((_, "")) => resolver
            .resolve(text.trim_end_matches('.'))
            .map(|value| resolver.field_names(&value))
            .unwrap_or_default(),
        Some((before, after)) => resolver
            .resolve(before)
            .map(|value| resolver.field_names(&value))
            .unwrap_or_default()
            .into_iter()
            .filter(|name| name.starts_with(after))
            .collect(),
    };

    if let Some(trie) = statics {
        let extra = trie.complete(text, &candidates);
        candidates.extend(extra);
    }
    candidates
}

fn complete_index(resolver: &ExpressionResolver<'_>, text: &str) -> Vec<String> {
    let Some((path, after)) = text.rsplit_once('[') else {
        return Vec::new();
    };
    if after.contains(']') {
        return Vec::new();
    }

    let Some(length) = resolver.resolve(path).and_then(|value| resolver.array_length(&value))
    else {
        trace!("Index completion on a non-array '{}'", path);
        return Vec::new();
    };

    let mut indices: Vec<u64> = (0..length.min(LEADING_INDICES)).collect();
    if length > LEADING_INDICES {
        indices.push(length - 1);
    }
    indices
        .into_iter()
        .map(|index| format!("{}]", index))
        .filter(|candidate| candidate.starts_with(after))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trie() -> StaticVarTrie {
        StaticVarTrie::build([
            "com.example.Config.DEFAULT",
            "com.example.Config.INSTANCE",
            "com.example.Registry.ENTRIES",
            "org.sample.Main.counter",
        ])
    }

    #[test]
    fn test_trie_extends_unique_chain() {
        assert_eq!(trie().complete("org", &[]), vec!["org.sample.Main.counter"]);
        assert_eq!(trie().complete("com.example.Reg", &[]), vec!["Registry.ENTRIES"]);
    }

    #[test]
    fn test_trie_lists_ambiguous_level() {
        assert_eq!(
            trie().complete("com.example.", &[]),
            vec!["Config", "Registry"]
        );
        assert_eq!(
            trie().complete("com.example.Config.", &[]),
            vec!["DEFAULT", "INSTANCE"]
        );
    }

    #[test]
    fn test_trie_with_other_candidates_does_not_extend() {
        let others = vec!["org_local".to_string()];
        assert_eq!(trie().complete("or", &others), vec!["org"]);
    }

    #[test]
    fn test_trie_no_match() {
        assert!(trie().complete("net", &[]).is_empty());
        assert!(StaticVarTrie::build(Vec::<String>::new()).is_empty());
    }
}

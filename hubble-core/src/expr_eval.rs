//! 式評価エンジン
//!
//! `pp` コマンドや補完で使うパス式を評価します。
//!
//! ```text
//! path    := primary ('.' segment)*
//! segment := identifier ('[' integer ']')*
//! ```
//!
//! プライマリは `$last`、アドレスリテラル（`@(0x..)`、`@z(..)`）、または
//! ドット区切りの名前です。名前は左から1セグメントずつ伸ばしながら
//! スコープで評価し、最初に値が得られた時点で残りをフィールドアクセスとして
//! 辿ります。

use crate::parse::parse_address_literal;
use hubble_runtime::{ChildValue, ClassifiedValue, Inspector};
use hubble_target::{RawValue, TypeInfo};
use tracing::trace;

/// 最後に解決した値を指すプレースホルダ
pub const LAST_VALUE: &str = "$last";

/// アドレスリテラルで作る参照の型
const LITERAL_CLASS: &str = "java.lang.Object";

/// セグメントを名前と添字列に分ける
///
/// `arr[1][2]` → `("arr", [1, 2])`。添字が整数でなければ None を返します。
pub fn split_index(segment: &str) -> Option<(&str, Vec<usize>)> {
    let Some(start) = segment.find('[') else {
        return Some((segment, Vec::new()));
    };
    let (name, rest) = segment.split_at(start);

    let indices = rest
        .split("][")
        .map(|part| part.trim_matches(|c| c == '[' || c == ']').trim().parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>();
    match indices {
        Ok(indices) => Some((name, indices)),
        Err(e) => {
            trace!("Malformed index in '{}': {}", segment, e);
            None
        }
    }
}

/// 式評価器
pub struct ExpressionResolver<'a> {
    inspector: &'a Inspector,
    last: Option<&'a RawValue>,
}

impl<'a> ExpressionResolver<'a> {
    /// 新しい式評価器を作成する
    pub fn new(inspector: &'a Inspector, last: Option<&'a RawValue>) -> Self {
        Self { inspector, last }
    }

    /// パス式を評価する（見つからなければ None）
    pub fn resolve(&self, path: &str) -> Option<RawValue> {
        trace!("Resolving '{}'", path);
        let parts: Vec<&str> = path.split('.').collect();
        let (primary, start) = self.resolve_primary(&parts)?;

        let (_, indices) = split_index(parts[start])?;
        let mut current = self.element(primary, &indices)?;
        for part in &parts[start + 1..] {
            let (name, indices) = split_index(part)?;
            current = self.field(&current, name)?;
            current = self.element(current, &indices)?;
        }
        Some(current)
    }

    /// プライマリを評価し、値とそれが消費した最後のセグメントの位置を返す
    fn resolve_primary(&self, parts: &[&str]) -> Option<(RawValue, usize)> {
        let mut primary = String::new();
        for (index, part) in parts.iter().enumerate() {
            let name = part.split('[').next().unwrap_or(part);
            if index == 0 && name == LAST_VALUE {
                return self.last.map(|last| (last.clone(), 0));
            }

            if !primary.is_empty() {
                primary.push('.');
            }
            primary.push_str(name);

            if let Some(value) = self.lookup(&primary) {
                trace!("Resolved primary '{}'", primary);
                return Some((value, index));
            }
        }
        None
    }

    fn lookup(&self, primary: &str) -> Option<RawValue> {
        match parse_address_literal(primary) {
            Some(Ok(literal)) => Some(RawValue::new(
                TypeInfo::reference(LITERAL_CLASS, literal.compressed),
                literal.value,
                None,
            )),
            Some(Err(e)) => {
                trace!("Invalid address literal '{}': {}", primary, e);
                None
            }
            None => self.inspector.access().lookup_variable(primary),
        }
    }

    /// 子を0から数えて添字の位置の値を取り出す
    ///
    /// 子の数と同じ添字、または子を持たない値は None になります。
    pub fn element(&self, value: RawValue, indices: &[usize]) -> Option<RawValue> {
        let formatter = self.inspector.formatter();
        let mut current = value;
        for &index in indices {
            match formatter.children_of(&current).nth(index) {
                Some((_, ChildValue::Value(child))) => current = child,
                Some((_, ChildValue::Elided)) => {
                    trace!("Index {} hits the elided marker", index);
                    return None;
                }
                Some((_, ChildValue::Unreadable)) => {
                    trace!("Element {} is unreadable", index);
                    return None;
                }
                None => {
                    trace!("Index {} out of range", index);
                    return None;
                }
            }
        }
        Some(current)
    }

    /// 名前でフィールドを探す（配列は None）
    pub fn field(&self, value: &RawValue, name: &str) -> Option<RawValue> {
        self.fields(value).find_map(|(field, child)| match child {
            ChildValue::Value(child) if field == name => Some(child),
            _ => None,
        })
    }

    /// フィールド名の一覧（配列は空）
    pub fn field_names(&self, value: &RawValue) -> Vec<String> {
        self.fields(value).map(|(name, _)| name).collect()
    }

    /// 配列の要素数（配列でなければ None）
    pub fn array_length(&self, value: &RawValue) -> Option<u64> {
        match self.inspector.bridge().classify(value) {
            Ok(ClassifiedValue::Array(array)) => Some(array.length),
            _ => None,
        }
    }

    fn fields(&self, value: &RawValue) -> Box<dyn Iterator<Item = (String, ChildValue)> + 'a> {
        match self.inspector.bridge().classify(value) {
            Ok(ClassifiedValue::Array(_)) | Err(_) => Box::new(std::iter::empty()),
            Ok(classified) => Box::new(self.inspector.formatter().children(&classified)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_index() {
        assert_eq!(split_index("value"), Some(("value", vec![])));
        assert_eq!(split_index("arr[3]"), Some(("arr", vec![3])));
        assert_eq!(split_index("grid[1][20]"), Some(("grid", vec![1, 20])));
        assert_eq!(split_index("arr[x]"), None);
        assert_eq!(split_index("arr[-1]"), None);
    }
}

//! 値のフォーマット
//!
//! 分類済みの値を1行のテキストにし、子（フィールドや要素）を遅延列として提供します。
//! 子を取り出すたびに循環検出器へ登録するため、子の列は循環検出の状態を
//! リセットした後に再利用できません。

use crate::classified::{ArrayValue, ClassifiedValue, DisplayHint};
use crate::decode::{self, INVALID_CSTRING, INVALID_STRING};
use crate::errors::InspectError;
use crate::inspector::Inspector;
use crate::type_bridge::{strip_compression, HUB_FIELD};
use hubble_target::{FieldInfo, RawValue, TypeInfo};
use tracing::{debug, trace};

/// 入れ子の表示の上限（循環検出を無効にしても停止させるため）
pub const MAX_NESTING: usize = 20;

/// 省略された子の表示
pub const ELIDED: &str = "...";

/// 子の値
#[derive(Debug, Clone, PartialEq)]
pub enum ChildValue {
    /// 値
    Value(RawValue),
    /// 配列制限で省略された残り
    Elided,
    /// 読み取れなかった要素（`object` と表示する）
    Unreadable,
}

/// 読み取れない値の表示
pub const UNREADABLE: &str = "object";

/// 値フォーマッタ
#[derive(Clone, Copy)]
pub struct ValueFormatter<'a> {
    inspector: &'a Inspector,
}

impl<'a> ValueFormatter<'a> {
    /// 値フォーマッタを作成する
    pub fn new(inspector: &'a Inspector) -> Self {
        Self { inspector }
    }

    /// 値の1行表現（子は含まない）
    pub fn render(&self, value: &ClassifiedValue) -> String {
        let config = self.inspector.config();
        let bridge = self.inspector.bridge();

        match value {
            ClassifiedValue::Null => "null".to_string(),
            ClassifiedValue::String(raw) => match decode::read_java_string(&bridge, raw) {
                Ok(None) => "null".to_string(),
                Ok(Some(text)) => format!("{}{}", decode::quote(&text), self.address_suffix(raw)),
                Err(e) => {
                    debug!("Cannot decode string: {}", e);
                    format!("{}{}", INVALID_STRING, self.address_suffix(raw))
                }
            },
            ClassifiedValue::CString(raw) => {
                match decode::read_c_string(&self.inspector.memory(), raw.bits, config.cstr_limit) {
                    Ok(text) if !text.is_empty() => {
                        format!("{}{}", decode::quote(&text), self.address_suffix(raw))
                    }
                    Ok(_) => format!("{}{}", INVALID_CSTRING, self.address_text(raw)),
                    Err(e) => {
                        debug!("Cannot read C string at 0x{:x}: {}", raw.bits, e);
                        format!("{}{}", INVALID_CSTRING, self.address_text(raw))
                    }
                }
            }
            ClassifiedValue::Array(array) => {
                let mut text = array.header.clone();
                if self.inspector.is_cycle(&array.value) || config.array_limit == 0 {
                    text.push_str(" = {...}");
                }
                text.push_str(&self.address_suffix(&array.value));
                text
            }
            ClassifiedValue::Enum {
                value,
                name,
                ordinal,
            } => format!(
                "{}({}){}",
                name.as_deref().unwrap_or("null"),
                ordinal,
                self.address_suffix(value)
            ),
            ClassifiedValue::Object { value, type_name } => {
                let mut text = match type_name {
                    Some(name) => name.clone(),
                    None => match bridge.runtime_type_name(value) {
                        Ok(Some(name)) => strip_compression(&name),
                        Ok(None) => return UNREADABLE.to_string(),
                        Err(e) => {
                            debug!("Cannot read runtime type name: {}", e);
                            return UNREADABLE.to_string();
                        }
                    },
                };
                if self.inspector.is_cycle(value) {
                    text.push_str(" = {...}");
                }
                text.push_str(&self.address_suffix(value));
                text
            }
            ClassifiedValue::Primitive { kind, value } => decode::decode_primitive(*kind, value.bits),
        }
    }

    /// 表示ヒント
    pub fn display_hint(&self, value: &ClassifiedValue) -> Option<DisplayHint> {
        value.display_hint()
    }

    /// 子の遅延列
    ///
    /// 配列は `array_limit` 個までの要素と、残りがあれば省略マーカーを返します。
    /// オブジェクトは宣言順のフィールドを返します（ハブは除き、静的フィールドは設定次第）。
    /// 循環のメンバーとして記録された値は子を持ちません。
    pub fn children(&self, value: &ClassifiedValue) -> Children<'a> {
        let config = self.inspector.config();
        let source = match value {
            ClassifiedValue::Array(array) => {
                if self.inspector.is_cycle(&array.value) || config.array_limit == 0 {
                    ChildSource::Empty
                } else {
                    ChildSource::Elements {
                        array: array.clone(),
                        index: 0,
                        limit: config.array_limit as u64,
                    }
                }
            }
            ClassifiedValue::Object { value, .. } => {
                if self.inspector.is_cycle(value) {
                    ChildSource::Empty
                } else {
                    ChildSource::Fields {
                        value: value.clone(),
                        fields: self.inspector.bridge().fields(value).into_iter(),
                    }
                }
            }
            _ => ChildSource::Empty,
        };

        Children {
            inspector: self.inspector,
            static_fields: config.static_fields,
            source,
        }
    }

    /// 生の値を分類して子の遅延列を返す（分類できなければ空）
    pub fn children_of(&self, value: &RawValue) -> Children<'a> {
        match self.inspector.bridge().classify(value) {
            Ok(classified) => self.children(&classified),
            Err(_) => Children {
                inspector: self.inspector,
                static_fields: false,
                source: ChildSource::Empty,
            },
        }
    }

    /// 設定で有効ならアドレス表示を返す
    pub fn address_suffix(&self, value: &RawValue) -> String {
        if !self.inspector.config().with_address {
            return String::new();
        }
        self.address_text(value)
    }

    /// アドレス表示（` @z(圧縮値)` または ` @(0x絶対アドレス)`）
    pub fn address_text(&self, value: &RawValue) -> String {
        if value.is_compressed() && !self.inspector.config().absolute_address {
            return format!(" @z({})", value.bits);
        }
        match self.inspector.bridge().address_of(value) {
            Ok(addr) => format!(" @(0x{:x})", addr),
            Err(e) => {
                trace!("No address to show: {}", e);
                String::new()
            }
        }
    }

    /// トップレベルの表示
    ///
    /// 循環検出の状態をリセットしてから、子を含めた1行の表現を作ります。
    pub fn format_value(&self, value: &RawValue) -> String {
        self.inspector.reset_cycles();
        self.format_nested(value, 0)
    }

    fn format_nested(&self, value: &RawValue, nesting: usize) -> String {
        let classified = match self.inspector.bridge().classify(value) {
            Ok(classified) => classified,
            Err(InspectError::Unclassifiable) => return self.format_generic(value),
            Err(e) => {
                debug!("Cannot classify value: {}", e);
                return UNREADABLE.to_string();
            }
        };

        let text = self.render(&classified);
        let hint = classified.display_hint();
        if hint == Some(DisplayHint::String) {
            return text;
        }

        let mut children = self.children(&classified).peekable();
        if children.peek().is_none() {
            return text;
        }
        if nesting >= MAX_NESTING {
            return format!("{} = {{...}}", text);
        }

        let parts: Vec<String> = children
            .map(|(name, child)| match child {
                ChildValue::Elided => ELIDED.to_string(),
                ChildValue::Unreadable => UNREADABLE.to_string(),
                ChildValue::Value(child) => {
                    let rendered = self.format_nested(&child, nesting + 1);
                    if hint == Some(DisplayHint::Array) {
                        rendered
                    } else {
                        format!("{} = {}", name, rendered)
                    }
                }
            })
            .collect();
        format!("{} = {{{}}}", text, parts.join(", "))
    }

    /// 分類できない値の汎用表示
    pub fn format_generic(&self, value: &RawValue) -> String {
        match value.type_info.as_ref() {
            TypeInfo::Primitive { .. } => value.bits.to_string(),
            TypeInfo::Pointer { name, .. } => format!("({}) 0x{:x}", name, value.bits),
            other => match value.address {
                Some(addr) => format!("<{} @ 0x{:x}>", other.name(), addr),
                None => format!("<{}>", other.name()),
            },
        }
    }
}

enum ChildSource {
    Empty,
    Elements {
        array: ArrayValue,
        index: u64,
        limit: u64,
    },
    Fields {
        value: RawValue,
        fields: std::vec::IntoIter<FieldInfo>,
    },
}

/// 子の遅延列
pub struct Children<'a> {
    inspector: &'a Inspector,
    static_fields: bool,
    source: ChildSource,
}

impl Iterator for Children<'_> {
    type Item = (String, ChildValue);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            ChildSource::Empty => None,
            ChildSource::Elements {
                array,
                index,
                limit,
            } => {
                if *index >= array.length {
                    return None;
                }
                if *index >= *limit {
                    let marker = index.to_string();
                    *index = array.length;
                    return Some((marker, ChildValue::Elided));
                }

                let i = *index;
                *index += 1;
                let element = self
                    .inspector
                    .memory()
                    .read_value(array.element_type.clone(), array.element_address(i));
                match element {
                    Ok(element) => {
                        let element = self.inspector.register_child(&array.value, element);
                        Some((i.to_string(), ChildValue::Value(element)))
                    }
                    Err(e) => {
                        debug!("Cannot read array element {}: {}", i, e);
                        Some((i.to_string(), ChildValue::Unreadable))
                    }
                }
            }
            ChildSource::Fields { value, fields } => loop {
                let field = fields.next()?;
                if field.name == HUB_FIELD || (field.is_static() && !self.static_fields) {
                    continue;
                }
                match self.inspector.bridge().read_field_info(value, &field) {
                    Ok(child) => {
                        let child = self.inspector.register_child(value, child);
                        return Some((field.name, ChildValue::Value(child)));
                    }
                    Err(e) => {
                        trace!("Skipping unreadable field {}: {}", field.name, e);
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubble_target::testing::FakeTarget;

    #[test]
    fn test_generic_fallback() {
        let inspector = Inspector::new(Box::new(FakeTarget::new()));
        let formatter = inspector.formatter();

        let word = RawValue::new(TypeInfo::primitive("unsigned long", 8), 42, None);
        assert_eq!(formatter.format_value(&word), "42");

        let ptr = RawValue::new(
            TypeInfo::Pointer {
                name: "void *".to_string(),
                pointee: "void".to_string(),
                size: 8,
            },
            0x1234,
            None,
        );
        assert_eq!(formatter.format_value(&ptr), "(void *) 0x1234");
    }

    #[test]
    fn test_address_text_modes() {
        let mut target = FakeTarget::new();
        target.enable_compression(0x0fff_0000, 3);
        target.define_class("app.Node", &[]);
        let node = target.new_object("app.Node");
        let compressed = target.compressed_reference("app.Node", node);
        let bits = compressed.bits;

        let inspector = Inspector::new(Box::new(target));
        let formatter = inspector.formatter();
        assert_eq!(formatter.address_suffix(&compressed), "");

        inspector.update_config(|c| c.with_address = true);
        assert_eq!(formatter.address_suffix(&compressed), format!(" @z({})", bits));

        inspector.update_config(|c| c.absolute_address = true);
        assert_eq!(formatter.address_suffix(&compressed), format!(" @(0x{:x})", node));
    }

    #[test]
    fn test_unreadable_elements_keep_siblings() {
        let mut target = FakeTarget::new();
        target.define_array_class(TypeInfo::primitive("int", 4));
        // ハブを先に作り、配列を最後の確保にする
        target.hub_for("[I");
        let arr = target.new_array("int[]", &[1, 2]);
        target.write_u32(arr + 8, 5);
        let value = target.reference("int[]", arr);

        let inspector = Inspector::new(Box::new(target));
        inspector.update_config(|c| c.array_limit = 4);
        let formatter = inspector.formatter();

        let children: Vec<ChildValue> = formatter.children_of(&value).map(|(_, c)| c).collect();
        assert_eq!(children.len(), 5);
        assert!(matches!(children[1], ChildValue::Value(_)));
        assert_eq!(children[2], ChildValue::Unreadable);
        assert_eq!(children[3], ChildValue::Unreadable);
        assert_eq!(children[4], ChildValue::Elided);

        assert_eq!(
            formatter.format_value(&value),
            "int[5] = {1, 2, object, object, ...}"
        );
    }

    #[test]
    fn test_primitive_rendering() {
        let inspector = Inspector::new(Box::new(FakeTarget::new()));
        let value = RawValue::new(TypeInfo::primitive("long", 8), (-5i64) as u64, None);
        assert_eq!(inspector.formatter().format_value(&value), "-5");
    }
}
